use crate::error::ConfigError;
use rbc_protocol::{ExperimentParameter, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Serial link parameters: device path, baud, timeouts, frame
/// delimiters, and the protocol sentinels for the five message kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub device_path: String,
    pub baud_rate: u32,
    pub io_timeout_ms: u64,
    /// Inter-message delay enforced after writes (`serial_delay` in
    /// the wire protocol, seconds in the original, kept here as
    /// milliseconds for precision).
    pub serial_delay_ms: u64,
    pub end_outgoing: String,
    pub end_incoming: String,
    pub immediate_char: char,
    pub recurring_char: char,
    pub ack_char: char,
    pub echo_char: char,
    pub data_char: char,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            device_path: "/dev/ttyACM0".to_owned(),
            baud_rate: 9600,
            io_timeout_ms: 1000,
            serial_delay_ms: 500,
            end_outgoing: "end".to_owned(),
            end_incoming: "end".to_owned(),
            immediate_char: 'I',
            recurring_char: 'R',
            ack_char: 'A',
            echo_char: 'E',
            data_char: 'D',
        }
    }
}

/// The top-level typed tree loaded from `conf.yml`: serial parameters,
/// the recurring experimental-parameter set, and the per-phase
/// broadcast-tag override bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootConfig {
    pub serial: SerialConfig,
    pub evolver_ip: String,
    pub broadcast_timing_secs: u64,
    pub settle_delay_secs: u64,
    pub device_name_file: String,
    pub experimental_params: BTreeMap<String, ExperimentParameter>,
    #[serde(default)]
    pub broadcast_tags: BTreeMap<String, BTreeMap<String, ExperimentParameter>>,
}

/// Raw, all-optional mirror of [`RootConfig`] used only during
/// deserialization, so that a missing required field produces a
/// `ConfigError::MissingField` rather than a generic serde parse
/// failure (mirrors `services/forwarder/src/config.rs`'s `RawConfig`).
#[derive(Debug, Deserialize)]
struct RawRootConfig {
    serial: Option<SerialConfig>,
    evolver_ip: Option<String>,
    broadcast_timing_secs: Option<u64>,
    settle_delay_secs: Option<u64>,
    device_name_file: Option<String>,
    experimental_params: Option<BTreeMap<String, ExperimentParameter>>,
    broadcast_tags: Option<BTreeMap<String, BTreeMap<String, ExperimentParameter>>>,
}

impl RootConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("reading '{}': {e}", path.display())))?;
        Self::from_str(&text)
    }

    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawRootConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let experimental_params = raw
            .experimental_params
            .ok_or_else(|| ConfigError::MissingField("experimental_params".to_owned()))?;
        let evolver_ip = raw
            .evolver_ip
            .ok_or_else(|| ConfigError::MissingField("evolver_ip".to_owned()))?;

        Ok(RootConfig {
            serial: raw.serial.unwrap_or_default(),
            evolver_ip,
            broadcast_timing_secs: raw.broadcast_timing_secs.unwrap_or(20),
            settle_delay_secs: raw.settle_delay_secs.unwrap_or(5),
            device_name_file: raw
                .device_name_file
                .unwrap_or_else(|| "device_name.json".to_owned()),
            experimental_params,
            broadcast_tags: raw.broadcast_tags.unwrap_or_default(),
        })
    }

    /// Overwrite-on-write save; no atomic rename contract.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text =
            serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| ConfigError::Io(format!("writing '{}': {e}", path.display())))
    }

    /// Apply an incoming `command` event to a parameter, merging value,
    /// recurring flag, and field-count overrides (grounded in
    /// `evolver_server.py`'s `on_command`).
    pub fn apply_command(
        &mut self,
        param: &str,
        value: Option<ParamValue>,
        recurring: Option<bool>,
        fields_out: Option<usize>,
        fields_in: Option<usize>,
    ) -> Result<(), ConfigError> {
        let descriptor = self
            .experimental_params
            .get_mut(param)
            .ok_or_else(|| ConfigError::NotFound(format!("param '{param}'")))?;
        if let Some(v) = value {
            descriptor.value.apply_update(v);
        }
        if let Some(r) = recurring {
            descriptor.recurring = r;
        }
        if let Some(n) = fields_out {
            descriptor.fields_expected_outgoing = n;
        }
        if let Some(n) = fields_in {
            descriptor.fields_expected_incoming = n;
        }
        Ok(())
    }

    /// The param descriptor set for a given phase tag name (`None` for
    /// the bare experimental-parameter set, `Some(tag)` for a
    /// broadcast-tag override bundle). Matches the Python
    /// `broadcast_tag in broadcast_options` branch.
    pub fn params_for_tag(&self, tag: Option<&str>) -> &BTreeMap<String, ExperimentParameter> {
        match tag.and_then(|t| self.broadcast_tags.get(t)) {
            Some(bundle) => bundle,
            None => &self.experimental_params,
        }
    }
}
