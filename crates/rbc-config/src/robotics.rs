use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Per-pump motor/valve wiring and motion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Index into `RoboticsConfig::print_servers`.
    pub print_server_index: usize,
    pub plunger_axis: String,
    pub valve_axis: String,
    pub valve_steps: u32,
    pub max_steps: u32,
    pub plunger_speed_in: u32,
    pub plunger_speed_out: u32,
    pub priming_steps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintServerConfig {
    pub index: usize,
    pub base_url: String,
    pub api_key: String,
    pub gcode_folder: String,
}

/// One z/xy reference point used to fit the vial-to-arm transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub x_out: f64,
    pub x_in: f64,
    pub y: f64,
    pub z_out: f64,
    pub z_in: f64,
}

/// Per-quad homing calibration: the two reference vials plus the wash
/// station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadHoming {
    pub vial_0: ReferencePoint,
    pub vial_17: ReferencePoint,
    pub wash: ReferencePoint,
}

/// The IPP address a quad's efflux pumps answer to on the
/// microcontroller side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffluxAddress {
    pub ipp_num: u32,
    pub ipp_idx: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoboticsConfig {
    pub arm_ip: String,
    pub default_roll: f64,
    pub default_pitch: f64,
    pub default_yaw: f64,
    pub default_speed: f64,
    pub default_acc: f64,
    pub pumps: BTreeMap<String, PumpConfig>,
    pub print_servers: Vec<PrintServerConfig>,
    pub quads: BTreeMap<String, QuadHoming>,
    pub quad_efflux: BTreeMap<String, EffluxAddress>,
    pub wash_dry_delay_ms: u64,
    pub check_status_timeout_secs: u64,
    pub post_gcode_timeout_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct RawRoboticsConfig {
    arm_ip: Option<String>,
    default_roll: Option<f64>,
    default_pitch: Option<f64>,
    default_yaw: Option<f64>,
    default_speed: Option<f64>,
    default_acc: Option<f64>,
    pumps: Option<BTreeMap<String, PumpConfig>>,
    print_servers: Option<Vec<PrintServerConfig>>,
    quads: Option<BTreeMap<String, QuadHoming>>,
    quad_efflux: Option<BTreeMap<String, EffluxAddress>>,
    wash_dry_delay_ms: Option<u64>,
    check_status_timeout_secs: Option<u64>,
    post_gcode_timeout_attempts: Option<u32>,
}

impl RoboticsConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("reading '{}': {e}", path.display())))?;
        Self::from_str(&text)
    }

    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawRoboticsConfig =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let arm_ip = raw
            .arm_ip
            .ok_or_else(|| ConfigError::MissingField("arm_ip".to_owned()))?;
        let pumps = raw
            .pumps
            .ok_or_else(|| ConfigError::MissingField("pumps".to_owned()))?;
        let print_servers = raw
            .print_servers
            .ok_or_else(|| ConfigError::MissingField("print_servers".to_owned()))?;
        if print_servers.is_empty() {
            return Err(ConfigError::InvalidValue(
                "at least one print_servers entry is required".to_owned(),
            ));
        }
        let quads = raw
            .quads
            .ok_or_else(|| ConfigError::MissingField("quads".to_owned()))?;

        for (pump_name, pump) in &pumps {
            if pump.print_server_index >= print_servers.len() {
                return Err(ConfigError::InvalidValue(format!(
                    "pump '{pump_name}' references print_server_index {} but only {} print servers are configured",
                    pump.print_server_index,
                    print_servers.len()
                )));
            }
        }

        Ok(RoboticsConfig {
            arm_ip,
            default_roll: raw.default_roll.unwrap_or(180.0),
            default_pitch: raw.default_pitch.unwrap_or(0.0),
            default_yaw: raw.default_yaw.unwrap_or(0.0),
            default_speed: raw.default_speed.unwrap_or(100.0),
            default_acc: raw.default_acc.unwrap_or(2000.0),
            pumps,
            print_servers,
            quads,
            quad_efflux: raw.quad_efflux.unwrap_or_default(),
            wash_dry_delay_ms: raw.wash_dry_delay_ms.unwrap_or(0),
            check_status_timeout_secs: raw.check_status_timeout_secs.unwrap_or(60),
            post_gcode_timeout_attempts: raw.post_gcode_timeout_attempts.unwrap_or(10),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text =
            serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| ConfigError::Io(format!("writing '{}': {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
arm_ip: "192.168.1.50"
default_speed: 100.0
default_acc: 2000.0
pumps:
  pump_a:
    print_server_index: 0
    plunger_axis: "X"
    valve_axis: "Y"
    valve_steps: 100
    max_steps: 500
    plunger_speed_in: 15000
    plunger_speed_out: 15000
    priming_steps: 50
print_servers:
  - index: 0
    base_url: "http://192.168.1.15:5000"
    api_key: "abc123"
    gcode_folder: "/gcode/0"
quads:
  quad_0:
    vial_0: { x_out: 0, x_in: 5, y: 0, z_out: 10, z_in: -5 }
    vial_17: { x_out: 90, x_in: 95, y: 36, z_out: 10, z_in: -5 }
    wash: { x_out: -10, x_in: -10, y: -10, z_out: 10, z_in: -5 }
"#
    }

    #[test]
    fn loads_and_defaults() {
        let cfg = RoboticsConfig::from_str(sample_yaml()).unwrap();
        assert_eq!(cfg.arm_ip, "192.168.1.50");
        assert_eq!(cfg.check_status_timeout_secs, 60);
        assert_eq!(cfg.post_gcode_timeout_attempts, 10);
    }

    #[test]
    fn rejects_pump_with_out_of_range_print_server_index() {
        let bad = sample_yaml().replace("print_server_index: 0", "print_server_index: 9");
        let err = RoboticsConfig::from_str(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn rejects_empty_print_servers() {
        let mut cfg = RoboticsConfig::from_str(sample_yaml()).unwrap();
        cfg.print_servers.clear();
        let text = serde_yaml::to_string(&cfg).unwrap();
        let err = RoboticsConfig::from_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }
}
