//! Ingress/egress event envelopes for the client-facing event
//! surface. The adjacently-tagged enum does the dispatch work a
//! hand-rolled string match would otherwise need, the same way
//! `ws_forwarder.rs` leans on serde's `#[serde(tag = ...)]` for its
//! control-plane messages.

use rbc_config::{CalibrationFit, CalibrationRecord};
use rbc_protocol::{ParamValue, RoboticsStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct CommandPayload {
    pub param: String,
    #[serde(default)]
    pub value: Option<ParamValue>,
    #[serde(default)]
    pub immediate: Option<bool>,
    #[serde(default)]
    pub recurring: Option<bool>,
    #[serde(default)]
    pub fields_expected_outgoing: Option<usize>,
    #[serde(default)]
    pub fields_expected_incoming: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetCalibrationPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetRawCalibrationPayload {
    pub name: String,
    pub calibration_type: String,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetFitCalibrationPayload {
    pub calibration_name: String,
    #[serde(flatten)]
    pub fit: CalibrationFit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetActiveCalPayload {
    pub fit_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetDeviceNamePayload {
    #[serde(flatten)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxRoutinePayload {
    pub quads: Vec<String>,
    pub requests: std::collections::BTreeMap<String, u32>,
    #[serde(default)]
    pub uniform: bool,
    #[serde(default)]
    pub wash: bool,
    #[serde(default = "default_influx_mode")]
    pub mode: String,
}

fn default_influx_mode() -> String {
    "influx".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimeEffluxRoutinePayload {
    pub quads: Vec<String>,
}

/// Every event a client may send over `/ws/dpu-evolver` or
/// `/ws/robotics`. Both namespaces share one dispatch table; events
/// that only make sense on one side simply aren't sent on the other.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum IngressEvent {
    Command(CommandPayload),
    Getconfig,
    Getcalibrationnames,
    Getfitnames,
    Getcalibration(GetCalibrationPayload),
    Setrawcalibration(SetRawCalibrationPayload),
    Setfitcalibration(SetFitCalibrationPayload),
    Setactivecal(SetActiveCalPayload),
    Getactivecal,
    Getdevicename,
    Setdevicename(SetDeviceNamePayload),
    FillTubingRoutine,
    PrimeInfluxRoutine,
    PrimeEffluxRoutine(PrimeEffluxRoutinePayload),
    InfluxRoutine(InfluxRoutinePayload),
    RequestRoboticsStatus,
    RequestPumpConf,
    OverrideRoboticsStatus,
    StopRobotics,
    ReconnectRobotics,
    PauseRobotics,
    ResumeRobotics,
}

/// Everything the server may push unsolicited or in reply. Tagged the
/// same way as [`IngressEvent`] so the wire shape is symmetric in both
/// directions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EgressEvent {
    Broadcast(rbc_protocol::BroadcastMessage),
    Config(Box<rbc_config::RootConfig>),
    Calibrationnames(Vec<NamedType>),
    Fitnames(Vec<NamedType>),
    Calibration(Option<CalibrationRecord>),
    Activecalibrations(Vec<CalibrationRecord>),
    Broadcastname(serde_json::Value),
    Calibrationrawcallback(SetCalibrationAck),
    ActiveRoboticsStatus(RoboticsStatus),
    ActivePumpConf(Box<rbc_config::RoboticsConfig>),
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedType {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<(&str, &str)> for NamedType {
    fn from((name, kind): (&str, &str)) -> Self {
        NamedType {
            name: name.to_owned(),
            kind: kind.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SetCalibrationAck {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_client_namespace() {
        let cases = [
            (r#"{"event":"getconfig"}"#, true),
            (r#"{"event":"getcalibrationnames"}"#, true),
            (r#"{"event":"fill_tubing_routine"}"#, true),
            (r#"{"event":"prime_influx_routine"}"#, true),
            (r#"{"event":"request_robotics_status"}"#, true),
            (r#"{"event":"stop_robotics"}"#, true),
            (r#"{"event":"pause_robotics"}"#, true),
            (r#"{"event":"resume_robotics"}"#, true),
            (r#"{"event":"nonsense_event"}"#, false),
        ];
        for (json, should_parse) in cases {
            let parsed: Result<IngressEvent, _> = serde_json::from_str(json);
            assert_eq!(parsed.is_ok(), should_parse, "payload: {json}");
        }
    }

    #[test]
    fn command_event_carries_payload() {
        let json = r#"{"event":"command","data":{"param":"stir","value":["8","8"]}}"#;
        let parsed: IngressEvent = serde_json::from_str(json).unwrap();
        match parsed {
            IngressEvent::Command(payload) => {
                assert_eq!(payload.param, "stir");
                assert_eq!(
                    payload.value,
                    Some(ParamValue::Vector(vec!["8".into(), "8".into()]))
                );
            }
            other => panic!("expected Command, got {other:?}"),
        }
    }

    #[test]
    fn influx_routine_defaults_mode_to_influx() {
        let json = r#"{"event":"influx_routine","data":{"quads":["quad_0"],"requests":{"pump_a":100}}}"#;
        let parsed: IngressEvent = serde_json::from_str(json).unwrap();
        match parsed {
            IngressEvent::InfluxRoutine(payload) => {
                assert_eq!(payload.mode, "influx");
                assert!(!payload.uniform);
                assert!(!payload.wash);
            }
            other => panic!("expected InfluxRoutine, got {other:?}"),
        }
    }
}
