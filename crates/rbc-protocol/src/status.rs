use crate::window::VialWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fluidic routine engine's state machine. A routine may only
/// start from `Idle` or `Pause`; `EmergencyStop` is terminal until an
/// operator override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoboticsMode {
    Idle,
    Priming,
    FillTubing,
    Influx,
    Dilution,
    VialSetup,
    Wash,
    Pause,
    EmergencyStop,
}

impl RoboticsMode {
    /// Whether a routine may begin from this mode.
    pub fn accepts_routine_start(self) -> bool {
        matches!(self, RoboticsMode::Idle | RoboticsMode::Pause)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmMirror {
    pub connected: bool,
    pub state: i32,
    pub error_code: i32,
    pub warn_code: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimeStatus {
    pub influx: bool,
    pub efflux: bool,
}

/// The single process-wide status record, owned by the status actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoboticsStatus {
    pub mode: RoboticsMode,
    pub active_quad: Option<String>,
    pub vial_window: Vec<u32>,
    pub active_pumps: Vec<String>,
    pub arm: ArmMirror,
    pub octoprint: BTreeMap<String, bool>,
    pub prime_status: PrimeStatus,
}

impl Default for RoboticsStatus {
    fn default() -> Self {
        RoboticsStatus {
            mode: RoboticsMode::Idle,
            active_quad: None,
            vial_window: Vec::new(),
            active_pumps: Vec::new(),
            arm: ArmMirror::default(),
            octoprint: BTreeMap::new(),
            prime_status: PrimeStatus::default(),
        }
    }
}

impl RoboticsStatus {
    pub fn set_window(&mut self, window: &VialWindow) {
        self.vial_window = window.vials();
        self.active_pumps = window.pumps();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routine_may_start_only_from_idle_or_pause() {
        assert!(RoboticsMode::Idle.accepts_routine_start());
        assert!(RoboticsMode::Pause.accepts_routine_start());
        assert!(!RoboticsMode::Influx.accepts_routine_start());
        assert!(!RoboticsMode::EmergencyStop.accepts_routine_start());
    }
}
