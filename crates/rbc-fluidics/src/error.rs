//! Error kinds raised while running a fluidic routine.

use thiserror::Error;

/// Failures from within a single fluidic event or helper routine.
/// Every variant here is fatal to the enclosing routine; the engine
/// catches it, calls `stop_robotics`, and reports `done: "error"`.
#[derive(Debug, Error)]
pub enum FluidicEventError {
    #[error("writing gcode: {0}")]
    Gcode(#[from] rbc_gcode::GcodeError),

    #[error("print-server request failed: {0}")]
    PumpClient(#[from] rbc_pump_client::OctoPrintError),

    #[error("arm move failed: {0}")]
    Arm(#[from] rbc_arm::ArmError),

    #[error("status actor error: {0}")]
    Status(#[from] rbc_status::StatusHandleError),

    #[error("check_status polling exceeded {timeout_secs}s waiting for every print-server to report done")]
    CheckStatusTimeout { timeout_secs: u64 },

    #[error("mode latched to EmergencyStop while waiting on check_pause")]
    EmergencyStop,

    #[error("prime_influx already primed")]
    AlreadyPrimed,

    #[error("quad '{0}' is not present in the robotics configuration")]
    UnknownQuad(String),
}

/// Outermost wrapper surfaced to the client, naming which routine
/// aborted.
#[derive(Debug, Error)]
#[error("routine '{routine}' aborted: {source}")]
pub struct HelperEventError {
    pub routine: String,
    #[source]
    pub source: FluidicEventError,
}

impl HelperEventError {
    pub fn new(routine: impl Into<String>, source: FluidicEventError) -> Self {
        HelperEventError {
            routine: routine.into(),
            source,
        }
    }
}
