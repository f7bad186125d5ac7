use rbc_protocol::RoboticsMode;
use thiserror::Error;
use tokio::sync::oneshot;

/// Rejections the status actor can hand back on a `SetMode` request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("cannot start a routine from mode {from:?}; must be Idle or Pause")]
    RoutineNotStartable { from: RoboticsMode },
    #[error("status is latched in EmergencyStop; an operator override is required")]
    Latched,
}

/// The status actor's mailbox, grounded in `services/server/src/state.rs`'s
/// `ForwarderCommand` enum and its oneshot-reply convention.
pub enum StatusMsg {
    Snapshot(oneshot::Sender<rbc_protocol::RoboticsStatus>),
    SetMode(RoboticsMode, oneshot::Sender<Result<(), StatusError>>),
    SetArmState {
        connected: Option<bool>,
        error_code: Option<i32>,
        warn_code: Option<i32>,
        state: Option<i32>,
        reply: oneshot::Sender<()>,
    },
    SetOctoConnected(String, bool, oneshot::Sender<()>),
    SetPrime {
        influx: Option<bool>,
        efflux: Option<bool>,
        reply: oneshot::Sender<()>,
    },
    SetWindow {
        active_quad: Option<String>,
        vial_window: Vec<u32>,
        active_pumps: Vec<String>,
        reply: oneshot::Sender<()>,
    },
    Override(oneshot::Sender<()>),
}
