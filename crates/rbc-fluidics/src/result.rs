//! The result record every routine entry point returns.

use rbc_protocol::RoboticsStatus;
use serde::Serialize;

/// `Bool(false)` covers the "already primed" no-op case; `Bool(true)`
/// is a normal completion; `Error` carries the message a caught
/// [`crate::error::FluidicEventError`] was raised with.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RoutineDone {
    Bool(bool),
    Error(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineResult {
    pub done: RoutineDone,
    pub routine: String,
    pub robotics_status: RoboticsStatus,
    pub elapsed_time: f64,
    pub message: String,
}
