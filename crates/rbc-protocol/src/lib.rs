//! Shared data model for the eVOLVER robotics coordination plane.
//!
//! These types cross crate boundaries: the serial framer and broadcast
//! engine exchange [`Command`]s and [`PhaseTag`]s, the fluidics engine
//! reports through [`RoboticsStatus`], and the event surface serializes
//! [`BroadcastMessage`] straight onto the wire.

mod command;
mod param;
mod pump;
mod status;
mod window;

pub use command::{Command, CommandKind, PhaseTag};
pub use param::{BroadcastMessage, ExperimentParameter, ParamValue};
pub use pump::{decompose_steps, PumpInstruction};
pub use status::{ArmMirror, PrimeStatus, RoboticsMode, RoboticsStatus};
pub use window::VialWindow;
