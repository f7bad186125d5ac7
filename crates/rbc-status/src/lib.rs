//! Process-wide robotics status actor and event bus.
//!
//! A single Tokio task owns the [`RoboticsStatus`] record; every other
//! task talks to it through a cheap-to-clone [`StatusHandle`], never by
//! touching the record directly. Every mutation serialises through the
//! owning task and every read gets an immutable snapshot.

mod actor;
mod handle;
mod msg;

pub use actor::spawn;
pub use handle::{StatusHandle, StatusHandleError};
pub use msg::StatusError;

pub use rbc_protocol::{ArmMirror, PrimeStatus, RoboticsMode, RoboticsStatus};
