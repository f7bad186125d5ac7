//! Typed wrapper over the vendor six-axis arm API.
//!
//! Vendor callbacks arrive off-runtime; [`ArmDriver::handle_callback`]
//! is the single point where they're marshalled into the status
//! actor, never mutating shared state directly.

mod driver;
mod error;
mod tcp_transport;
mod transport;

pub use driver::{ArmCallbackEvent, ArmDefaults, ArmDriver};
pub use error::ArmError;
pub use tcp_transport::TcpArmTransport;
pub use transport::{ArmPosition, ArmTransport};

#[cfg(any(test, feature = "test-util"))]
pub use transport::MockArmTransport;
