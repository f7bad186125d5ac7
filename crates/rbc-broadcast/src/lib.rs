//! Three-phase broadcast cycle driving the serial framer and command
//! queue.
//!
//! Owns the Idle / RunningBroadcast / RunningImmediate interlock that
//! keeps broadcast phases and externally injected immediates from
//! touching the serial port at the same time.

mod engine;
mod state;

pub use engine::BroadcastEngine;
pub use state::BroadcastState;
