//! Length/field-typed line framer for the microcontroller serial link.
//!
//! Owns the wire protocol (`evolver_server.py`'s `serial_communication`)
//! and the exclusive-lock resource policy around it: every `send()`
//! call holds the port for the full request/ack
//! exchange, running on a blocking worker thread so the async
//! scheduler and broadcast loop never stall on hardware I/O.

mod error;
mod framer;
mod transport;

pub use error::SerialError;
pub use framer::SerialFramer;
pub use transport::SerialPortTransport;

#[cfg(any(test, feature = "test-util"))]
pub use transport::MockTransport;

pub use transport::SerialTransport;
