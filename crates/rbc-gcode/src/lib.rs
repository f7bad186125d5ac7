//! Pure `{pump -> steps} -> G-code text` builder.
//!
//! Kept free of any HTTP or filesystem concern beyond the final
//! `write_files` step, so the per-pump field shapes it produces are
//! cheap to test in isolation, with no HTTP client in the loop.

mod builder;
mod error;
mod write;

pub use builder::{build_aspirate, build_dispense, build_prime_pumps};
pub use error::GcodeError;
pub use write::write_files;
