//! Typed configuration and calibration store.
//!
//! Loads/saves `conf.yml` and `robotics_server_conf.yml` into validated
//! structs, and owns the `calibrations.json` CRUD surface. All writes
//! are overwrite-on-write; there is no atomic rename contract.

mod calibration;
pub mod device_name;
mod error;
mod robotics;
mod root;

pub use calibration::{CalibrationFit, CalibrationRecord, CalibrationStore};
pub use error::ConfigError;
pub use robotics::{
    EffluxAddress, PrintServerConfig, PumpConfig, QuadHoming, ReferencePoint, RoboticsConfig,
};
pub use root::{RootConfig, SerialConfig};
