//! Snake-path dispense/prime routine engine — the fluidic event,
//! vial grid geometry, vial-to-arm transform, and the prime/fill/
//! emergency-stop helpers built on top of them.

mod engine;
mod error;
mod grid;
mod immediate;
mod result;
mod steps;
mod transform;

pub use engine::FluidicsEngine;
pub use error::{FluidicEventError, HelperEventError};
pub use grid::{generate_windows, row_pumps, vial_xy, WindowPlan, ROWS, ROW_LEN, VIAL_PITCH_MM};
pub use immediate::ImmediateSink;
pub use result::{RoutineDone, RoutineResult};
pub use steps::PumpStepQueues;
pub use transform::{QuadTransform, RigidTransform2D};
