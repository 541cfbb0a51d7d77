//! Calibration from raw axis counts to newtons and newton-metres

pub mod matrix;
pub mod transform;
pub mod auto_zero;

pub use matrix::{CalibrationError, CalibrationMatrix, CalibrationResult};
pub use transform::CalibrationTransform;
pub use auto_zero::{AutoZero, AutoZeroConfig};
