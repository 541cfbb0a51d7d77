//! Core types and constants for the force/torque sampling system

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
