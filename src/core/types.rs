//! Core sample types shared by the codec, calibration and session layers

use crate::core::constants::AXIS_COUNT;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Force/torque axis index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Fx = 0,
    Fy = 1,
    Fz = 2,
    Mx = 3,
    My = 4,
    Mz = 5,
}

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [Axis::Fx, Axis::Fy, Axis::Fz, Axis::Mx, Axis::My, Axis::Mz];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Torque axes are reported in N·m, force axes in N
    pub fn is_torque(self) -> bool {
        matches!(self, Axis::Mx | Axis::My | Axis::Mz)
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::Fx => "Fx",
            Axis::Fy => "Fy",
            Axis::Fz => "Fz",
            Axis::Mx => "Mx",
            Axis::My => "My",
            Axis::Mz => "Mz",
        }
    }
}

/// Undecoded axis counts as reported by the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    /// Fx, Fy, Fz, Mx, My, Mz in counts
    pub counts: [i32; AXIS_COUNT],
    /// Board measurement counter, wraps at u16
    pub device_counter: u16,
    /// Board measurement status word
    pub measurement_status: u16,
    /// Time since the previous board measurement (microseconds)
    pub interval_us: u32,
}

impl RawSample {
    pub fn new(counts: [i32; AXIS_COUNT]) -> Self {
        Self {
            counts,
            ..Default::default()
        }
    }

    pub fn with_device_counter(mut self, counter: u16) -> Self {
        self.device_counter = counter;
        self
    }

    pub fn with_interval(mut self, interval_us: u32) -> Self {
        self.interval_us = interval_us;
        self
    }

    pub fn count(&self, axis: Axis) -> i32 {
        self.counts[axis.index()]
    }
}

/// Calibrated force/torque reading
///
/// Values are fixed at construction; there are no setters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    timestamp_us: u64,
    device_counter: u16,
    values: [f64; AXIS_COUNT],
}

impl Sample {
    pub fn new(timestamp_us: u64, device_counter: u16, values: [f64; AXIS_COUNT]) -> Self {
        Self {
            timestamp_us,
            device_counter,
            values,
        }
    }

    /// Host receive time in microseconds since the UNIX epoch
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn device_counter(&self) -> u16 {
        self.device_counter
    }

    pub fn values(&self) -> &[f64; AXIS_COUNT] {
        &self.values
    }

    pub fn get(&self, axis: Axis) -> f64 {
        self.values[axis.index()]
    }

    pub fn fx(&self) -> f64 {
        self.values[0]
    }

    pub fn fy(&self) -> f64 {
        self.values[1]
    }

    pub fn fz(&self) -> f64 {
        self.values[2]
    }

    pub fn mx(&self) -> f64 {
        self.values[3]
    }

    pub fn my(&self) -> f64 {
        self.values[4]
    }

    pub fn mz(&self) -> f64 {
        self.values[5]
    }
}

/// Microseconds since the UNIX epoch
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_order_matches_wire_order() {
        for (i, axis) in Axis::ALL.iter().enumerate() {
            assert_eq!(axis.index(), i);
        }
        assert!(!Axis::Fz.is_torque());
        assert!(Axis::Mx.is_torque());
    }

    #[test]
    fn test_sample_accessors() {
        let sample = Sample::new(42, 7, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(sample.timestamp_us(), 42);
        assert_eq!(sample.device_counter(), 7);
        assert_eq!(sample.fx(), 1.0);
        assert_eq!(sample.mz(), 6.0);
        assert_eq!(sample.get(Axis::My), 5.0);
    }
}
