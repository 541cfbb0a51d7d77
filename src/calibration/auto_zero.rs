//! Rolling zero-offset estimator
//!
//! While the sensor is unloaded, raw counts are averaged over a fixed window
//! and the mean becomes the new bias. Once past the warm-up period, samples
//! whose calibrated axis sum exceeds the contact threshold are treated as
//! loaded and left out of the average.

use crate::calibration::transform::CalibrationTransform;
use crate::core::constants::AXIS_COUNT;
use crate::core::types::{RawSample, Sample};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoZeroConfig {
    /// Samples averaged per bias update
    pub window: u32,
    /// |Σ calibrated axes| above which the sensor is considered loaded
    pub contact_threshold: f64,
    /// Samples during which every reading counts toward the offset
    pub warmup_samples: u64,
}

impl Default for AutoZeroConfig {
    fn default() -> Self {
        Self {
            window: 300,
            contact_threshold: 0.1,
            warmup_samples: 5000,
        }
    }
}

#[derive(Debug)]
pub struct AutoZero {
    config: AutoZeroConfig,
    sums: [f64; AXIS_COUNT],
    accumulated: u32,
    observed: u64,
    in_contact: bool,
}

impl AutoZero {
    pub fn new(config: AutoZeroConfig) -> Self {
        Self {
            config,
            sums: [0.0; AXIS_COUNT],
            accumulated: 0,
            observed: 0,
            in_contact: false,
        }
    }

    /// Feed one reading; returns true when the transform bias was updated
    pub fn observe(&mut self, raw: &RawSample, sample: &Sample, transform: &CalibrationTransform) -> bool {
        let warming_up = self.observed < self.config.warmup_samples;
        self.observed += 1;

        let load: f64 = sample.values().iter().sum();
        self.in_contact = !warming_up && load.abs() > self.config.contact_threshold;
        if self.in_contact {
            return false;
        }

        for (sum, &count) in self.sums.iter_mut().zip(raw.counts.iter()) {
            *sum += count as f64;
        }
        self.accumulated += 1;

        if self.accumulated < self.config.window.max(1) {
            return false;
        }

        let n = self.accumulated as f64;
        let bias = self.sums.map(|s| s / n);
        debug!(?bias, samples = self.accumulated, "auto-zero bias update");
        transform.set_bias(bias);

        self.sums = [0.0; AXIS_COUNT];
        self.accumulated = 0;
        true
    }

    /// Whether the last observed sample was treated as loaded
    pub fn in_contact(&self) -> bool {
        self.in_contact
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(auto_zero: &mut AutoZero, transform: &CalibrationTransform, counts: [i32; 6], times: usize) -> usize {
        let mut updates = 0;
        for _ in 0..times {
            let raw = RawSample::new(counts);
            let sample = transform.apply(&raw);
            if auto_zero.observe(&raw, &sample, transform) {
                updates += 1;
            }
        }
        updates
    }

    #[test]
    fn test_bias_tracks_unloaded_mean() {
        let transform = CalibrationTransform::default();
        let mut auto_zero = AutoZero::new(AutoZeroConfig {
            window: 10,
            contact_threshold: 0.1,
            warmup_samples: 100,
        });

        let updates = run(&mut auto_zero, &transform, [40, -20, 10, 0, 0, 0], 25);
        assert_eq!(updates, 2);
        assert_eq!(transform.bias(), [40.0, -20.0, 10.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_contact_after_warmup_is_excluded() {
        let transform = CalibrationTransform::default();
        let mut auto_zero = AutoZero::new(AutoZeroConfig {
            window: 5,
            contact_threshold: 0.1,
            warmup_samples: 5,
        });

        run(&mut auto_zero, &transform, [0; 6], 5);
        assert_eq!(transform.bias(), [0.0; 6]);

        // 2 N on Fx is well above the threshold
        let updates = run(&mut auto_zero, &transform, [2000, 0, 0, 0, 0, 0], 20);
        assert_eq!(updates, 0);
        assert!(auto_zero.in_contact());
        assert_eq!(transform.bias(), [0.0; 6]);
        assert_eq!(auto_zero.observed(), 25);
    }

    #[test]
    fn test_loading_during_warmup_still_averaged() {
        let transform = CalibrationTransform::default();
        let mut auto_zero = AutoZero::new(AutoZeroConfig {
            window: 4,
            contact_threshold: 0.1,
            warmup_samples: 1000,
        });

        let updates = run(&mut auto_zero, &transform, [2000, 0, 0, 0, 0, 0], 4);
        assert_eq!(updates, 1);
        assert_eq!(transform.bias()[0], 2000.0);
    }
}
