//! Raw count to engineering unit conversion

use crate::calibration::matrix::{CalibrationMatrix, CalibrationResult};
use crate::core::constants::AXIS_COUNT;
use crate::core::types::{now_micros, RawSample, Sample};
use nalgebra::{Matrix6, Vector6};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Applies `physical = M · (raw - bias)`
///
/// The sensitivity matrix is fixed for the lifetime of the transform. The
/// bias sits behind a mutex: `apply` takes one snapshot per sample, so a
/// concurrent `tare` lands either wholly before or wholly after it.
#[derive(Debug)]
pub struct CalibrationTransform {
    sensitivity: Matrix6<f64>,
    bias: Mutex<Vector6<f64>>,
}

impl CalibrationTransform {
    pub fn new(calibration: CalibrationMatrix) -> CalibrationResult<Self> {
        calibration.validate()?;
        Ok(Self {
            sensitivity: calibration.sensitivity,
            bias: Mutex::new(calibration.bias),
        })
    }

    /// Convert raw counts, stamping the sample with the current host time
    pub fn apply(&self, raw: &RawSample) -> Sample {
        self.apply_at(raw, now_micros())
    }

    /// Convert raw counts with an explicit capture timestamp
    pub fn apply_at(&self, raw: &RawSample, timestamp_us: u64) -> Sample {
        let bias = *self.lock_bias();
        let counts = Vector6::from_fn(|i, _| raw.counts[i] as f64);
        let physical = self.sensitivity * (counts - bias);

        let mut values = [0.0; AXIS_COUNT];
        values.copy_from_slice(physical.as_slice());
        Sample::new(timestamp_us, raw.device_counter, values)
    }

    /// Make the current loading read as zero
    pub fn tare(&self, current: &RawSample) {
        let bias = Vector6::from_fn(|i, _| current.counts[i] as f64);
        debug!(bias = ?current.counts, "tare");
        *self.lock_bias() = bias;
    }

    /// Replace the bias with an externally computed offset (counts)
    pub fn set_bias(&self, bias: [f64; AXIS_COUNT]) {
        *self.lock_bias() = Vector6::from_row_slice(&bias);
    }

    pub fn bias(&self) -> [f64; AXIS_COUNT] {
        let bias = self.lock_bias();
        let mut out = [0.0; AXIS_COUNT];
        out.copy_from_slice(bias.as_slice());
        out
    }

    /// Bias rounded to whole counts, as loaded by SET_BIAS
    pub fn bias_counts(&self) -> [i32; AXIS_COUNT] {
        self.bias().map(|b| b.round() as i32)
    }

    pub fn sensitivity(&self) -> &Matrix6<f64> {
        &self.sensitivity
    }

    fn lock_bias(&self) -> MutexGuard<'_, Vector6<f64>> {
        // The bias is a plain value; a panic elsewhere cannot leave it half written
        self.bias.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CalibrationTransform {
    fn default() -> Self {
        let calibration = CalibrationMatrix::factory_default();
        Self {
            sensitivity: calibration.sensitivity,
            bias: Mutex::new(calibration.bias),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const TOLERANCE: f64 = 1e-9;

    fn uniform(sensitivity: f64) -> CalibrationTransform {
        CalibrationTransform::new(CalibrationMatrix::diagonal([sensitivity; 6], [0.0; 6]).unwrap()).unwrap()
    }

    fn coupled() -> CalibrationTransform {
        let rows: Vec<Vec<f64>> = (0..6)
            .map(|r| (0..6).map(|c| if r == c { 0.01 } else { 0.0005 * (r as f64 - c as f64) }).collect())
            .collect();
        let bias = [12.0, -7.0, 3.0, 0.0, 250.0, -1.0];
        CalibrationTransform::new(CalibrationMatrix::from_rows(&rows, &bias).unwrap()).unwrap()
    }

    #[test]
    fn test_single_axis_example() {
        let transform = uniform(0.01);
        let sample = transform.apply(&RawSample::new([100, 0, 0, 0, 0, 0]));
        assert!((sample.fx() - 1.0).abs() < TOLERANCE);
        for value in &sample.values()[1..] {
            assert_eq!(*value, 0.0);
        }
    }

    #[test]
    fn test_factory_scaling() {
        let transform = CalibrationTransform::default();
        let sample = transform.apply(&RawSample::new([1500, -2000, 0, 100_000, 0, -50_000]));
        assert!((sample.fx() - 1.5).abs() < TOLERANCE);
        assert!((sample.fy() + 2.0).abs() < TOLERANCE);
        assert!((sample.mx() - 1.0).abs() < TOLERANCE);
        assert!((sample.mz() + 0.5).abs() < TOLERANCE);
    }

    #[test]
    fn test_linearity_after_bias_subtraction() {
        let transform = coupled();
        let bias = transform.bias_counts();
        let r1 = [1000, -2000, 30, 400_000, -5, 6];
        let r2 = [-300, 70, 8_000, -90, 10, -11];
        let combined: [i32; 6] = std::array::from_fn(|i| r1[i] + r2[i] - bias[i]);

        let a = transform.apply(&RawSample::new(r1));
        let b = transform.apply(&RawSample::new(r2));
        let z = transform.apply(&RawSample::new(bias));
        let c = transform.apply(&RawSample::new(combined));

        for i in 0..6 {
            let lhs = a.values()[i] + b.values()[i] - 2.0 * z.values()[i];
            assert!((lhs - c.values()[i]).abs() < 1e-6, "axis {}: {} vs {}", i, lhs, c.values()[i]);
        }
    }

    #[test]
    fn test_tare_zeroes_current_loading() {
        let transform = coupled();
        let loaded = RawSample::new([5_000, -12_345, 777, 1, -200_000, 42]);
        assert!(transform.apply(&loaded).fx().abs() > 1.0);

        transform.tare(&loaded);
        let sample = transform.apply(&loaded);
        for value in sample.values() {
            assert!(value.abs() < TOLERANCE);
        }
        assert_eq!(transform.bias_counts(), loaded.counts);
    }

    #[test]
    fn test_apply_keeps_device_counter_and_timestamp() {
        let transform = uniform(1.0);
        let raw = RawSample::new([1, 2, 3, 4, 5, 6]).with_device_counter(321);
        let sample = transform.apply_at(&raw, 99);
        assert_eq!(sample.device_counter(), 321);
        assert_eq!(sample.timestamp_us(), 99);
        assert_eq!(*sample.values(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_set_bias() {
        let transform = uniform(0.5);
        transform.set_bias([2.0; 6]);
        let sample = transform.apply(&RawSample::new([4; 6]));
        assert_eq!(*sample.values(), [1.0; 6]);
    }

    #[test]
    fn test_concurrent_tare_never_splits_a_sample() {
        let transform = Arc::new(uniform(1.0));
        let raw = RawSample::new([1000; 6]);

        let tarer = {
            let transform = Arc::clone(&transform);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let bias = if i % 2 == 0 { 0 } else { 1000 };
                    transform.tare(&RawSample::new([bias; 6]));
                }
            })
        };

        for _ in 0..2000 {
            let sample = transform.apply(&raw);
            let first = sample.values()[0];
            assert!(sample.values().iter().all(|v| *v == first));
        }
        tarer.join().unwrap();
    }
}
