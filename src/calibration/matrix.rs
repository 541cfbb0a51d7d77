//! Sensitivity matrix and bias vector loaded from static configuration

use crate::core::constants::{AXIS_COUNT, FORCE_COUNTS_PER_NEWTON, TORQUE_COUNTS_PER_NEWTON_METRE};
use nalgebra::{Matrix6, Vector6};
use std::fmt;

/// Malformed calibration data; raised before any sampling starts
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Row or vector has the wrong number of entries
    Dimension { what: String, expected: usize, found: usize },
    /// NaN or infinite coefficient
    NonFinite { what: String, row: usize, col: usize },
    /// Sensitivity matrix has no inverse (every axis must be observable)
    Singular,
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::Dimension { what, expected, found } => {
                write!(f, "Calibration {}: expected {} entries, found {}", what, expected, found)
            }
            CalibrationError::NonFinite { what, row, col } => {
                write!(f, "Calibration {} has a non-finite entry at ({}, {})", what, row, col)
            }
            CalibrationError::Singular => write!(f, "Calibration sensitivity matrix is singular"),
        }
    }
}

impl std::error::Error for CalibrationError {}

pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// Fixed sensitivity coefficients plus the count-domain bias
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMatrix {
    pub sensitivity: Matrix6<f64>,
    pub bias: Vector6<f64>,
}

impl CalibrationMatrix {
    /// Decoupled axes: `physical[i] = (raw[i] - bias[i]) * sensitivity[i]`
    pub fn diagonal(sensitivity: [f64; AXIS_COUNT], bias: [f64; AXIS_COUNT]) -> CalibrationResult<Self> {
        let matrix = Self {
            sensitivity: Matrix6::from_diagonal(&Vector6::from_row_slice(&sensitivity)),
            bias: Vector6::from_row_slice(&bias),
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Full 6×6 cross-coupled matrix from row-major data
    pub fn from_rows(rows: &[Vec<f64>], bias: &[f64]) -> CalibrationResult<Self> {
        if rows.len() != AXIS_COUNT {
            return Err(CalibrationError::Dimension {
                what: "matrix rows".to_string(),
                expected: AXIS_COUNT,
                found: rows.len(),
            });
        }
        for row in rows {
            if row.len() != AXIS_COUNT {
                return Err(CalibrationError::Dimension {
                    what: "matrix row".to_string(),
                    expected: AXIS_COUNT,
                    found: row.len(),
                });
            }
        }
        if bias.len() != AXIS_COUNT {
            return Err(CalibrationError::Dimension {
                what: "bias".to_string(),
                expected: AXIS_COUNT,
                found: bias.len(),
            });
        }

        let matrix = Self {
            sensitivity: Matrix6::from_fn(|r, c| rows[r][c]),
            bias: Vector6::from_row_slice(bias),
        };
        matrix.validate()?;
        Ok(matrix)
    }

    /// Evaluation board factory scaling with zero bias
    pub fn factory_default() -> Self {
        let force = 1.0 / FORCE_COUNTS_PER_NEWTON;
        let torque = 1.0 / TORQUE_COUNTS_PER_NEWTON_METRE;
        Self {
            sensitivity: Matrix6::from_diagonal(&Vector6::new(force, force, force, torque, torque, torque)),
            bias: Vector6::zeros(),
        }
    }

    pub fn validate(&self) -> CalibrationResult<()> {
        for r in 0..AXIS_COUNT {
            for c in 0..AXIS_COUNT {
                if !self.sensitivity[(r, c)].is_finite() {
                    return Err(CalibrationError::NonFinite {
                        what: "sensitivity".to_string(),
                        row: r,
                        col: c,
                    });
                }
            }
            if !self.bias[r].is_finite() {
                return Err(CalibrationError::NonFinite {
                    what: "bias".to_string(),
                    row: r,
                    col: 0,
                });
            }
        }

        if self.sensitivity.determinant().abs() < f64::MIN_POSITIVE {
            return Err(CalibrationError::Singular);
        }

        Ok(())
    }
}

impl Default for CalibrationMatrix {
    fn default() -> Self {
        Self::factory_default()
    }
}
