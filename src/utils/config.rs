use crate::calibration::{AutoZeroConfig, CalibrationError, CalibrationMatrix, CalibrationResult};
use crate::core::constants::{
    AXIS_COUNT, DEFAULT_DEST_IP, DEFAULT_DEST_PORT, DEFAULT_SRC_PORT, FORCE_COUNTS_PER_NEWTON,
    MAX_SENSOR_SLOT, TORQUE_COUNTS_PER_NEWTON_METRE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Link and timing parameters for one sampling session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Evaluation board address
    pub dest_ip: String,
    /// Evaluation board command port
    pub dest_port: u16,
    /// Local port the board replies to (0 picks an ephemeral port)
    pub src_port: u16,
    /// Samples a consumer should collect before stopping
    pub measure_max: u32,
    /// Trace every frame as hex
    pub debug: bool,
    /// Wait per attempt for a polled response (milliseconds)
    pub response_timeout_ms: u32,
    /// Resends after the first attempt times out
    pub max_retries: u8,
    /// Receive bound while streaming; also the stop/close latency (milliseconds)
    pub stream_poll_ms: u32,
    /// Quiet period that ends the post-STOP drain (milliseconds)
    pub stream_grace_ms: u32,
    /// Time allowed for the board to reach READY after BOOT (milliseconds)
    pub boot_timeout_ms: u32,
    /// Interval between STATUS polls while booting (milliseconds)
    pub boot_poll_ms: u32,
    /// Sensor slot on the evaluation board (1-based)
    pub sensor: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dest_ip: DEFAULT_DEST_IP.to_string(),
            dest_port: DEFAULT_DEST_PORT,
            src_port: DEFAULT_SRC_PORT,
            measure_max: 10,
            debug: false,
            response_timeout_ms: 800,
            max_retries: 3,
            stream_poll_ms: 100,
            stream_grace_ms: 50,
            boot_timeout_ms: 5000,
            boot_poll_ms: 10,
            sensor: 1,
        }
    }
}

impl SessionConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms as u64)
    }

    pub fn stream_poll(&self) -> Duration {
        Duration::from_millis(self.stream_poll_ms as u64)
    }

    pub fn stream_grace(&self) -> Duration {
        Duration::from_millis(self.stream_grace_ms as u64)
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms as u64)
    }

    pub fn boot_poll(&self) -> Duration {
        Duration::from_millis(self.boot_poll_ms as u64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dest_ip.trim().is_empty() {
            return Err(ConfigError::invalid("dest_ip", &self.dest_ip, "must not be empty"));
        }
        if self.dest_port == 0 {
            return Err(ConfigError::invalid("dest_port", "0", "must be a real port"));
        }
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::invalid("response_timeout_ms", "0", "must be positive"));
        }
        if self.stream_poll_ms == 0 {
            return Err(ConfigError::invalid("stream_poll_ms", "0", "must be positive"));
        }
        if self.stream_grace_ms == 0 {
            return Err(ConfigError::invalid("stream_grace_ms", "0", "must be positive"));
        }
        if self.boot_poll_ms == 0 || self.boot_poll_ms > self.boot_timeout_ms {
            return Err(ConfigError::invalid(
                "boot_poll_ms",
                &self.boot_poll_ms.to_string(),
                "must be positive and no longer than boot_timeout_ms",
            ));
        }
        if self.sensor == 0 || self.sensor > MAX_SENSOR_SLOT {
            return Err(ConfigError::invalid(
                "sensor",
                &self.sensor.to_string(),
                "sensor slot must be 1..=5",
            ));
        }
        Ok(())
    }
}

/// How raw counts map to physical units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SensitivityModel {
    /// Decoupled axes, one coefficient each
    Diagonal { coefficients: Vec<f64> },
    /// Full 6×6 row-major matrix
    Matrix { rows: Vec<Vec<f64>> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub sensitivity: SensitivityModel,
    /// Zero offset in counts
    pub bias: Vec<f64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let force = 1.0 / FORCE_COUNTS_PER_NEWTON;
        let torque = 1.0 / TORQUE_COUNTS_PER_NEWTON_METRE;
        Self {
            sensitivity: SensitivityModel::Diagonal {
                coefficients: vec![force, force, force, torque, torque, torque],
            },
            bias: vec![0.0; AXIS_COUNT],
        }
    }
}

impl CalibrationConfig {
    pub fn to_matrix(&self) -> CalibrationResult<CalibrationMatrix> {
        match &self.sensitivity {
            SensitivityModel::Diagonal { coefficients } => {
                let coefficients: [f64; AXIS_COUNT] = coefficients.as_slice().try_into().map_err(|_| {
                    CalibrationError::Dimension {
                        what: "diagonal coefficients".to_string(),
                        expected: AXIS_COUNT,
                        found: coefficients.len(),
                    }
                })?;
                let bias: [f64; AXIS_COUNT] =
                    self.bias.as_slice().try_into().map_err(|_| CalibrationError::Dimension {
                        what: "bias".to_string(),
                        expected: AXIS_COUNT,
                        found: self.bias.len(),
                    })?;
                CalibrationMatrix::diagonal(coefficients, bias)
            }
            SensitivityModel::Matrix { rows } => CalibrationMatrix::from_rows(rows, &self.bias),
        }
    }
}

/// Everything the sampling binary needs, as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub calibration: CalibrationConfig,
    pub auto_zero: Option<AutoZeroConfig>,
}

impl AppConfig {
    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        let config = Self::from_json(&content).map_err(|e| match e {
            ConfigError::SerializationError { message } => ConfigError::SerializationError {
                message: format!("Failed to parse config file '{}': {}", path_str, message),
            },
            other => other,
        })?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(content).map_err(|e| ConfigError::SerializationError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
            message: e.to_string(),
        })?;
        fs::write(&path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        self.calibration.to_matrix().map_err(ConfigError::Calibration)?;
        if let Some(auto_zero) = &self.auto_zero {
            if auto_zero.window == 0 {
                return Err(ConfigError::invalid("auto_zero.window", "0", "must be positive"));
            }
            if !(auto_zero.contact_threshold.is_finite() && auto_zero.contact_threshold >= 0.0) {
                return Err(ConfigError::invalid(
                    "auto_zero.contact_threshold",
                    &auto_zero.contact_threshold.to_string(),
                    "must be a non-negative number",
                ));
            }
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Invalid parameter value
    InvalidParameter { parameter: String, value: String, reason: String },
    /// Configuration file I/O error
    IoError { message: String },
    /// JSON serialization/deserialization error
    SerializationError { message: String },
    /// Calibration matrix or bias is malformed
    Calibration(CalibrationError),
}

impl ConfigError {
    fn invalid(parameter: &str, value: &str, reason: &str) -> Self {
        ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidParameter { parameter, value, reason } => {
                write!(f, "Invalid {} = {}: {}", parameter, value, reason)
            }
            ConfigError::IoError { message } => write!(f, "{}", message),
            ConfigError::SerializationError { message } => write!(f, "{}", message),
            ConfigError::Calibration(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.dest_port, 1366);
        assert_eq!(config.session.src_port, 2000);
        assert_eq!(config.session.response_timeout(), Duration::from_millis(800));
        assert_eq!(config.calibration.to_matrix().unwrap(), CalibrationMatrix::factory_default());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "session": { "dest_ip": "10.0.0.5", "src_port": 2100, "debug": true },
            "calibration": {
                "sensitivity": { "model": "diagonal", "coefficients": [0.01, 0.01, 0.01, 0.01, 0.01, 0.01] },
                "bias": [1, 2, 3, 4, 5, 6]
            },
            "auto_zero": { "window": 50, "contact_threshold": 0.2, "warmup_samples": 100 }
        }"#;
        let config = AppConfig::from_json(json).unwrap();
        assert_eq!(config.session.dest_ip, "10.0.0.5");
        assert_eq!(config.session.src_port, 2100);
        assert_eq!(config.session.dest_port, 1366);
        assert!(config.session.debug);
        assert_eq!(config.auto_zero.unwrap().window, 50);

        let matrix = config.calibration.to_matrix().unwrap();
        assert_eq!(matrix.sensitivity[(2, 2)], 0.01);
        assert_eq!(matrix.bias[5], 6.0);
    }

    #[test]
    fn test_full_matrix_model() {
        let json = r#"{
            "calibration": {
                "sensitivity": { "model": "matrix", "rows": [
                    [1, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0], [0, 0, 1, 0, 0, 0],
                    [0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 1, 0], [0.5, 0, 0, 0, 0, 1]
                ] },
                "bias": [0, 0, 0, 0, 0, 0]
            }
        }"#;
        let config = AppConfig::from_json(json).unwrap();
        let matrix = config.calibration.to_matrix().unwrap();
        assert_eq!(matrix.sensitivity[(5, 0)], 0.5);
    }

    #[test]
    fn test_bad_calibration_fails_fast() {
        let json = r#"{
            "calibration": {
                "sensitivity": { "model": "diagonal", "coefficients": [0.01, 0.01] },
                "bias": [0, 0, 0, 0, 0, 0]
            }
        }"#;
        let result = AppConfig::from_json(json);
        assert!(matches!(
            result,
            Err(ConfigError::Calibration(CalibrationError::Dimension { found: 2, .. }))
        ));
    }

    #[test]
    fn test_session_validation() {
        let mut config = SessionConfig::default();
        config.sensor = 6;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidParameter { .. })));

        let mut config = SessionConfig::default();
        config.response_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.dest_ip = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        let result = AppConfig::from_json("{ not json");
        assert!(matches!(result, Err(ConfigError::SerializationError { .. })));
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join(format!("mms101-config-{}.json", std::process::id()));
        let mut config = AppConfig::default();
        config.session.measure_max = 250;
        config.auto_zero = Some(AutoZeroConfig::default());
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_file("/nonexistent/mms101.json");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
