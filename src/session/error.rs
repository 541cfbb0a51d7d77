//! Session error taxonomy and recovery classification

use crate::calibration::CalibrationError;
use crate::hardware::TransportError;
use crate::protocol::{CodecError, Command, DeviceState};
use crate::session::state::SessionMode;
use crate::utils::ConfigError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Request could not be encoded
    Encode { command: Command, error: CodecError },
    /// Malformed or corrupt response to an outstanding request
    Frame { command: Command, sequence: u16, error: CodecError },
    /// No valid response within the retry budget
    Timeout { command: Command, sequence: u16, attempts: u32 },
    /// Operation attempted after close
    Closed { operation: &'static str },
    /// Operation not valid in the current mode
    InvalidState { operation: &'static str, mode: SessionMode },
    /// Board answered with a non-zero result word
    Device { command: Command, sequence: u16, result: u16 },
    /// Board never reached READY after BOOT
    DeviceNotReady { waited_ms: u64, last_state: Option<DeviceState> },
    /// Socket failure
    Transport(TransportError),
    /// Malformed calibration data
    Calibration(CalibrationError),
    /// Invalid session configuration
    Configuration(ConfigError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Encode { command, error } => {
                write!(f, "Cannot encode {}: {}", command, error)
            }
            SessionError::Frame { command, sequence, error } => {
                write!(f, "Bad response to {} #{}: {}", command, sequence, error)
            }
            SessionError::Timeout { command, sequence, attempts } => {
                write!(f, "No response to {} #{} after {} attempts", command, sequence, attempts)
            }
            SessionError::Closed { operation } => {
                write!(f, "Cannot {}: session is closed", operation)
            }
            SessionError::InvalidState { operation, mode } => {
                write!(f, "Cannot {} while {:?}", operation, mode)
            }
            SessionError::Device { command, sequence, result } => {
                write!(f, "Board rejected {} #{} with result 0x{:04X}", command, sequence, result)
            }
            SessionError::DeviceNotReady { waited_ms, last_state } => {
                write!(f, "Board not ready after {}ms (last state {:?})", waited_ms, last_state)
            }
            SessionError::Transport(error) => write!(f, "Transport error: {}", error),
            SessionError::Calibration(error) => write!(f, "Calibration error: {}", error),
            SessionError::Configuration(error) => write!(f, "Configuration error: {}", error),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Encode { error, .. } | SessionError::Frame { error, .. } => Some(error),
            SessionError::Transport(error) => Some(error),
            SessionError::Calibration(error) => Some(error),
            SessionError::Configuration(error) => Some(error),
            _ => None,
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(error: TransportError) -> Self {
        SessionError::Transport(error)
    }
}

impl From<CalibrationError> for SessionError {
    fn from(error: CalibrationError) -> Self {
        SessionError::Calibration(error)
    }
}

impl From<ConfigError> for SessionError {
    fn from(error: ConfigError) -> Self {
        SessionError::Configuration(error)
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// What a caller should do after a failed operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryStrategy {
    /// Retry the operation immediately
    Retry,
    /// Wait and then retry
    RetryWithDelay { delay_ms: u32 },
    /// Re-run the board bring-up sequence, then retry
    ReinitializeAndRetry,
    /// Fail permanently
    Fail,
}

impl SessionError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            SessionError::Frame { .. } => RecoveryStrategy::Retry,
            SessionError::Timeout { .. } => RecoveryStrategy::RetryWithDelay { delay_ms: 100 },
            SessionError::Device { .. } => RecoveryStrategy::ReinitializeAndRetry,
            SessionError::DeviceNotReady { .. } => RecoveryStrategy::ReinitializeAndRetry,
            SessionError::Transport(TransportError::Closed) => RecoveryStrategy::Fail,
            SessionError::Transport(_) => RecoveryStrategy::RetryWithDelay { delay_ms: 100 },
            SessionError::Encode { .. } => RecoveryStrategy::Fail,
            SessionError::Closed { .. } => RecoveryStrategy::Fail,
            SessionError::InvalidState { .. } => RecoveryStrategy::Fail,
            SessionError::Calibration(_) => RecoveryStrategy::Fail,
            SessionError::Configuration(_) => RecoveryStrategy::Fail,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self.recovery_strategy(), RecoveryStrategy::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_classification() {
        let timeout = SessionError::Timeout {
            command: Command::ReadOne,
            sequence: 4,
            attempts: 4,
        };
        assert!(timeout.is_recoverable());
        assert_eq!(timeout.to_string(), "No response to READ_ONE #4 after 4 attempts");

        let closed = SessionError::Closed { operation: "read_one" };
        assert!(!closed.is_recoverable());

        let calibration = SessionError::from(CalibrationError::Singular);
        assert_eq!(calibration.recovery_strategy(), RecoveryStrategy::Fail);
    }

    #[test]
    fn test_frame_error_keeps_context() {
        let error = SessionError::Frame {
            command: Command::Status,
            sequence: 12,
            error: CodecError::Checksum {
                expected: 0x1234,
                received: 0x4321,
                length: 14,
            },
        };
        let text = error.to_string();
        assert!(text.contains("STATUS #12"));
        assert!(text.contains("14 byte frame"));
        assert!(std::error::Error::source(&error).is_some());
    }
}
