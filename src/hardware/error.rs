//! Transport error types

use std::fmt;

/// Datagram transport failures
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Source port could not be bound
    BindFailed { address: String, message: String },
    /// Destination address did not resolve
    InvalidAddress { address: String },
    /// Socket-level failure during send or receive
    Io { operation: String, message: String },
    /// Short send
    Incomplete { sent: usize, expected: usize },
    /// Transport already closed
    Closed,
    /// Failure reported by a simulated transport
    HardwareError { code: u32, description: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::BindFailed { address, message } => {
                write!(f, "Failed to bind {}: {}", address, message)
            }
            TransportError::InvalidAddress { address } => {
                write!(f, "Cannot resolve destination {}", address)
            }
            TransportError::Io { operation, message } => {
                write!(f, "Socket {} failed: {}", operation, message)
            }
            TransportError::Incomplete { sent, expected } => {
                write!(f, "Sent {} of {} bytes", sent, expected)
            }
            TransportError::Closed => write!(f, "Transport is closed"),
            TransportError::HardwareError { code, description } => {
                write!(f, "Hardware error {}: {}", code, description)
            }
        }
    }
}

impl std::error::Error for TransportError {}

pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    pub(crate) fn io(operation: &str, error: std::io::Error) -> Self {
        TransportError::Io {
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }
}
