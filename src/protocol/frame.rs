//! Frame value type and command vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;

/// Board command codes
///
/// Codes not in this list still decode (as `Unknown`) so the caller can
/// decide how to reject them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Poll one measurement
    ReadOne,
    /// Start unsolicited measurement frames
    StartStream,
    /// Stop unsolicited measurement frames
    StopStream,
    /// Load a zero offset into the board
    SetBias,
    Reset,
    /// Select bus and sensor slot
    Select,
    Boot,
    Status,
    Version,
    Restart,
    Unknown(u8),
}

impl Command {
    pub fn from_code(code: u8) -> Self {
        match code {
            0xE0 => Command::ReadOne,
            0xF0 => Command::StartStream,
            0xB2 => Command::StopStream,
            0xD0 => Command::SetBias,
            0xB4 => Command::Reset,
            0xA0 => Command::Select,
            0xB0 => Command::Boot,
            0x80 => Command::Status,
            0xA2 => Command::Version,
            0xC0 => Command::Restart,
            other => Command::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Command::ReadOne => 0xE0,
            Command::StartStream => 0xF0,
            Command::StopStream => 0xB2,
            Command::SetBias => 0xD0,
            Command::Reset => 0xB4,
            Command::Select => 0xA0,
            Command::Boot => 0xB0,
            Command::Status => 0x80,
            Command::Version => 0xA2,
            Command::Restart => 0xC0,
            Command::Unknown(code) => code,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, Command::Unknown(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ReadOne => write!(f, "READ_ONE"),
            Command::StartStream => write!(f, "START_STREAM"),
            Command::StopStream => write!(f, "STOP_STREAM"),
            Command::SetBias => write!(f, "SET_BIAS"),
            Command::Reset => write!(f, "RESET"),
            Command::Select => write!(f, "SELECT"),
            Command::Boot => write!(f, "BOOT"),
            Command::Status => write!(f, "STATUS"),
            Command::Version => write!(f, "VERSION"),
            Command::Restart => write!(f, "RESTART"),
            Command::Unknown(code) => write!(f, "UNKNOWN(0x{:02X})", code),
        }
    }
}

/// Decoded, checksum-verified frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    sequence: u16,
    payload: Vec<u8>,
    checksum: u16,
}

impl Frame {
    pub(crate) fn new(command: Command, sequence: u16, payload: Vec<u8>, checksum: u16) -> Self {
        Self {
            command,
            sequence,
            payload,
            checksum,
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// True when this frame answers the request `(command, sequence)`
    pub fn answers(&self, command: Command, sequence: u16) -> bool {
        self.command == command && self.sequence == sequence
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Encoded request ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub command: Command,
    pub sequence: u16,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_round_trip() {
        let known = [
            Command::ReadOne,
            Command::StartStream,
            Command::StopStream,
            Command::SetBias,
            Command::Reset,
            Command::Select,
            Command::Boot,
            Command::Status,
            Command::Version,
            Command::Restart,
        ];
        for command in known {
            assert_eq!(Command::from_code(command.code()), command);
            assert!(command.is_known());
        }
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let command = Command::from_code(0x42);
        assert_eq!(command, Command::Unknown(0x42));
        assert_eq!(command.code(), 0x42);
        assert!(!command.is_known());
        assert_eq!(command.to_string(), "UNKNOWN(0x42)");
    }
}
