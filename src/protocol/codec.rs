//! Frame encoder/decoder for the evaluation board datagram protocol
//!
//! Layout: `[magic(2)][command(1)][sequence(2, BE)][length(1)][payload(N)][crc16(2, LE)]`.
//! The CRC covers every byte before it.

use crate::core::constants::{
    FRAME_CHECKSUM_LEN, FRAME_HEADER_LEN, FRAME_MAGIC, MAX_PAYLOAD_LEN, MIN_FRAME_LEN,
};
use crate::protocol::frame::{Command, Frame, OutboundFrame};
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};

/// Errors raised while encoding or decoding frames
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Payload longer than the protocol maximum
    PayloadTooLarge { length: usize, max: usize },
    /// `Command::Unknown` cannot be sent
    UnsupportedCommand { code: u8 },
    /// Axis count does not fit the 24-bit wire field
    CountOutOfRange { axis: usize, value: i32 },
    /// Malformed frame (short, bad magic, inconsistent length)
    Format { details: String, length: usize },
    /// CRC mismatch
    Checksum { expected: u16, received: u16, length: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::PayloadTooLarge { length, max } => {
                write!(f, "Payload of {} bytes exceeds the {} byte maximum", length, max)
            }
            CodecError::UnsupportedCommand { code } => {
                write!(f, "Command code 0x{:02X} cannot be encoded", code)
            }
            CodecError::CountOutOfRange { axis, value } => {
                write!(f, "Axis {} count {} does not fit in 24 bits", axis, value)
            }
            CodecError::Format { details, length } => {
                write!(f, "Malformed frame ({} bytes): {}", length, details)
            }
            CodecError::Checksum { expected, received, length } => {
                write!(
                    f,
                    "Checksum error on {} byte frame: expected 0x{:04X}, received 0x{:04X}",
                    length, expected, received
                )
            }
        }
    }
}

impl std::error::Error for CodecError {}

pub type CodecResult<T> = Result<T, CodecError>;

impl CodecError {
    /// Encoding-side failure (caller bug, never caused by the wire)
    pub fn is_encode_error(&self) -> bool {
        matches!(
            self,
            CodecError::PayloadTooLarge { .. }
                | CodecError::UnsupportedCommand { .. }
                | CodecError::CountOutOfRange { .. }
        )
    }
}

/// CRC-16/MODBUS (reflected poly 0xA001, init 0xFFFF)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Frame codec
///
/// Shared by reference between the session and its stream reader; the only
/// state is the next request sequence number.
#[derive(Debug, Default)]
pub struct FrameCodec {
    next_sequence: AtomicU16,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering requests at `sequence`
    pub fn starting_at(sequence: u16) -> Self {
        Self {
            next_sequence: AtomicU16::new(sequence),
        }
    }

    /// Sequence number the next `encode` call will use
    pub fn peek_sequence(&self) -> u16 {
        self.next_sequence.load(Ordering::Relaxed)
    }

    /// Encode a request with the next sequence number
    pub fn encode(&self, command: Command, payload: &[u8]) -> CodecResult<OutboundFrame> {
        Self::check_encodable(command, payload)?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let bytes = Self::encode_with_sequence(command, sequence, payload)?;
        Ok(OutboundFrame {
            command,
            sequence,
            bytes,
        })
    }

    /// Encode a frame with an explicit sequence number
    pub fn encode_with_sequence(command: Command, sequence: u16, payload: &[u8]) -> CodecResult<Vec<u8>> {
        Self::check_encodable(command, payload)?;

        let mut bytes = Vec::with_capacity(MIN_FRAME_LEN + payload.len());
        bytes.extend_from_slice(&FRAME_MAGIC);
        bytes.push(command.code());
        bytes.extend_from_slice(&sequence.to_be_bytes());
        bytes.push(payload.len() as u8);
        bytes.extend_from_slice(payload);

        let checksum = crc16(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());

        Ok(bytes)
    }

    /// Decode and validate one datagram
    pub fn decode(bytes: &[u8]) -> CodecResult<Frame> {
        let length = bytes.len();
        if length < MIN_FRAME_LEN {
            return Err(CodecError::Format {
                details: format!("need at least {} bytes", MIN_FRAME_LEN),
                length,
            });
        }

        // CRC first: a single corrupted byte anywhere reports as a checksum error
        let body_end = length - FRAME_CHECKSUM_LEN;
        let received = u16::from_le_bytes([bytes[body_end], bytes[body_end + 1]]);
        let expected = crc16(&bytes[..body_end]);
        if expected != received {
            return Err(CodecError::Checksum {
                expected,
                received,
                length,
            });
        }

        if bytes[0..2] != FRAME_MAGIC {
            return Err(CodecError::Format {
                details: format!("bad magic {:02X}{:02X}", bytes[0], bytes[1]),
                length,
            });
        }

        let declared = bytes[5] as usize;
        if declared != body_end - FRAME_HEADER_LEN {
            return Err(CodecError::Format {
                details: format!(
                    "declared payload {} bytes, datagram carries {}",
                    declared,
                    body_end - FRAME_HEADER_LEN
                ),
                length,
            });
        }

        let command = Command::from_code(bytes[2]);
        let sequence = u16::from_be_bytes([bytes[3], bytes[4]]);
        let payload = bytes[FRAME_HEADER_LEN..body_end].to_vec();

        Ok(Frame::new(command, sequence, payload, received))
    }

    fn check_encodable(command: Command, payload: &[u8]) -> CodecResult<()> {
        if let Command::Unknown(code) = command {
            return Err(CodecError::UnsupportedCommand { code });
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(CodecError::PayloadTooLarge {
                length: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(())
    }
}

/// Lowercase hex dump used by frame tracing
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
