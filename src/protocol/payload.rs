//! Request and response payload layouts
//!
//! Every response payload starts with a big-endian result word; zero means
//! the board accepted the command.

use crate::core::constants::{AXIS_COUNT, COUNT_MAX, COUNT_MIN, MAX_SENSOR_SLOT, PROTOCOL_SPI};
use crate::core::types::RawSample;
use crate::protocol::codec::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};

/// Result word reported by the board for an accepted command
pub const RESULT_OK: u16 = 0x0000;

/// result(2) + status(2) + counter(2) + interval(4)
const DATA_HEADER_LEN: usize = 10;

/// Data payload length: header plus six 24-bit counts
pub const DATA_PAYLOAD_LEN: usize = DATA_HEADER_LEN + AXIS_COUNT * 3;

pub const STATUS_PAYLOAD_LEN: usize = 6;
pub const VERSION_PAYLOAD_LEN: usize = 8;

/// Board state reported by STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Boot in progress, poll again
    Waiting,
    Ready,
    Fault(u8),
}

impl DeviceState {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x02 => DeviceState::Waiting,
            0x03 => DeviceState::Ready,
            other => DeviceState::Fault(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            DeviceState::Waiting => 0x02,
            DeviceState::Ready => 0x03,
            DeviceState::Fault(code) => code,
        }
    }
}

/// Firmware identification returned by VERSION
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceVersion {
    pub hardware: [u8; 2],
    pub software: [u8; 4],
}

impl DeviceVersion {
    pub fn hardware_hex(&self) -> String {
        crate::protocol::codec::hex(&self.hardware)
    }

    pub fn software_hex(&self) -> String {
        crate::protocol::codec::hex(&self.software)
    }
}

/// Leading result word of a response payload
pub fn result_word(payload: &[u8]) -> CodecResult<u16> {
    require_len(payload, 2, "result word")?;
    Ok(u16::from_be_bytes([payload[0], payload[1]]))
}

/// Parse a measurement payload into raw counts
pub fn parse_data(payload: &[u8]) -> CodecResult<RawSample> {
    require_len(payload, DATA_PAYLOAD_LEN, "measurement payload")?;

    let measurement_status = u16::from_be_bytes([payload[2], payload[3]]);
    let device_counter = u16::from_be_bytes([payload[4], payload[5]]);
    let interval_us = u32::from_be_bytes([payload[6], payload[7], payload[8], payload[9]]);

    let mut counts = [0i32; AXIS_COUNT];
    for (axis, count) in counts.iter_mut().enumerate() {
        let offset = DATA_HEADER_LEN + axis * 3;
        *count = read_i24(&payload[offset..offset + 3]);
    }

    Ok(RawSample {
        counts,
        device_counter,
        measurement_status,
        interval_us,
    })
}

/// Build a measurement payload (used by simulated boards)
pub fn build_data(raw: &RawSample) -> CodecResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(DATA_PAYLOAD_LEN);
    payload.extend_from_slice(&RESULT_OK.to_be_bytes());
    payload.extend_from_slice(&raw.measurement_status.to_be_bytes());
    payload.extend_from_slice(&raw.device_counter.to_be_bytes());
    payload.extend_from_slice(&raw.interval_us.to_be_bytes());
    payload.extend_from_slice(&encode_counts(&raw.counts)?);
    Ok(payload)
}

pub fn parse_status(payload: &[u8]) -> CodecResult<DeviceState> {
    require_len(payload, STATUS_PAYLOAD_LEN, "status payload")?;
    Ok(DeviceState::from_code(payload[4]))
}

pub fn build_status(state: DeviceState) -> Vec<u8> {
    let mut payload = RESULT_OK.to_be_bytes().to_vec();
    payload.extend_from_slice(&[0x00, 0x00, state.code(), 0x00]);
    payload
}

pub fn parse_version(payload: &[u8]) -> CodecResult<DeviceVersion> {
    require_len(payload, VERSION_PAYLOAD_LEN, "version payload")?;
    Ok(DeviceVersion {
        hardware: [payload[2], payload[3]],
        software: [payload[4], payload[5], payload[6], payload[7]],
    })
}

pub fn build_version(version: &DeviceVersion) -> Vec<u8> {
    let mut payload = RESULT_OK.to_be_bytes().to_vec();
    payload.extend_from_slice(&version.hardware);
    payload.extend_from_slice(&version.software);
    payload
}

/// Bare acknowledgement payload
pub fn build_ack(result: u16) -> Vec<u8> {
    result.to_be_bytes().to_vec()
}

/// SELECT payload for one sensor slot (1-based)
pub fn select_payload(sensor: u8) -> CodecResult<Vec<u8>> {
    if sensor == 0 || sensor > MAX_SENSOR_SLOT {
        return Err(CodecError::Format {
            details: format!("sensor slot {} outside 1..={}", sensor, MAX_SENSOR_SLOT),
            length: 0,
        });
    }
    Ok(vec![PROTOCOL_SPI, 1 << (sensor - 1)])
}

/// Six 24-bit big-endian counts, as carried by SET_BIAS and data frames
pub fn encode_counts(counts: &[i32; AXIS_COUNT]) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(AXIS_COUNT * 3);
    for (axis, &value) in counts.iter().enumerate() {
        if !(COUNT_MIN..=COUNT_MAX).contains(&value) {
            return Err(CodecError::CountOutOfRange { axis, value });
        }
        let be = value.to_be_bytes();
        bytes.extend_from_slice(&be[1..4]);
    }
    Ok(bytes)
}

pub fn decode_counts(bytes: &[u8]) -> CodecResult<[i32; AXIS_COUNT]> {
    require_len(bytes, AXIS_COUNT * 3, "axis counts")?;
    let mut counts = [0i32; AXIS_COUNT];
    for (axis, count) in counts.iter_mut().enumerate() {
        *count = read_i24(&bytes[axis * 3..axis * 3 + 3]);
    }
    Ok(counts)
}

fn read_i24(bytes: &[u8]) -> i32 {
    let value = ((bytes[0] as i32) << 16) | ((bytes[1] as i32) << 8) | bytes[2] as i32;
    // sign-extend from bit 23
    (value << 8) >> 8
}

fn require_len(payload: &[u8], required: usize, what: &str) -> CodecResult<()> {
    if payload.len() < required {
        return Err(CodecError::Format {
            details: format!("{} needs {} bytes, got {}", what, required, payload.len()),
            length: payload.len(),
        });
    }
    Ok(())
}
