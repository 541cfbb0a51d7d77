//! Protocol constants and evaluation board defaults

/// Frame header magic
pub const FRAME_MAGIC: [u8; 2] = [0x4D, 0x4D];

/// magic(2) + command(1) + sequence(2) + length(1)
pub const FRAME_HEADER_LEN: usize = 6;

/// Trailing CRC-16 length
pub const FRAME_CHECKSUM_LEN: usize = 2;

/// Smallest valid frame (empty payload)
pub const MIN_FRAME_LEN: usize = FRAME_HEADER_LEN + FRAME_CHECKSUM_LEN;

/// Largest payload the board accepts in one frame
pub const MAX_PAYLOAD_LEN: usize = 96;

/// Largest frame on the wire
pub const MAX_FRAME_LEN: usize = MIN_FRAME_LEN + MAX_PAYLOAD_LEN;

/// Number of force/torque axes (Fx, Fy, Fz, Mx, My, Mz)
pub const AXIS_COUNT: usize = 6;

/// Axis counts are 24-bit two's complement on the wire
pub const COUNT_MIN: i32 = -(1 << 23);
pub const COUNT_MAX: i32 = (1 << 23) - 1;

/// Serial peripheral bus selector used by SELECT
pub const PROTOCOL_SPI: u8 = 0x01;

/// Highest sensor slot on the evaluation board
pub const MAX_SENSOR_SLOT: u8 = 5;

/// Factory scaling: counts per newton on force axes
pub const FORCE_COUNTS_PER_NEWTON: f64 = 1_000.0;

/// Factory scaling: counts per newton-metre on torque axes
pub const TORQUE_COUNTS_PER_NEWTON_METRE: f64 = 100_000.0;

pub const DEFAULT_DEST_IP: &str = "192.168.0.200";
pub const DEFAULT_DEST_PORT: u16 = 1366;
pub const DEFAULT_SRC_PORT: u16 = 2000;
