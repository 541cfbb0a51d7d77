//! Wire protocol for the force/torque evaluation board
//!
//! Frame value types, the checksummed codec, and payload layouts for each
//! command.

pub mod frame;
pub mod codec;
pub mod payload;

pub use frame::{Command, Frame, OutboundFrame};
pub use codec::{crc16, hex, CodecError, CodecResult, FrameCodec};
pub use payload::{DeviceState, DeviceVersion};
