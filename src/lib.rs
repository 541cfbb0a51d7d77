//! MMS101 force/torque sensor acquisition
//!
//! Talks to the evaluation board over UDP, decodes its checksummed frames,
//! and converts raw six-axis counts into calibrated forces and torques,
//! either one polled sample at a time or as a continuous stream.

pub mod core;
pub mod protocol;
pub mod calibration;
pub mod hardware;
pub mod session;
pub mod output;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{Axis, RawSample, Sample, AXIS_COUNT};
pub use protocol::{CodecError, CodecResult, Command, DeviceState, DeviceVersion, Frame, FrameCodec, OutboundFrame};
pub use calibration::{AutoZero, AutoZeroConfig, CalibrationError, CalibrationMatrix, CalibrationTransform};
pub use hardware::{DatagramTransport, MockTransport, SimulatedBoard, TransportError, UdpTransport};
pub use session::{
    RecoveryStrategy, SampleStream, SamplingSession, SessionError, SessionMode, SessionResult, SessionStats,
    StreamStopHandle,
};
pub use output::{CsvSampleWriter, OutputFormat, SampleFormatter, SampleRecord};
pub use utils::{AppConfig, CalibrationConfig, ConfigError, SensitivityModel, SessionConfig};
