//! Sampling session: polled and streamed acquisition over one socket

pub mod error;
pub mod state;
pub mod sampling;
pub mod stream;

pub use error::{RecoveryStrategy, SessionError, SessionResult};
pub use state::{SessionMode, SessionState, SessionStats};
pub use sampling::SamplingSession;
pub use stream::{SampleStream, StreamStopHandle};
