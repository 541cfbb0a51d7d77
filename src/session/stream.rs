//! Receive side of a streaming session

use crate::calibration::CalibrationTransform;
use crate::core::types::{RawSample, Sample};
use crate::hardware::{DatagramTransport, TransportError};
use crate::protocol::payload::{self, RESULT_OK};
use crate::protocol::{hex, Command, FrameCodec};
use crate::session::error::{SessionError, SessionResult};
use crate::session::sampling::RECV_BUFFER_LEN;
use crate::session::state::SessionCounters;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Continuous, non-restartable sequence of calibrated samples
///
/// Corrupt, malformed and non-measurement frames are dropped and counted.
/// The sequence ends when the owning session stops streaming or closes;
/// each receive is bounded by the poll interval, so that happens within
/// one interval. Other transport failures are yielded once, then the
/// sequence ends.
pub struct SampleStream {
    transport: Arc<dyn DatagramTransport>,
    calibration: Arc<CalibrationTransform>,
    counters: Arc<SessionCounters>,
    cancel: Arc<AtomicBool>,
    poll: Duration,
    debug: bool,
    buf: Vec<u8>,
    finished: bool,
}

/// Ends a `SampleStream` from another thread without touching the board
#[derive(Debug, Clone)]
pub struct StreamStopHandle {
    cancel: Arc<AtomicBool>,
}

impl StreamStopHandle {
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl SampleStream {
    pub(crate) fn new(
        transport: Arc<dyn DatagramTransport>,
        calibration: Arc<CalibrationTransform>,
        counters: Arc<SessionCounters>,
        cancel: Arc<AtomicBool>,
        poll: Duration,
        debug: bool,
    ) -> Self {
        Self {
            transport,
            calibration,
            counters,
            cancel,
            poll,
            debug,
            buf: vec![0u8; RECV_BUFFER_LEN],
            finished: false,
        }
    }

    pub fn stop_handle(&self) -> StreamStopHandle {
        StreamStopHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.finished && !self.cancel.load(Ordering::SeqCst)
    }

    /// Next sample together with the raw counts it was calibrated from
    pub fn next_reading(&mut self) -> Option<SessionResult<(RawSample, Sample)>> {
        while self.is_active() {
            let len = match self.transport.recv(&mut self.buf, self.poll) {
                Ok(Some(len)) => len,
                Ok(None) => continue,
                Err(TransportError::Closed) => {
                    debug!("transport closed, stream ends");
                    break;
                }
                Err(error) => {
                    self.finished = true;
                    return Some(Err(SessionError::from(error)));
                }
            };

            SessionCounters::bump(&self.counters.frames_received);
            if let Some(raw) = self.accept(len) {
                SessionCounters::bump(&self.counters.samples);
                let sample = self.calibration.apply(&raw);
                return Some(Ok((raw, sample)));
            }
        }

        self.finished = true;
        None
    }

    /// Decode one datagram, returning its counts if it is a measurement
    fn accept(&self, len: usize) -> Option<RawSample> {
        let bytes = &self.buf[..len];
        if self.debug {
            debug!(len, bytes = %hex(bytes), "rx");
        }

        let frame = match FrameCodec::decode(bytes) {
            Ok(frame) => frame,
            Err(error) => {
                self.counters.record_decode_error(&error);
                warn!(%error, "dropping streamed frame");
                return None;
            }
        };

        if frame.command() != Command::ReadOne {
            SessionCounters::bump(&self.counters.stale_discarded);
            trace!(command = %frame.command(), sequence = frame.sequence(), "ignoring non-measurement frame");
            return None;
        }

        match payload::result_word(frame.payload()) {
            Ok(RESULT_OK) => {}
            Ok(result) => {
                SessionCounters::bump(&self.counters.malformed_dropped);
                warn!(result, sequence = frame.sequence(), "dropping measurement with error result");
                return None;
            }
            Err(error) => {
                self.counters.record_decode_error(&error);
                warn!(%error, "dropping streamed frame");
                return None;
            }
        }

        match payload::parse_data(frame.payload()) {
            Ok(raw) => Some(raw),
            Err(error) => {
                self.counters.record_decode_error(&error);
                warn!(%error, sequence = frame.sequence(), "dropping streamed frame");
                None
            }
        }
    }
}

impl Iterator for SampleStream {
    type Item = SessionResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_reading().map(|reading| reading.map(|(_, sample)| sample))
    }
}
