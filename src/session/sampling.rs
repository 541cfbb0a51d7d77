//! UDP conversation with one evaluation board
//!
//! Polled requests are strictly one at a time: a request is sent, resent
//! with the same sequence on timeout, and answered only by a frame that
//! echoes both its command and sequence. Streaming hands the receive side
//! to a `SampleStream` that may live on another thread.

use crate::calibration::CalibrationTransform;
use crate::core::constants::AXIS_COUNT;
use crate::core::types::{RawSample, Sample};
use crate::hardware::{DatagramTransport, TransportStatus, UdpTransport};
use crate::protocol::payload::{self, DeviceState, DeviceVersion, RESULT_OK};
use crate::protocol::{hex, Command, Frame, FrameCodec, OutboundFrame};
use crate::session::error::{SessionError, SessionResult};
use crate::session::state::{SessionCounters, SessionMode, SessionState, SessionStats};
use crate::session::stream::SampleStream;
use crate::utils::SessionConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Receive buffer size; larger than any valid frame so oversized
/// datagrams are rejected by the codec instead of truncated
pub(crate) const RECV_BUFFER_LEN: usize = 1500;

pub struct SamplingSession {
    config: SessionConfig,
    transport: Arc<dyn DatagramTransport>,
    codec: FrameCodec,
    calibration: Arc<CalibrationTransform>,
    counters: Arc<SessionCounters>,
    state: SessionState,
    /// Cancellation flag of the active stream, if any
    stream_cancel: Option<Arc<AtomicBool>>,
}

impl SamplingSession {
    /// Bind the configured source port and open a session to the board
    pub fn open(config: SessionConfig, calibration: CalibrationTransform) -> SessionResult<Self> {
        config.validate()?;
        let transport = UdpTransport::bind(&config.dest_ip, config.dest_port, config.src_port)?;
        Self::open_with_transport(config, Arc::new(transport), calibration)
    }

    /// Open a session over an already constructed transport
    pub fn open_with_transport(
        config: SessionConfig,
        transport: Arc<dyn DatagramTransport>,
        calibration: CalibrationTransform,
    ) -> SessionResult<Self> {
        config.validate()?;
        if transport.is_closed() {
            return Err(SessionError::Closed { operation: "open" });
        }

        let state = SessionState::new(transport.peer(), transport.local_port());
        info!(
            peer = %state.destination,
            local_port = ?state.source_port,
            "session opened"
        );

        Ok(Self {
            config,
            transport,
            codec: FrameCodec::new(),
            calibration: Arc::new(calibration),
            counters: Arc::new(SessionCounters::default()),
            state,
            stream_cancel: None,
        })
    }

    pub fn mode(&self) -> SessionMode {
        self.state.mode
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    pub fn transport_status(&self) -> TransportStatus {
        self.transport.status()
    }

    /// Shared handle to the calibration, for taring from another thread
    pub fn calibration(&self) -> Arc<CalibrationTransform> {
        Arc::clone(&self.calibration)
    }

    /// Poll one calibrated sample
    pub fn read_one(&mut self) -> SessionResult<Sample> {
        self.read_one_with_raw().map(|(_, sample)| sample)
    }

    /// Poll one uncalibrated sample
    pub fn read_raw(&mut self) -> SessionResult<RawSample> {
        let frame = self.exchange(Command::ReadOne, &[], "read_one")?;
        let raw = payload::parse_data(frame.payload()).map_err(|error| SessionError::Frame {
            command: Command::ReadOne,
            sequence: frame.sequence(),
            error,
        })?;
        SessionCounters::bump(&self.counters.samples);
        Ok(raw)
    }

    pub fn read_one_with_raw(&mut self) -> SessionResult<(RawSample, Sample)> {
        let raw = self.read_raw()?;
        let sample = self.calibration.apply(&raw);
        Ok((raw, sample))
    }

    /// Read the current loading and make it the zero point
    pub fn tare(&mut self) -> SessionResult<RawSample> {
        let raw = self.read_raw()?;
        self.calibration.tare(&raw);
        info!(bias = ?raw.counts, "tared");
        Ok(raw)
    }

    /// Load an offset into the board itself (SET_BIAS)
    pub fn set_device_bias(&mut self, counts: [i32; AXIS_COUNT]) -> SessionResult<()> {
        let payload = payload::encode_counts(&counts).map_err(|error| SessionError::Encode {
            command: Command::SetBias,
            error,
        })?;
        self.exchange(Command::SetBias, &payload, "set_device_bias")?;
        Ok(())
    }

    pub fn status(&mut self) -> SessionResult<DeviceState> {
        let frame = self.exchange(Command::Status, &[], "status")?;
        payload::parse_status(frame.payload()).map_err(|error| SessionError::Frame {
            command: Command::Status,
            sequence: frame.sequence(),
            error,
        })
    }

    pub fn version(&mut self) -> SessionResult<DeviceVersion> {
        let frame = self.exchange(Command::Version, &[], "version")?;
        payload::parse_version(frame.payload()).map_err(|error| SessionError::Frame {
            command: Command::Version,
            sequence: frame.sequence(),
            error,
        })
    }

    pub fn restart(&mut self) -> SessionResult<()> {
        self.exchange(Command::Restart, &[], "restart")?;
        Ok(())
    }

    /// RESET, SELECT and BOOT the board, then wait for READY
    ///
    /// A fault state re-runs the bring-up commands. Fails with
    /// `DeviceNotReady` once `boot_timeout_ms` has passed.
    pub fn initialize_device(&mut self) -> SessionResult<()> {
        let started = Instant::now();
        let timeout = self.config.boot_timeout();

        self.bring_up()?;
        loop {
            let state = self.status()?;
            match state {
                DeviceState::Ready => {
                    info!(elapsed_ms = started.elapsed().as_millis() as u64, "board ready");
                    return Ok(());
                }
                DeviceState::Waiting => {}
                DeviceState::Fault(code) => {
                    warn!(state = code, "board fault during boot, restarting bring-up");
                    self.bring_up()?;
                }
            }

            if started.elapsed() >= timeout {
                return Err(SessionError::DeviceNotReady {
                    waited_ms: started.elapsed().as_millis() as u64,
                    last_state: Some(state),
                });
            }
            thread::sleep(self.config.boot_poll());
        }
    }

    /// Switch the board to streaming and hand back the sample sequence
    ///
    /// If the acknowledgement is lost or corrupt the board may be streaming
    /// anyway, so STOP_STREAM is sent and the line drained before the error
    /// is returned.
    pub fn start_stream(&mut self) -> SessionResult<SampleStream> {
        if let Err(error) = self.exchange(Command::StartStream, &[], "start_stream") {
            if matches!(error, SessionError::Frame { .. } | SessionError::Timeout { .. }) {
                self.abandon_stream_start();
            }
            return Err(error);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        self.stream_cancel = Some(Arc::clone(&cancel));
        self.state.mode = SessionMode::Streaming;
        info!("streaming started");

        Ok(SampleStream::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.calibration),
            Arc::clone(&self.counters),
            cancel,
            self.config.stream_poll(),
            self.config.debug,
        ))
    }

    /// Stop streaming and drain in-flight frames
    ///
    /// Returns the number of datagrams drained before the line went quiet
    /// for `stream_grace_ms`.
    pub fn stop_stream(&mut self) -> SessionResult<usize> {
        match self.state.mode {
            SessionMode::Closed => return Err(SessionError::Closed { operation: "stop_stream" }),
            SessionMode::Streaming => {}
            mode => {
                return Err(SessionError::InvalidState {
                    operation: "stop_stream",
                    mode,
                })
            }
        }

        self.cancel_stream();
        let outbound = self.encode(Command::StopStream, &[])?;
        self.send(&outbound)?;
        let drained = self.drain()?;

        self.state.mode = SessionMode::Idle;
        info!(drained, "streaming stopped");
        Ok(drained)
    }

    /// Release the socket; every later operation fails with `Closed`
    pub fn close(&mut self) {
        if self.state.mode == SessionMode::Closed {
            return;
        }

        if self.state.mode == SessionMode::Streaming {
            self.cancel_stream();
            match self.encode(Command::StopStream, &[]) {
                Ok(outbound) => {
                    if let Err(error) = self.send(&outbound) {
                        warn!(%error, "could not stop streaming before close");
                    }
                }
                Err(error) => warn!(%error, "could not stop streaming before close"),
            }
        }

        self.transport.close();
        self.state.mode = SessionMode::Closed;
        info!(stats = ?self.counters.snapshot(), "session closed");
    }

    fn abandon_stream_start(&mut self) {
        let stopped = self
            .encode(Command::StopStream, &[])
            .and_then(|outbound| self.send(&outbound))
            .and_then(|_| self.drain());
        match stopped {
            Ok(drained) => warn!(drained, "stream start failed, board told to stop"),
            Err(error) => warn!(%error, "stream start failed and STOP_STREAM could not be sent"),
        }
    }

    fn cancel_stream(&mut self) {
        if let Some(cancel) = self.stream_cancel.take() {
            cancel.store(true, Ordering::SeqCst);
        }
    }

    fn bring_up(&mut self) -> SessionResult<()> {
        let select = payload::select_payload(self.config.sensor).map_err(|error| SessionError::Encode {
            command: Command::Select,
            error,
        })?;

        self.exchange(Command::Reset, &[], "reset")?;
        self.exchange(Command::Select, &select, "select")?;
        self.exchange(Command::Boot, &[], "boot")?;
        Ok(())
    }

    fn ensure_idle(&self, operation: &'static str) -> SessionResult<()> {
        match self.state.mode {
            SessionMode::Idle => Ok(()),
            SessionMode::Closed => Err(SessionError::Closed { operation }),
            mode => Err(SessionError::InvalidState { operation, mode }),
        }
    }

    fn encode(&self, command: Command, payload: &[u8]) -> SessionResult<OutboundFrame> {
        self.codec
            .encode(command, payload)
            .map_err(|error| SessionError::Encode { command, error })
    }

    fn send(&mut self, outbound: &OutboundFrame) -> SessionResult<()> {
        if self.config.debug {
            debug!(
                command = %outbound.command,
                sequence = outbound.sequence,
                bytes = %hex(&outbound.bytes),
                "tx"
            );
        }
        self.transport.send(&outbound.bytes)?;
        self.state.last_request = Some(Instant::now());
        SessionCounters::bump(&self.counters.frames_sent);
        Ok(())
    }

    /// One polled request/response exchange with a checked result word
    fn exchange(&mut self, command: Command, payload: &[u8], operation: &'static str) -> SessionResult<Frame> {
        self.ensure_idle(operation)?;
        let outbound = self.encode(command, payload)?;

        self.state.mode = SessionMode::AwaitingResponse;
        self.state.retry_count = 0;
        let response = self.await_response(&outbound);
        self.state.mode = SessionMode::Idle;

        let frame = response?;
        let result = payload::result_word(frame.payload()).map_err(|error| SessionError::Frame {
            command,
            sequence: frame.sequence(),
            error,
        })?;
        if result != RESULT_OK {
            return Err(SessionError::Device {
                command,
                sequence: frame.sequence(),
                result,
            });
        }
        Ok(frame)
    }

    fn await_response(&mut self, outbound: &OutboundFrame) -> SessionResult<Frame> {
        let attempts = self.config.max_retries as u32 + 1;
        let timeout = self.config.response_timeout();
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        for attempt in 0..attempts {
            if attempt > 0 {
                self.state.retry_count = attempt as u8;
                SessionCounters::bump(&self.counters.retries);
                warn!(
                    command = %outbound.command,
                    sequence = outbound.sequence,
                    attempt,
                    "no response, resending"
                );
            }
            self.send(outbound)?;

            if let Some(frame) = self.receive_matching(outbound, &mut buf, timeout)? {
                return Ok(frame);
            }
        }

        SessionCounters::bump(&self.counters.timeouts);
        Err(SessionError::Timeout {
            command: outbound.command,
            sequence: outbound.sequence,
            attempts,
        })
    }

    /// Wait up to `timeout` for the frame answering `outbound`
    ///
    /// Stale frames are discarded and the wait continues; a corrupt or
    /// malformed frame fails the request.
    fn receive_matching(
        &self,
        outbound: &OutboundFrame,
        buf: &mut [u8],
        timeout: Duration,
    ) -> SessionResult<Option<Frame>> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let Some(len) = self.transport.recv(buf, remaining)? else {
                continue;
            };
            SessionCounters::bump(&self.counters.frames_received);
            let bytes = &buf[..len];
            if self.config.debug {
                debug!(len, bytes = %hex(bytes), "rx");
            }

            match FrameCodec::decode(bytes) {
                Ok(frame) if frame.answers(outbound.command, outbound.sequence) => return Ok(Some(frame)),
                Ok(frame) => {
                    SessionCounters::bump(&self.counters.stale_discarded);
                    debug!(
                        command = %frame.command(),
                        sequence = frame.sequence(),
                        expected = outbound.sequence,
                        "discarding stale frame"
                    );
                }
                Err(error) => {
                    self.counters.record_decode_error(&error);
                    return Err(SessionError::Frame {
                        command: outbound.command,
                        sequence: outbound.sequence,
                        error,
                    });
                }
            }
        }
    }

    /// Read until nothing arrives for one grace period
    fn drain(&self) -> SessionResult<usize> {
        let grace = self.config.stream_grace();
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        let mut drained = 0;

        while let Some(len) = self.transport.recv(&mut buf, grace)? {
            drained += 1;
            SessionCounters::bump(&self.counters.frames_received);
            if self.config.debug {
                debug!(len, bytes = %hex(&buf[..len]), "drained");
            }
        }
        Ok(drained)
    }
}

impl Drop for SamplingSession {
    fn drop(&mut self) {
        self.close();
    }
}
