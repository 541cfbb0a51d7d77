//! Mock transport and simulated evaluation board for testing and development

use crate::core::types::{now_micros, RawSample};
use crate::hardware::{DatagramTransport, TransportError, TransportResult, TransportStatus};
use crate::protocol::payload::{self, DeviceState, DeviceVersion, RESULT_OK};
use crate::protocol::{Command, FrameCodec};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Longest a mock receive blocks when its queue is empty
const EMPTY_QUEUE_WAIT: Duration = Duration::from_millis(2);

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

struct MockState {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    responder: Option<Responder>,
    status: TransportStatus,
    corrupt_probability: f32,
    fail_sends: bool,
    closed: bool,
}

/// In-memory transport
///
/// Inbound datagrams come from an explicit queue and from an optional
/// responder that is called with every sent datagram.
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                inbound: VecDeque::new(),
                sent: Vec::new(),
                responder: None,
                status: TransportStatus::default(),
                corrupt_probability: 0.0,
                fail_sends: false,
                closed: false,
            }),
        }
    }

    /// Transport whose peer is a simulated board
    pub fn with_board(mut board: SimulatedBoard) -> Self {
        let transport = Self::new();
        transport.set_responder(move |request| board.respond(request));
        transport
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        self.lock().responder = Some(Box::new(responder));
    }

    /// Queue a datagram for the next receive
    pub fn push_inbound(&self, data: Vec<u8>) {
        self.lock().inbound.push_back(data);
    }

    pub fn queued_inbound(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Every datagram sent so far
    pub fn sent_datagrams(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Commands of every sent datagram that decodes
    pub fn sent_commands(&self) -> Vec<Command> {
        self.lock()
            .sent
            .iter()
            .filter_map(|bytes| FrameCodec::decode(bytes).ok())
            .map(|frame| frame.command())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    /// Flip a byte of each received datagram with the given probability
    pub fn simulate_errors(&self, enable: bool, probability: f32) {
        self.lock().corrupt_probability = if enable { probability.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn should_corrupt(probability: f32) -> bool {
        if probability <= 0.0 {
            return false;
        }

        use rand::Rng;
        rand::rng().random::<f32>() < probability
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DatagramTransport for MockTransport {
    fn send(&self, data: &[u8]) -> TransportResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.fail_sends {
            state.status.error_count += 1;
            return Err(TransportError::HardwareError {
                code: 1001,
                description: "Simulated send failure".to_string(),
            });
        }

        state.sent.push(data.to_vec());
        state.status.datagrams_sent += 1;

        if let Some(responder) = state.responder.as_mut() {
            let replies = responder(data);
            state.inbound.extend(replies);
        }
        Ok(())
    }

    fn recv(&self, buf: &mut [u8], timeout: Duration) -> TransportResult<Option<usize>> {
        let next = {
            let mut state = self.lock();
            if state.closed {
                return Err(TransportError::Closed);
            }
            state.inbound.pop_front().map(|data| (data, state.corrupt_probability))
        };

        let Some((mut data, corrupt_probability)) = next else {
            std::thread::sleep(timeout.min(EMPTY_QUEUE_WAIT));
            return Ok(None);
        };

        if !data.is_empty() && Self::should_corrupt(corrupt_probability) {
            let last = data.len() - 1;
            data[last] ^= 0xFF;
        }

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);

        let mut state = self.lock();
        state.status.datagrams_received += 1;
        state.status.last_receive_us = Some(now_micros());
        Ok(Some(len))
    }

    fn close(&self) {
        self.lock().closed = true;
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }

    fn local_port(&self) -> Option<u16> {
        None
    }

    fn status(&self) -> TransportStatus {
        self.lock().status.clone()
    }
}

/// Scripted evaluation board
///
/// Answers each request with a frame echoing its command and sequence.
pub struct SimulatedBoard {
    /// Counts returned for READ_ONE (the measurement counter advances per read)
    pub raw: RawSample,
    /// States returned by successive STATUS requests; READY once exhausted
    pub status_script: VecDeque<DeviceState>,
    pub version: DeviceVersion,
    /// Datagrams emitted right after the START_STREAM acknowledgement
    pub stream_script: Vec<Vec<u8>>,
    /// Result word placed in every response
    pub result: u16,
    /// Drop the first N requests without answering
    pub ignore_first: usize,
    /// Never answer
    pub silent: bool,
    /// Bias loaded with SET_BIAS
    pub loaded_bias: Option<[i32; 6]>,
    /// Sensor mask from the last SELECT
    pub selected_mask: Option<u8>,
    requests_seen: usize,
}

impl SimulatedBoard {
    pub fn new(raw: RawSample) -> Self {
        Self {
            raw,
            status_script: VecDeque::new(),
            version: DeviceVersion {
                hardware: [0x01, 0x00],
                software: [0x01, 0x00, 0x00, 0x00],
            },
            stream_script: Vec::new(),
            result: RESULT_OK,
            ignore_first: 0,
            silent: false,
            loaded_bias: None,
            selected_mask: None,
            requests_seen: 0,
        }
    }

    pub fn with_status_script(mut self, states: Vec<DeviceState>) -> Self {
        self.status_script = states.into();
        self
    }

    pub fn with_stream(mut self, datagrams: Vec<Vec<u8>>) -> Self {
        self.stream_script = datagrams;
        self
    }

    pub fn silent() -> Self {
        let mut board = Self::new(RawSample::default());
        board.silent = true;
        board
    }

    /// Replies to one request datagram
    pub fn respond(&mut self, request: &[u8]) -> Vec<Vec<u8>> {
        self.requests_seen += 1;
        if self.silent || self.requests_seen <= self.ignore_first {
            return Vec::new();
        }

        let Ok(frame) = FrameCodec::decode(request) else {
            return Vec::new();
        };
        let command = frame.command();
        let sequence = frame.sequence();

        let payload = match command {
            Command::ReadOne => {
                let raw = self.raw;
                self.raw.device_counter = self.raw.device_counter.wrapping_add(1);
                match payload::build_data(&raw) {
                    Ok(mut data) => {
                        data[0..2].copy_from_slice(&self.result.to_be_bytes());
                        data
                    }
                    Err(_) => return Vec::new(),
                }
            }
            Command::Status => {
                let state = self.status_script.pop_front().unwrap_or(DeviceState::Ready);
                let mut data = payload::build_status(state);
                data[0..2].copy_from_slice(&self.result.to_be_bytes());
                data
            }
            Command::Version => payload::build_version(&self.version),
            Command::SetBias => {
                self.loaded_bias = payload::decode_counts(frame.payload()).ok();
                payload::build_ack(self.result)
            }
            Command::Select => {
                self.selected_mask = frame.payload().get(1).copied();
                payload::build_ack(self.result)
            }
            Command::StartStream
            | Command::StopStream
            | Command::Reset
            | Command::Boot
            | Command::Restart => payload::build_ack(self.result),
            Command::Unknown(_) => return Vec::new(),
        };

        let mut replies = Vec::new();
        if let Ok(bytes) = FrameCodec::encode_with_sequence(command, sequence, &payload) {
            replies.push(bytes);
        }
        if command == Command::StartStream {
            replies.extend(self.stream_script.iter().cloned());
        }
        replies
    }

    /// Unsolicited measurement frame as emitted while streaming
    pub fn data_frame(sequence: u16, raw: &RawSample) -> Vec<u8> {
        let payload = payload::build_data(raw).unwrap_or_default();
        FrameCodec::encode_with_sequence(Command::ReadOne, sequence, &payload).unwrap_or_default()
    }
}
