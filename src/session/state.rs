//! Session bookkeeping: mode, per-request state and traffic counters

use crate::protocol::CodecError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Socket bound, nothing outstanding
    Idle,
    /// One polled request in flight
    AwaitingResponse,
    /// Board pushes measurement frames unsolicited
    Streaming,
    /// Terminal
    Closed,
}

/// State owned by one `SamplingSession`
#[derive(Debug, Clone)]
pub struct SessionState {
    pub destination: String,
    pub source_port: Option<u16>,
    pub mode: SessionMode,
    pub last_request: Option<Instant>,
    /// Resends of the current (or last) request
    pub retry_count: u8,
}

impl SessionState {
    pub fn new(destination: String, source_port: Option<u16>) -> Self {
        Self {
            destination,
            source_port,
            mode: SessionMode::Idle,
            last_request: None,
            retry_count: 0,
        }
    }
}

/// Counters shared between the session and its stream reader
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub frames_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub retries: AtomicU64,
    pub timeouts: AtomicU64,
    pub stale_discarded: AtomicU64,
    pub malformed_dropped: AtomicU64,
    pub checksum_dropped: AtomicU64,
    pub samples: AtomicU64,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self, error: &CodecError) {
        match error {
            CodecError::Checksum { .. } => Self::bump(&self.checksum_dropped),
            _ => Self::bump(&self.malformed_dropped),
        }
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            checksum_dropped: self.checksum_dropped.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the session counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub retries: u64,
    pub timeouts: u64,
    /// Valid frames that answered no outstanding request
    pub stale_discarded: u64,
    pub malformed_dropped: u64,
    pub checksum_dropped: u64,
    pub samples: u64,
}

impl SessionStats {
    pub fn dropped(&self) -> u64 {
        self.malformed_dropped + self.checksum_dropped
    }
}
