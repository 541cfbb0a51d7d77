//! Datagram transport trait and status

use crate::hardware::TransportResult;
use std::time::Duration;

/// Connectionless transport to one evaluation board
///
/// Implementations are shared between the session and a stream reader
/// thread, so every method takes `&self`.
pub trait DatagramTransport: Send + Sync {
    /// Send one datagram to the board
    fn send(&self, data: &[u8]) -> TransportResult<()>;

    /// Wait up to `timeout` for one datagram
    /// Returns Ok(Some(len)) when a datagram was copied into `buf`
    /// Returns Ok(None) when the timeout elapsed
    fn recv(&self, buf: &mut [u8], timeout: Duration) -> TransportResult<Option<usize>>;

    /// Release the socket; later calls fail with `TransportError::Closed`
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Human-readable peer description for logs
    fn peer(&self) -> String;

    /// Locally bound port, if any
    fn local_port(&self) -> Option<u16>;

    fn status(&self) -> TransportStatus;
}

/// Traffic counters for a transport
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStatus {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    /// Datagrams from a peer other than the board, dropped unread
    pub datagrams_rejected: u64,
    pub error_count: u32,
    /// Host time of the last received datagram (microseconds since epoch)
    pub last_receive_us: Option<u64>,
}

impl TransportStatus {
    pub fn is_healthy(&self) -> bool {
        self.error_count < 10
    }
}
