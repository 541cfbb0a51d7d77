//! UDP transport for the evaluation board
//!
//! The board answers only to the port a request came from, so the source
//! port is bound explicitly.

use crate::core::constants::DEFAULT_DEST_PORT;
use crate::core::types::now_micros;
use crate::hardware::{DatagramTransport, TransportError, TransportResult, TransportStatus};
use crate::protocol::{Command, FrameCodec};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// set_read_timeout rejects a zero duration
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Interval between discovery broadcasts
const DISCOVERY_INTERVAL: Duration = Duration::from_millis(500);

/// Broadcast addresses targeted by `discover`
const DISCOVERY_BROADCASTS: [Ipv4Addr; 3] = [
    Ipv4Addr::BROADCAST,
    Ipv4Addr::new(192, 168, 1, 255),
    Ipv4Addr::new(192, 168, 0, 255),
];

pub struct UdpTransport {
    /// `None` once closed; dropping the socket releases the source port
    socket: RwLock<Option<UdpSocket>>,
    destination: SocketAddr,
    local_port: u16,
    closed: AtomicBool,
    /// Serializes receivers so read timeouts are not clobbered mid-call
    recv_lock: Mutex<()>,
    sent: AtomicU64,
    received: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU32,
    last_receive_us: AtomicU64,
}

impl UdpTransport {
    /// Bind `0.0.0.0:src_port` and target `dest_ip:dest_port`
    pub fn bind(dest_ip: &str, dest_port: u16, src_port: u16) -> TransportResult<Self> {
        let target = format!("{}:{}", dest_ip, dest_port);
        let destination = target
            .to_socket_addrs()
            .map_err(|_| TransportError::InvalidAddress { address: target.clone() })?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress { address: target.clone() })?;

        let socket = bind_source(src_port)?;
        let local_port = socket
            .local_addr()
            .map_err(|e| TransportError::io("local_addr", e))?
            .port();

        debug!(%destination, local_port, "UDP transport bound");

        Ok(Self {
            socket: RwLock::new(Some(socket)),
            destination,
            local_port,
            closed: AtomicBool::new(false),
            recv_lock: Mutex::new(()),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            errors: AtomicU32::new(0),
            last_receive_us: AtomicU64::new(0),
        })
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Broadcast STATUS on the usual board subnets and collect the boards that answer
    pub fn discover(src_port: u16, timeout: Duration) -> TransportResult<Vec<SocketAddr>> {
        let targets: Vec<SocketAddr> = DISCOVERY_BROADCASTS
            .iter()
            .map(|ip| SocketAddr::V4(SocketAddrV4::new(*ip, DEFAULT_DEST_PORT)))
            .collect();
        Self::discover_on(&targets, src_port, timeout)
    }

    /// Send STATUS to each target every `DISCOVERY_INTERVAL` until `timeout`
    ///
    /// Returns each peer that replied with a valid STATUS frame, once, in
    /// order of first reply. Sends that the routing table refuses are skipped.
    pub fn discover_on(targets: &[SocketAddr], src_port: u16, timeout: Duration) -> TransportResult<Vec<SocketAddr>> {
        let socket = bind_source(src_port)?;
        socket
            .set_broadcast(true)
            .map_err(|e| TransportError::io("set_broadcast", e))?;

        let request = FrameCodec::encode_with_sequence(Command::Status, 0, &[]).map_err(|e| TransportError::Io {
            operation: "encode".to_string(),
            message: e.to_string(),
        })?;

        let started = Instant::now();
        let deadline = started + timeout;
        let mut next_broadcast = started;
        let mut found: Vec<SocketAddr> = Vec::new();
        let mut buf = [0u8; 2048];

        info!(targets = targets.len(), timeout_ms = timeout.as_millis() as u64, "broadcasting STATUS");
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if now >= next_broadcast {
                for target in targets {
                    if let Err(e) = socket.send_to(&request, target) {
                        trace!(%target, error = %e, "discovery send refused");
                    }
                }
                next_broadcast = now + DISCOVERY_INTERVAL;
            }

            let wait = deadline.min(next_broadcast).saturating_duration_since(Instant::now());
            socket
                .set_read_timeout(Some(wait.max(MIN_READ_TIMEOUT)))
                .map_err(|e| TransportError::io("set_read_timeout", e))?;

            match socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    let answers = FrameCodec::decode(&buf[..len])
                        .map(|frame| frame.command() == Command::Status)
                        .unwrap_or(false);
                    if answers && !found.contains(&from) {
                        info!(board = %from, "board answered");
                        found.push(from);
                    } else if !answers {
                        trace!(%from, len, "ignoring non-STATUS reply");
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => return Err(TransportError::io("recv", e)),
            }
        }

        debug!(boards = found.len(), "discovery finished");
        Ok(found)
    }

    fn socket(&self) -> TransportResult<RwLockReadGuard<'_, Option<UdpSocket>>> {
        let guard = self.socket.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.is_none() || self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(guard)
    }

    fn ensure_open(&self) -> TransportResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn record_error(&self, error: TransportError) -> TransportError {
        self.errors.fetch_add(1, Ordering::Relaxed);
        error
    }
}

fn bind_source(src_port: u16) -> TransportResult<UdpSocket> {
    let bind_address = format!("0.0.0.0:{}", src_port);
    UdpSocket::bind(&bind_address).map_err(|e| TransportError::BindFailed {
        address: bind_address.clone(),
        message: e.to_string(),
    })
}

impl DatagramTransport for UdpTransport {
    fn send(&self, data: &[u8]) -> TransportResult<()> {
        let guard = self.socket()?;
        let socket = guard.as_ref().ok_or(TransportError::Closed)?;

        let sent = socket
            .send_to(data, self.destination)
            .map_err(|e| self.record_error(TransportError::io("send", e)))?;
        if sent != data.len() {
            return Err(self.record_error(TransportError::Incomplete {
                sent,
                expected: data.len(),
            }));
        }

        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn recv(&self, buf: &mut [u8], timeout: Duration) -> TransportResult<Option<usize>> {
        let _recv_guard = self.recv_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let guard = self.socket()?;
        let socket = guard.as_ref().ok_or(TransportError::Closed)?;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            socket
                .set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))
                .map_err(|e| self.record_error(TransportError::io("set_read_timeout", e)))?;

            match socket.recv_from(buf) {
                Ok((len, from)) => {
                    // A close issued while we were blocked wins over late data
                    self.ensure_open()?;
                    if from != self.destination {
                        self.rejected.fetch_add(1, Ordering::Relaxed);
                        trace!(%from, len, "dropping datagram from unexpected peer");
                        if remaining.is_zero() {
                            return Ok(None);
                        }
                        continue;
                    }
                    self.received.fetch_add(1, Ordering::Relaxed);
                    self.last_receive_us.store(now_micros(), Ordering::Relaxed);
                    return Ok(Some(len));
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    self.ensure_open()?;
                    return Ok(None);
                }
                Err(e) => return Err(self.record_error(TransportError::io("recv", e))),
            }
        }
    }

    /// Marks the transport closed and drops the socket
    ///
    /// Waits for an in-flight receive to reach its timeout, so the port is
    /// free again when this returns.
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let socket = self
            .socket
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(socket);
        debug!(destination = %self.destination, local_port = self.local_port, "UDP transport closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn peer(&self) -> String {
        self.destination.to_string()
    }

    fn local_port(&self) -> Option<u16> {
        Some(self.local_port)
    }

    fn status(&self) -> TransportStatus {
        let last = self.last_receive_us.load(Ordering::Relaxed);
        TransportStatus {
            datagrams_sent: self.sent.load(Ordering::Relaxed),
            datagrams_received: self.received.load(Ordering::Relaxed),
            datagrams_rejected: self.rejected.load(Ordering::Relaxed),
            error_count: self.errors.load(Ordering::Relaxed),
            last_receive_us: if last == 0 { None } else { Some(last) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::payload::{build_status, DeviceState};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_loopback_send_and_receive() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_port = peer.local_addr().unwrap().port();

        let transport = UdpTransport::bind("127.0.0.1", peer_port, 0).unwrap();
        let local_port = transport.local_port().unwrap();
        assert_ne!(local_port, 0);

        transport.send(&[1, 2, 3]).unwrap();
        let mut buf = [0u8; 16];
        let (len, from) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
        assert_eq!(from.port(), local_port);

        peer.send_to(&[9, 8], ("127.0.0.1", local_port)).unwrap();
        let received = transport.recv(&mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(received, Some(2));
        assert_eq!(&buf[..2], &[9, 8]);

        let status = transport.status();
        assert_eq!(status.datagrams_sent, 1);
        assert_eq!(status.datagrams_received, 1);
        assert!(status.last_receive_us.is_some());
    }

    #[test]
    fn test_datagrams_from_other_peers_are_dropped() {
        let board = UdpSocket::bind("127.0.0.1:0").unwrap();
        let board_port = board.local_addr().unwrap().port();
        let stranger = UdpSocket::bind("127.0.0.1:0").unwrap();

        let transport = UdpTransport::bind("127.0.0.1", board_port, 0).unwrap();
        let local = ("127.0.0.1", transport.local_port().unwrap());

        stranger.send_to(&[0xEE; 4], local).unwrap();
        board.send_to(&[0x11, 0x22], local).unwrap();

        let mut buf = [0u8; 16];
        let received = transport.recv(&mut buf, Duration::from_secs(2)).unwrap();
        assert_eq!(received, Some(2));
        assert_eq!(&buf[..2], &[0x11, 0x22]);

        let status = transport.status();
        assert_eq!(status.datagrams_rejected, 1);
        assert_eq!(status.datagrams_received, 1);
    }

    #[test]
    fn test_recv_times_out() {
        let transport = UdpTransport::bind("127.0.0.1", 9, 0).unwrap();
        let mut buf = [0u8; 16];
        let result = transport.recv(&mut buf, Duration::from_millis(20)).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_closed_transport_rejects_io() {
        let transport = UdpTransport::bind("127.0.0.1", 9, 0).unwrap();
        transport.close();
        assert!(transport.is_closed());
        assert_eq!(transport.send(&[0]), Err(TransportError::Closed));
        let mut buf = [0u8; 4];
        assert_eq!(transport.recv(&mut buf, Duration::from_millis(1)), Err(TransportError::Closed));
    }

    #[test]
    fn test_close_releases_source_port() {
        let transport = UdpTransport::bind("127.0.0.1", 9, 0).unwrap();
        let port = transport.local_port().unwrap();
        transport.close();

        let rebound = UdpSocket::bind(("0.0.0.0", port));
        assert!(rebound.is_ok(), "port {} still bound: {:?}", port, rebound.err());
    }

    #[test]
    fn test_close_interrupts_blocked_receiver() {
        let transport = Arc::new(UdpTransport::bind("127.0.0.1", 9, 0).unwrap());
        let port = transport.local_port().unwrap();

        let reader = {
            let transport = Arc::clone(&transport);
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                transport.recv(&mut buf, Duration::from_millis(200))
            })
        };
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        transport.close();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(reader.join().unwrap(), Err(TransportError::Closed));

        // the reader still holds an Arc, the port is free regardless
        assert!(UdpSocket::bind(("0.0.0.0", port)).is_ok());
    }

    #[test]
    fn test_invalid_destination() {
        let result = UdpTransport::bind("not an address", 1366, 0);
        assert!(matches!(result, Err(TransportError::InvalidAddress { .. })));
    }

    #[test]
    fn test_discover_collects_unique_boards() {
        let board = UdpSocket::bind("127.0.0.1:0").unwrap();
        board.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let board_addr = board.local_addr().unwrap();
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let silent_addr = silent.local_addr().unwrap();

        let responder = thread::spawn(move || {
            let mut buf = [0u8; 256];
            let mut answered = 0;
            let until = Instant::now() + Duration::from_millis(400);
            while Instant::now() < until {
                let Ok((len, from)) = board.recv_from(&mut buf) else {
                    continue;
                };
                let request = FrameCodec::decode(&buf[..len]).unwrap();
                assert_eq!(request.command(), Command::Status);
                let reply = FrameCodec::encode_with_sequence(
                    Command::Status,
                    request.sequence(),
                    &build_status(DeviceState::Ready),
                )
                .unwrap();
                board.send_to(&reply, from).unwrap();
                answered += 1;
            }
            answered
        });

        // the board is queried twice per round, so it answers more than once
        let targets = [board_addr, board_addr, silent_addr];
        let found = UdpTransport::discover_on(&targets, 0, Duration::from_millis(300)).unwrap();

        assert!(responder.join().unwrap() >= 2);
        assert_eq!(found, vec![board_addr]);
    }
}
