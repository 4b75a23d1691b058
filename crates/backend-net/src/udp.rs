//! crates/backend-net/src/udp.rs
//!
//! The UDP network buffer (spec §4.G), grounded on `AsioUdpBuffer` in
//! `original_source/include/alligator/buffer/asio_udp_buffer.hpp`.
//!
//! Unlike TCP, a UDP socket has no inherent "the" peer once it is
//! bound for listening, so this backend remembers the most recent
//! sender in `last_sender` and targets `send`/`send_from` at it when no
//! `connect`-established peer exists — the same "reply to whoever just
//! wrote to me" pattern `AsioUdpBuffer::send` uses server-side.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use buffer::contract::Buffer;
use buffer::endpoint::Endpoint;
use buffer::error::BufferError;
use buffer::flags::{BackendKind, BufferFlags};
use buffer::id::BufferId;
use buffer::receive::ReceiveDescriptor;
use buffer::span::ByteSpan;
use chain::Chainable;

use crate::contract::{NetworkBuffer, NetworkState};
use crate::core::NetCore;
use crate::stats::NetworkStatsSnapshot;
use crate::xfer::write_bytes_at;

const POLL_READ_BUF: usize = 64 * 1024;

/// A datagram network buffer (spec §4.G).
pub struct UdpBuffer {
    core: NetCore,
    socket: Mutex<Option<UdpSocket>>,
    peer: Mutex<Option<SocketAddr>>,
    last_sender: Mutex<Option<SocketAddr>>,
    next: OnceLock<Arc<UdpBuffer>>,
}

impl UdpBuffer {
    /// Allocates `capacity` bytes of staging storage for a not-yet-bound
    /// or not-yet-connected UDP buffer.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidArgument`] for `capacity == 0`.
    pub fn new(id: BufferId, capacity: usize) -> Result<Arc<Self>, BufferError> {
        Ok(Arc::new(Self {
            core: NetCore::new(id, capacity)?,
            socket: Mutex::new(None),
            peer: Mutex::new(None),
            last_sender: Mutex::new(None),
            next: OnceLock::new(),
        }))
    }

    /// The local address this buffer's socket is bound to, once
    /// `bind`/`connect` has succeeded — e.g. to discover the ephemeral
    /// port chosen for a `:0` bind (spec §8 scenario 4: "discover port
    /// P").
    #[must_use]
    pub fn local_port(&self) -> Option<u16> {
        self.socket
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
            .map(|addr| addr.port())
    }

    fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, BufferError> {
        endpoint
            .socket_addr_string()
            .parse()
            .map_err(|_| BufferError::InvalidArgument(format!("invalid socket address '{}'", endpoint.socket_addr_string())))
    }

    fn target(&self) -> Result<SocketAddr, BufferError> {
        if let Some(peer) = *self.peer.lock().unwrap() {
            return Ok(peer);
        }
        self.last_sender
            .lock()
            .unwrap()
            .ok_or_else(|| BufferError::InvalidState("no known peer to send to".to_owned()))
    }

    /// Sends `bytes` verbatim to the current target, bypassing this
    /// buffer's own storage — the datagram equivalent of `send_from`,
    /// used by `QuicBuffer` to ship an already-framed stream packet.
    ///
    /// # Errors
    ///
    /// Same conditions as [`NetworkBuffer::send`].
    pub(crate) fn send_raw(&self, bytes: &[u8]) -> Result<i64, BufferError> {
        let target = self.target()?;
        let guard = self.socket.lock().unwrap();
        let socket = guard
            .as_ref()
            .ok_or_else(|| BufferError::InvalidState("no bound socket".to_owned()))?;
        match socket.send_to(bytes, target) {
            Ok(n) => {
                self.core.stats().record_send(n as u64);
                Ok(n as i64)
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => {
                self.core.stats().record_error();
                Err(err.into())
            }
        }
    }

    /// Receives one raw datagram without blocking and without touching
    /// this buffer's storage or receive queue — the datagram
    /// equivalent of `receive_into`, used by `QuicBuffer` to pull a
    /// framed stream packet for its own demultiplexing.
    ///
    /// # Errors
    ///
    /// Same conditions as [`NetworkBuffer::receive`].
    pub(crate) fn try_recv_raw(&self, max_len: usize) -> Result<Option<(Vec<u8>, SocketAddr)>, BufferError> {
        let mut chunk = vec![0u8; max_len];
        let guard = self.socket.lock().unwrap();
        let socket = guard
            .as_ref()
            .ok_or_else(|| BufferError::InvalidState("no bound socket".to_owned()))?;
        match socket.recv_from(&mut chunk) {
            Ok((n, sender)) => {
                drop(guard);
                *self.last_sender.lock().unwrap() = Some(sender);
                self.core.stats().record_receive(n as u64);
                chunk.truncate(n);
                Ok(Some((chunk, sender)))
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => {
                self.core.stats().record_error();
                Err(err.into())
            }
        }
    }
}

impl Buffer for UdpBuffer {
    fn id(&self) -> BufferId {
        self.core.id()
    }

    fn capacity(&self) -> usize {
        self.core.capacity()
    }

    fn frontier_cell(&self) -> &std::sync::atomic::AtomicUsize {
        self.core.frontier_cell()
    }

    fn flags(&self) -> BufferFlags {
        self.core.flags()
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Udp
    }

    fn data_ptr(&self) -> Option<std::ptr::NonNull<u8>> {
        self.core.data_ptr()
    }

    fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError> {
        self.core.span(offset, length)
    }

    fn clear(&self, fill_byte: u8) -> Result<(), BufferError> {
        self.core.clear(fill_byte)
    }

    fn deallocate(&self) {
        *self.socket.lock().unwrap() = None;
        self.core.deallocate();
    }

    fn is_pinned(&self) -> bool {
        self.core.is_pinned()
    }

    fn acquire_pin(&self) {
        self.core.acquire_pin();
    }

    fn release_pin(&self) {
        self.core.release_pin();
    }
}

impl NetworkBuffer for UdpBuffer {
    fn network_state(&self) -> NetworkState {
        self.core.state().get()
    }

    fn bind(&self, endpoint: &Endpoint) -> Result<bool, BufferError> {
        self.core.state().transition(NetworkState::Binding)?;
        let addr = Self::resolve(endpoint)?;
        match UdpSocket::bind(addr).and_then(|socket| {
            socket.set_nonblocking(true)?;
            Ok(socket)
        }) {
            Ok(socket) => {
                *self.socket.lock().unwrap() = Some(socket);
                self.core.state().transition(NetworkState::Listening)?;
                Ok(true)
            }
            Err(err) => {
                self.core.state().force(NetworkState::Failed);
                self.core.stats().record_error();
                Err(err.into())
            }
        }
    }

    fn connect(&self, endpoint: &Endpoint) -> Result<bool, BufferError> {
        self.core.state().transition(NetworkState::Connecting)?;
        let addr = Self::resolve(endpoint)?;
        let local: SocketAddr = if addr.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        match UdpSocket::bind(local).and_then(|socket| {
            socket.connect(addr)?;
            socket.set_nonblocking(true)?;
            Ok(socket)
        }) {
            Ok(socket) => {
                *self.socket.lock().unwrap() = Some(socket);
                *self.peer.lock().unwrap() = Some(addr);
                self.core.state().transition(NetworkState::Ready)?;
                Ok(true)
            }
            Err(err) => {
                self.core.state().force(NetworkState::Failed);
                self.core.stats().record_error();
                Err(err.into())
            }
        }
    }

    fn send(&self, offset: usize, size: usize) -> Result<i64, BufferError> {
        let payload = self.core.span(offset, size)?.as_slice().to_vec();
        let target = self.target()?;
        let guard = self.socket.lock().unwrap();
        let socket = guard
            .as_ref()
            .ok_or_else(|| BufferError::InvalidState("no bound socket".to_owned()))?;
        match socket.send_to(&payload, target) {
            Ok(n) => {
                self.core.stats().record_send(n as u64);
                Ok(n as i64)
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => {
                self.core.stats().record_error();
                Err(err.into())
            }
        }
    }

    fn receive(&self, offset: usize, size: usize) -> Result<i64, BufferError> {
        let mut chunk = vec![0u8; size];
        let guard = self.socket.lock().unwrap();
        let socket = guard
            .as_ref()
            .ok_or_else(|| BufferError::InvalidState("no bound socket".to_owned()))?;
        match socket.recv_from(&mut chunk) {
            Ok((n, sender)) => {
                drop(guard);
                *self.last_sender.lock().unwrap() = Some(sender);
                self.core.stats().record_receive(n as u64);
                self.core.accept_ingress(
                    offset,
                    &chunk[..n],
                    ReceiveDescriptor::with_sender(
                        offset,
                        n,
                        Endpoint::new(sender.ip().to_string(), sender.port(), buffer::endpoint::NetworkTransport::Udp),
                    ),
                )?;
                Ok(n as i64)
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => {
                self.core.stats().record_error();
                Err(err.into())
            }
        }
    }

    fn send_from(&self, other: &dyn Buffer, size: usize, src_offset: usize) -> Result<i64, BufferError> {
        let payload = other.span(src_offset, size)?.as_slice().to_vec();
        let target = self.target()?;
        let guard = self.socket.lock().unwrap();
        let socket = guard
            .as_ref()
            .ok_or_else(|| BufferError::InvalidState("no bound socket".to_owned()))?;
        match socket.send_to(&payload, target) {
            Ok(n) => {
                self.core.stats().record_send(n as u64);
                Ok(n as i64)
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => {
                self.core.stats().record_error();
                Err(err.into())
            }
        }
    }

    fn receive_into(&self, other: &dyn Buffer, size: usize, dst_offset: usize) -> Result<i64, BufferError> {
        let mut chunk = vec![0u8; size];
        let guard = self.socket.lock().unwrap();
        let socket = guard
            .as_ref()
            .ok_or_else(|| BufferError::InvalidState("no bound socket".to_owned()))?;
        match socket.recv_from(&mut chunk) {
            Ok((n, sender)) => {
                drop(guard);
                *self.last_sender.lock().unwrap() = Some(sender);
                self.core.stats().record_receive(n as u64);
                let written = write_bytes_at(other, dst_offset, &chunk[..n])?;
                Ok(written as i64)
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => {
                self.core.stats().record_error();
                Err(err.into())
            }
        }
    }

    fn get_rx(&self, _size: usize) -> Option<ReceiveDescriptor> {
        self.core.pop_rx()
    }

    fn poll(&self, timeout_ms: u64) -> Result<usize, BufferError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut events = 0usize;
        loop {
            let guard = self.socket.lock().unwrap();
            let Some(socket) = guard.as_ref() else { break };
            let mut chunk = [0u8; POLL_READ_BUF];
            match socket.recv_from(&mut chunk) {
                Ok((n, sender)) => {
                    drop(guard);
                    *self.last_sender.lock().unwrap() = Some(sender);
                    let offset = self.frontier_cell().load(std::sync::atomic::Ordering::Acquire);
                    self.core.stats().record_receive(n as u64);
                    self.core.accept_ingress(
                        offset,
                        &chunk[..n],
                        ReceiveDescriptor::with_sender(
                            offset,
                            n,
                            Endpoint::new(sender.ip().to_string(), sender.port(), buffer::endpoint::NetworkTransport::Udp),
                        ),
                    )?;
                    events += 1;
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(events)
    }

    fn stats(&self) -> NetworkStatsSnapshot {
        self.core.stats_snapshot()
    }

    fn local_port(&self) -> Option<u16> {
        self.local_port()
    }

    fn close(&self) {
        let current = self.network_state();
        if matches!(current, NetworkState::Ready | NetworkState::Listening) {
            let _ = self.core.state().transition(NetworkState::Closing);
        }
        *self.socket.lock().unwrap() = None;
        self.core.state().force(NetworkState::Closed);
    }
}

impl Chainable for UdpBuffer {
    fn next_link(&self) -> &OnceLock<Arc<UdpBuffer>> {
        &self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buffer::endpoint::NetworkTransport;

    fn loopback_endpoint(port: u16) -> Endpoint {
        Endpoint::new("127.0.0.1", port, NetworkTransport::Udp)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            UdpBuffer::new(BufferId::from_raw(0), 0),
            Err(BufferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn datagram_round_trip_over_loopback() {
        let server = UdpBuffer::new(BufferId::from_raw(0), 64).unwrap();
        server.bind(&loopback_endpoint(0)).unwrap();
        let server_port = {
            let guard = server.socket.lock().unwrap();
            guard.as_ref().unwrap().local_addr().unwrap().port()
        };

        let client = UdpBuffer::new(BufferId::from_raw(1), 64).unwrap();
        client.connect(&loopback_endpoint(server_port)).unwrap();
        assert_eq!(client.network_state(), NetworkState::Ready);

        write_bytes_at(client.as_ref(), 0, b"ping").unwrap();
        let sent = client.send(0, 4).unwrap();
        assert_eq!(sent, 4);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut received = 0;
        while received == 0 && Instant::now() < deadline {
            received = server.receive(0, 4).unwrap();
        }
        assert_eq!(received, 4);
        assert_eq!(&*server.span(0, 4).unwrap(), b"ping");

        server.close();
        client.close();
    }
}
