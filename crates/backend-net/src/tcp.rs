//! crates/backend-net/src/tcp.rs
//!
//! The TCP network buffer (spec §4.G), grounded on `AsioTcpBuffer` in
//! `original_source/include/alligator/buffer/asio_tcp_buffer.hpp`, built
//! on `std::net` sockets constructed through `socket2` for the
//! `SO_REUSEADDR`/bounded-connect options the original's Asio layer
//! configures explicitly.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};

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

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LISTEN_BACKLOG: i32 = 128;
const POLL_READ_BUF: usize = 4096;

/// A stream-oriented network buffer (spec §4.G).
///
/// `local = true`; `file_backed = false`; `shared = false` (spec §3.1,
/// via [`BufferFlags::network`]).
pub struct TcpBuffer {
    core: NetCore,
    stream: Mutex<Option<TcpStream>>,
    listener: Mutex<Option<TcpListener>>,
    next: OnceLock<Arc<TcpBuffer>>,
}

impl TcpBuffer {
    /// Allocates `capacity` bytes of staging storage for a not-yet-bound
    /// or not-yet-connected TCP buffer.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidArgument`] for `capacity == 0`.
    pub fn new(id: BufferId, capacity: usize) -> Result<Arc<Self>, BufferError> {
        Ok(Arc::new(Self {
            core: NetCore::new(id, capacity)?,
            stream: Mutex::new(None),
            listener: Mutex::new(None),
            next: OnceLock::new(),
        }))
    }

    /// The local address this buffer's listener or stream is bound to,
    /// once `bind`/`connect` has succeeded — e.g. to discover the
    /// ephemeral port chosen for a `:0` bind (spec §8 scenario 4:
    /// "discover port P").
    #[must_use]
    pub fn local_port(&self) -> Option<u16> {
        if let Some(listener) = self.listener.lock().unwrap().as_ref() {
            return listener.local_addr().ok().map(|addr| addr.port());
        }
        self.stream
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|stream| stream.local_addr().ok())
            .map(|addr| addr.port())
    }

    fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, BufferError> {
        endpoint
            .socket_addr_string()
            .parse()
            .map_err(|_| BufferError::InvalidArgument(format!("invalid socket address '{}'", endpoint.socket_addr_string())))
    }
}

impl Buffer for TcpBuffer {
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
        BackendKind::Tcp
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
        *self.stream.lock().unwrap() = None;
        *self.listener.lock().unwrap() = None;
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

impl NetworkBuffer for TcpBuffer {
    fn network_state(&self) -> NetworkState {
        self.core.state().get()
    }

    fn bind(&self, endpoint: &Endpoint) -> Result<bool, BufferError> {
        self.core.state().transition(NetworkState::Binding)?;
        let addr = Self::resolve(endpoint)?;
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let result = (|| -> std::io::Result<TcpListener> {
            let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
            socket.set_reuse_address(true)?;
            socket.bind(&addr.into())?;
            socket.listen(LISTEN_BACKLOG)?;
            let listener: TcpListener = socket.into();
            listener.set_nonblocking(true)?;
            Ok(listener)
        })();
        match result {
            Ok(listener) => {
                *self.listener.lock().unwrap() = Some(listener);
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
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let result = (|| -> std::io::Result<TcpStream> {
            let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
            socket.connect_timeout(&addr.into(), CONNECT_TIMEOUT)?;
            let stream: TcpStream = socket.into();
            stream.set_nonblocking(true)?;
            Ok(stream)
        })();
        match result {
            Ok(stream) => {
                *self.stream.lock().unwrap() = Some(stream);
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
        if self.network_state() != NetworkState::Ready {
            return Err(BufferError::InvalidState(
                "send requires the Ready state".to_owned(),
            ));
        }
        let payload = self.core.span(offset, size)?.as_slice().to_vec();
        let mut guard = self.stream.lock().unwrap();
        let stream = guard
            .as_mut()
            .ok_or_else(|| BufferError::InvalidState("no connected stream".to_owned()))?;
        match stream.write(&payload) {
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
        let state = self.network_state();
        if !matches!(state, NetworkState::Ready | NetworkState::Listening) {
            return Err(BufferError::InvalidState(
                "receive requires Ready or Listening".to_owned(),
            ));
        }
        let mut chunk = vec![0u8; size];
        let mut guard = self.stream.lock().unwrap();
        let stream = guard
            .as_mut()
            .ok_or_else(|| BufferError::InvalidState("no connected stream".to_owned()))?;
        match stream.read(&mut chunk) {
            Ok(0) => {
                drop(guard);
                self.close();
                Ok(0)
            }
            Ok(n) => {
                drop(guard);
                self.core.stats().record_receive(n as u64);
                self.core
                    .accept_ingress(offset, &chunk[..n], ReceiveDescriptor::new(offset, n))?;
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
        if self.network_state() != NetworkState::Ready {
            return Err(BufferError::InvalidState(
                "send_from requires the Ready state".to_owned(),
            ));
        }
        let payload = other.span(src_offset, size)?.as_slice().to_vec();
        let mut guard = self.stream.lock().unwrap();
        let stream = guard
            .as_mut()
            .ok_or_else(|| BufferError::InvalidState("no connected stream".to_owned()))?;
        match stream.write(&payload) {
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
        let state = self.network_state();
        if !matches!(state, NetworkState::Ready | NetworkState::Listening) {
            return Err(BufferError::InvalidState(
                "receive_into requires Ready or Listening".to_owned(),
            ));
        }
        let mut chunk = vec![0u8; size];
        let mut guard = self.stream.lock().unwrap();
        let stream = guard
            .as_mut()
            .ok_or_else(|| BufferError::InvalidState("no connected stream".to_owned()))?;
        match stream.read(&mut chunk) {
            Ok(0) => {
                drop(guard);
                self.close();
                Ok(0)
            }
            Ok(n) => {
                drop(guard);
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
            match self.network_state() {
                NetworkState::Ready => {
                    let mut guard = self.stream.lock().unwrap();
                    let Some(stream) = guard.as_mut() else { break };
                    let mut chunk = [0u8; POLL_READ_BUF];
                    match stream.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            drop(guard);
                            let offset = self.frontier_cell().load(std::sync::atomic::Ordering::Acquire);
                            self.core.stats().record_receive(n as u64);
                            self.core.accept_ingress(
                                offset,
                                &chunk[..n],
                                ReceiveDescriptor::new(offset, n),
                            )?;
                            events += 1;
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                        Err(err) => {
                            self.core.stats().record_error();
                            return Err(err.into());
                        }
                    }
                }
                NetworkState::Listening => {
                    let guard = self.listener.lock().unwrap();
                    let Some(listener) = guard.as_ref() else { break };
                    match listener.accept() {
                        Ok(_) => events += 1,
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                        Err(_) => break,
                    }
                }
                _ => break,
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
        *self.stream.lock().unwrap() = None;
        *self.listener.lock().unwrap() = None;
        self.core.state().force(NetworkState::Closed);
    }
}

impl Chainable for TcpBuffer {
    fn next_link(&self) -> &OnceLock<Arc<TcpBuffer>> {
        &self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buffer::endpoint::NetworkTransport;
    use std::thread;

    fn loopback_endpoint(port: u16) -> Endpoint {
        Endpoint::new("127.0.0.1", port, NetworkTransport::Tcp)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            TcpBuffer::new(BufferId::from_raw(0), 0),
            Err(BufferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn send_before_ready_is_refused() {
        let buf = TcpBuffer::new(BufferId::from_raw(0), 16).unwrap();
        assert!(matches!(
            buf.send(0, 4),
            Err(BufferError::InvalidState(_))
        ));
    }

    #[test]
    fn bind_then_connect_reaches_listening_and_ready() {
        let server = TcpBuffer::new(BufferId::from_raw(0), 64).unwrap();
        assert!(server.bind(&loopback_endpoint(0)).unwrap());
        // port 0 lets the OS choose; re-derive the bound port for the client.
        let bound_port = {
            let guard = server.listener.lock().unwrap();
            guard.as_ref().unwrap().local_addr().unwrap().port()
        };
        assert_eq!(server.network_state(), NetworkState::Listening);

        let client = TcpBuffer::new(BufferId::from_raw(1), 64).unwrap();
        let connected = client.connect(&loopback_endpoint(bound_port)).unwrap();
        assert!(connected);
        assert_eq!(client.network_state(), NetworkState::Ready);

        server.close();
        client.close();
    }

    #[test]
    fn echo_round_trip_over_loopback() {
        let server = TcpBuffer::new(BufferId::from_raw(0), 64).unwrap();
        server.bind(&loopback_endpoint(0)).unwrap();
        let bound_port = {
            let guard = server.listener.lock().unwrap();
            guard.as_ref().unwrap().local_addr().unwrap().port()
        };

        let accept_thread = thread::spawn(move || {
            let listener = {
                let guard = server.listener.lock().unwrap();
                guard.as_ref().unwrap().try_clone().unwrap()
            };
            listener.set_nonblocking(false).unwrap();
            let (mut stream, _addr) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let client = TcpBuffer::new(BufferId::from_raw(1), 64).unwrap();
        client.connect(&loopback_endpoint(bound_port)).unwrap();
        client.clear(0).unwrap();
        crate::xfer::write_bytes_at(client.as_ref(), 0, b"hello").unwrap();
        let sent = client.send(0, 5).unwrap();
        assert_eq!(sent, 5);

        let mut received = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        while received == 0 && Instant::now() < deadline {
            received = client.receive(0, 5).unwrap();
        }
        assert_eq!(received, 5);
        assert_eq!(&*client.span(0, 5).unwrap(), b"hello");

        accept_thread.join().unwrap();
    }
}
