//! crates/backend-net/src/thunderbolt.rs
//!
//! The Thunderbolt network buffer (spec §4.G "Thunderbolt variant"),
//! grounded on `ThunderboltDMABuffer` in
//! `original_source/include/alligator/buffer/thunderbolt_dma_buffer.hpp`,
//! whose docstring already concedes it behaves like a regular buffer
//! "with fallback to HeapBuffer" off macOS — here it is exactly the TCP
//! state machine with a fixed `NetworkOptimization::Throughput`
//! interface-preference hint, the thin-wrapper relationship spec §4.G's
//! last paragraph calls for ("behaviourally identical to TCP ... its
//! distinguishing contract is only the preferred-interface hint").

use std::sync::{Arc, OnceLock};

use buffer::contract::Buffer;
use buffer::endpoint::{Endpoint, NetworkOptimization, NetworkTransport};
use buffer::error::BufferError;
use buffer::flags::{BackendKind, BufferFlags};
use buffer::id::BufferId;
use buffer::receive::ReceiveDescriptor;
use buffer::span::ByteSpan;
use chain::Chainable;

use crate::contract::{NetworkBuffer, NetworkState};
use crate::stats::NetworkStatsSnapshot;
use crate::tcp::TcpBuffer;

/// A TCP network buffer with a fixed Thunderbolt interface preference
/// (spec §4.G "Thunderbolt variant").
pub struct ThunderboltBuffer {
    inner: Arc<TcpBuffer>,
    next: OnceLock<Arc<ThunderboltBuffer>>,
}

impl ThunderboltBuffer {
    /// Allocates `capacity` bytes of staging storage, delegating every
    /// transport concern to an inner [`TcpBuffer`].
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidArgument`] for `capacity == 0`.
    pub fn new(id: BufferId, capacity: usize) -> Result<Arc<Self>, BufferError> {
        Ok(Arc::new(Self {
            inner: TcpBuffer::new(id, capacity)?,
            next: OnceLock::new(),
        }))
    }

    /// Rewrites `endpoint`'s optimisation profile to `Throughput` with
    /// a Thunderbolt interface preference, the one contract difference
    /// from plain TCP (spec §4.G).
    #[must_use]
    pub fn preferred_endpoint(endpoint: &Endpoint) -> Endpoint {
        Endpoint::with_optimization(
            endpoint.host(),
            endpoint.port(),
            NetworkTransport::Thunderbolt,
            NetworkOptimization::Throughput,
        )
    }
}

impl Buffer for ThunderboltBuffer {
    fn id(&self) -> BufferId {
        self.inner.id()
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn frontier_cell(&self) -> &std::sync::atomic::AtomicUsize {
        self.inner.frontier_cell()
    }

    fn flags(&self) -> BufferFlags {
        self.inner.flags()
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Thunderbolt
    }

    fn data_ptr(&self) -> Option<std::ptr::NonNull<u8>> {
        self.inner.data_ptr()
    }

    fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError> {
        self.inner.span(offset, length)
    }

    fn clear(&self, fill_byte: u8) -> Result<(), BufferError> {
        self.inner.clear(fill_byte)
    }

    fn deallocate(&self) {
        self.inner.deallocate();
    }

    fn is_pinned(&self) -> bool {
        self.inner.is_pinned()
    }

    fn acquire_pin(&self) {
        self.inner.acquire_pin();
    }

    fn release_pin(&self) {
        self.inner.release_pin();
    }
}

impl NetworkBuffer for ThunderboltBuffer {
    fn network_state(&self) -> NetworkState {
        self.inner.network_state()
    }

    fn bind(&self, endpoint: &Endpoint) -> Result<bool, BufferError> {
        self.inner.bind(&Self::preferred_endpoint(endpoint))
    }

    fn connect(&self, endpoint: &Endpoint) -> Result<bool, BufferError> {
        self.inner.connect(&Self::preferred_endpoint(endpoint))
    }

    fn send(&self, offset: usize, size: usize) -> Result<i64, BufferError> {
        self.inner.send(offset, size)
    }

    fn receive(&self, offset: usize, size: usize) -> Result<i64, BufferError> {
        self.inner.receive(offset, size)
    }

    fn send_from(&self, other: &dyn Buffer, size: usize, src_offset: usize) -> Result<i64, BufferError> {
        self.inner.send_from(other, size, src_offset)
    }

    fn receive_into(&self, other: &dyn Buffer, size: usize, dst_offset: usize) -> Result<i64, BufferError> {
        self.inner.receive_into(other, size, dst_offset)
    }

    fn get_rx(&self, size: usize) -> Option<ReceiveDescriptor> {
        self.inner.get_rx(size)
    }

    fn poll(&self, timeout_ms: u64) -> Result<usize, BufferError> {
        self.inner.poll(timeout_ms)
    }

    fn stats(&self) -> NetworkStatsSnapshot {
        self.inner.stats()
    }

    fn local_port(&self) -> Option<u16> {
        self.inner.local_port()
    }

    fn close(&self) {
        self.inner.close();
    }
}

impl Chainable for ThunderboltBuffer {
    fn next_link(&self) -> &OnceLock<Arc<ThunderboltBuffer>> {
        &self.next
    }
}
