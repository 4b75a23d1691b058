//! crates/backend-net/src/core.rs
//!
//! Fields and `Buffer` plumbing shared by every concrete network
//! backend: staging storage, pins, the state machine, statistics, and
//! the receive queue. Each concrete backend (`TcpBuffer`, `UdpBuffer`,
//! …) embeds one [`NetCore`] and adds only its transport-specific
//! socket handles, the way `asio_tcp_buffer.hpp` and
//! `asio_udp_buffer.hpp` in the original shared a common base instead
//! of duplicating bookkeeping per transport.

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use buffer::error::BufferError;
use buffer::flags::BufferFlags;
use buffer::id::BufferId;
use buffer::receive::ReceiveDescriptor;
use buffer::span::{resolve_span, ByteSpan};

use crate::contract::{NetworkState, StateCell};
use crate::rx_queue::{ReceiveQueue, DEFAULT_RX_QUEUE_CAPACITY};
use crate::stats::{NetworkStats, NetworkStatsSnapshot};

pub(crate) struct NetCore {
    id: BufferId,
    storage: UnsafeCell<Box<[u8]>>,
    frontier: AtomicUsize,
    pins: AtomicU32,
    deallocated: AtomicBool,
    state: StateCell,
    stats: NetworkStats,
    rx_queue: ReceiveQueue,
}

// SAFETY: `storage` is only reached through the bounds-checked methods
// below, which never issue overlapping exclusive accesses.
unsafe impl Sync for NetCore {}

impl NetCore {
    pub(crate) fn new(id: BufferId, capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidArgument(
                "network buffer capacity must be > 0".to_owned(),
            ));
        }
        Ok(Self {
            id,
            storage: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            frontier: AtomicUsize::new(0),
            pins: AtomicU32::new(0),
            deallocated: AtomicBool::new(false),
            state: StateCell::new(),
            stats: NetworkStats::new(),
            rx_queue: ReceiveQueue::new(DEFAULT_RX_QUEUE_CAPACITY),
        })
    }

    pub(crate) const fn id(&self) -> BufferId {
        self.id
    }

    pub(crate) fn capacity(&self) -> usize {
        // SAFETY: length never changes after construction.
        unsafe { (*self.storage.get()).len() }
    }

    pub(crate) const fn frontier_cell(&self) -> &AtomicUsize {
        &self.frontier
    }

    pub(crate) fn flags(&self) -> BufferFlags {
        BufferFlags::network()
    }

    pub(crate) fn data_ptr(&self) -> Option<NonNull<u8>> {
        if self.deallocated.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the boxed slice is never reallocated after
        // construction.
        NonNull::new(unsafe { (*self.storage.get()).as_mut_ptr() })
    }

    pub(crate) fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError> {
        if self.deallocated.load(Ordering::Acquire) {
            return Err(BufferError::InvalidState("buffer deallocated".to_owned()));
        }
        let (offset, length) = resolve_span(self.capacity(), offset, length)?;
        // SAFETY: `resolve_span` guarantees `offset + length <= capacity`.
        let slice = unsafe { &(*self.storage.get())[offset..offset + length] };
        Ok(ByteSpan::new(slice))
    }

    pub(crate) fn clear(&self, fill_byte: u8) -> Result<(), BufferError> {
        if self.is_pinned() {
            return Err(BufferError::InvalidState(
                "cannot clear a pinned buffer".to_owned(),
            ));
        }
        if self.deallocated.load(Ordering::Acquire) {
            return Err(BufferError::InvalidState("buffer deallocated".to_owned()));
        }
        // SAFETY: not pinned (checked above).
        unsafe { (*self.storage.get()).fill(fill_byte) };
        Ok(())
    }

    pub(crate) fn deallocate(&self) {
        if self.deallocated.swap(true, Ordering::AcqRel) {
            return;
        }
        // SAFETY: swapping `deallocated` to `true` exactly once here
        // guarantees this runs at most once.
        unsafe {
            *self.storage.get() = Box::new([]);
        }
    }

    pub(crate) fn is_pinned(&self) -> bool {
        self.pins.load(Ordering::Acquire) > 0
    }

    pub(crate) fn acquire_pin(&self) {
        self.pins.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_pin(&self) {
        self.pins.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) const fn state(&self) -> &StateCell {
        &self.state
    }

    pub(crate) const fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub(crate) fn stats_snapshot(&self) -> NetworkStatsSnapshot {
        self.stats.snapshot()
    }

    /// Writes `bytes` into `[offset, offset + bytes.len())`, advances
    /// `writer_frontier` to at least that range's end, and enqueues a
    /// matching receive descriptor (spec §4.G `receive`).
    pub(crate) fn accept_ingress(
        &self,
        offset: usize,
        bytes: &[u8],
        descriptor: ReceiveDescriptor,
    ) -> Result<usize, BufferError> {
        let (offset, length) = resolve_span(self.capacity(), offset, bytes.len())?;
        // SAFETY: bounds checked above; ingress writes never overlap a
        // concurrent `clear` because both require the caller to respect
        // the single-writer discipline of the buffer contract.
        let storage = unsafe { &mut *self.storage.get() };
        storage[offset..offset + length].copy_from_slice(&bytes[..length]);
        let end = (offset + length) as usize;
        self.frontier.fetch_max(end, Ordering::AcqRel);
        if !self.rx_queue.push(descriptor) {
            self.stats.record_drop();
        }
        Ok(length)
    }

    pub(crate) fn pop_rx(&self) -> Option<ReceiveDescriptor> {
        self.rx_queue.pop()
    }

    /// Enqueues `descriptor` without touching storage or the writer
    /// frontier, for backends whose payload lives in auxiliary state
    /// (e.g. `QuicBuffer`'s per-stream buffers) rather than this core's
    /// own staging bytes.
    pub(crate) fn enqueue_descriptor(&self, descriptor: ReceiveDescriptor) {
        if !self.rx_queue.push(descriptor) {
            self.stats.record_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            NetCore::new(BufferId::from_raw(0), 0),
            Err(BufferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn accept_ingress_advances_frontier_and_enqueues() {
        let core = NetCore::new(BufferId::from_raw(0), 16).unwrap();
        let written = core
            .accept_ingress(0, &[1, 2, 3], ReceiveDescriptor::new(0, 3))
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(core.frontier_cell().load(Ordering::Acquire), 3);
        assert_eq!(core.pop_rx(), Some(ReceiveDescriptor::new(0, 3)));
    }

    #[test]
    fn starts_in_idle_state() {
        let core = NetCore::new(BufferId::from_raw(0), 16).unwrap();
        assert_eq!(core.state().get(), NetworkState::Idle);
    }
}
