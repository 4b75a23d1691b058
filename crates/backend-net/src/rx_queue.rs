//! crates/backend-net/src/rx_queue.rs
//!
//! The per-buffer FIFO of receive descriptors (spec §4.G "Receive
//! queue"), grounded on the bounded ring buffer `AsioTcpBuffer` keeps
//! for pending reads, backed here by `crossbeam_queue::ArrayQueue` (the
//! pack's lock-free bounded-queue crate) rather than a mutex-guarded
//! `VecDeque`.

use crossbeam_queue::ArrayQueue;

use buffer::receive::ReceiveDescriptor;

/// Receive queues hold this many descriptors before new arrivals are
/// dropped (spec §4.G: "Policy on overflow: drop-newest").
pub const DEFAULT_RX_QUEUE_CAPACITY: usize = 256;

/// A bounded, lock-free FIFO of [`ReceiveDescriptor`]s.
pub(crate) struct ReceiveQueue {
    queue: ArrayQueue<ReceiveDescriptor>,
}

impl ReceiveQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Enqueues `descriptor`. Returns `false` (drop-newest) if the queue
    /// was full.
    pub(crate) fn push(&self, descriptor: ReceiveDescriptor) -> bool {
        self.queue.push(descriptor).is_ok()
    }

    /// Dequeues the oldest descriptor, if any.
    pub(crate) fn pop(&self) -> Option<ReceiveDescriptor> {
        self.queue.pop()
    }
}
