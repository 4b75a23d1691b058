//! crates/buffer/src/pin.rs
//!
//! RAII pinning (spec §4.D): while a `PinHandle` is alive, the Reclaimer
//! must not deallocate the buffer it guards, grounded on
//! `ICollectiveBuffer::pin`/`unpin` in `buffer.hpp`.

use std::sync::Arc;

use crate::contract::Buffer;

/// Keeps a buffer alive against reclamation for as long as it is held.
///
/// Cloning a `PinHandle` acquires a second, independent pin rather than
/// sharing a refcount with the original, matching the original's
/// per-call `pin()`/`unpin()` pairing.
pub struct PinHandle {
    buffer: Arc<dyn Buffer>,
}

impl PinHandle {
    /// Acquires a pin on `buffer`.
    #[must_use]
    pub fn new(buffer: Arc<dyn Buffer>) -> Self {
        buffer.acquire_pin();
        Self { buffer }
    }

    /// The pinned buffer.
    #[must_use]
    pub fn buffer(&self) -> &Arc<dyn Buffer> {
        &self.buffer
    }
}

impl Clone for PinHandle {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.buffer))
    }
}

impl Drop for PinHandle {
    fn drop(&mut self) {
        self.buffer.release_pin();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{BackendKind, BufferFlags};
    use crate::id::BufferId;
    use crate::span::ByteSpan;
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    struct CountingBuffer {
        pins: AtomicU32,
        frontier: AtomicUsize,
    }

    impl Buffer for CountingBuffer {
        fn id(&self) -> BufferId {
            BufferId::from_raw(0)
        }
        fn capacity(&self) -> usize {
            0
        }
        fn frontier_cell(&self) -> &AtomicUsize {
            &self.frontier
        }
        fn flags(&self) -> BufferFlags {
            BufferFlags::heap()
        }
        fn backend_kind(&self) -> BackendKind {
            BackendKind::Heap
        }
        fn data_ptr(&self) -> Option<NonNull<u8>> {
            None
        }
        fn span(&self, _offset: usize, _length: usize) -> Result<ByteSpan<'_>, crate::error::BufferError> {
            Ok(ByteSpan::new(&[]))
        }
        fn clear(&self, _fill_byte: u8) -> Result<(), crate::error::BufferError> {
            Ok(())
        }
        fn deallocate(&self) {}
        fn is_pinned(&self) -> bool {
            self.pins.load(Ordering::Acquire) > 0
        }
        fn acquire_pin(&self) {
            self.pins.fetch_add(1, Ordering::AcqRel);
        }
        fn release_pin(&self) {
            self.pins.fetch_sub(1, Ordering::AcqRel);
        }
    }

    #[test]
    fn pin_then_drop_restores_unpinned() {
        let buf: Arc<dyn Buffer> = Arc::new(CountingBuffer {
            pins: AtomicU32::new(0),
            frontier: AtomicUsize::new(0),
        });
        {
            let _handle = PinHandle::new(Arc::clone(&buf));
            assert!(buf.is_pinned());
        }
        assert!(!buf.is_pinned());
    }

    #[test]
    fn cloned_handles_each_hold_their_own_pin() {
        let buf: Arc<dyn Buffer> = Arc::new(CountingBuffer {
            pins: AtomicU32::new(0),
            frontier: AtomicUsize::new(0),
        });
        let first = PinHandle::new(Arc::clone(&buf));
        let second = first.clone();
        drop(first);
        assert!(buf.is_pinned());
        drop(second);
        assert!(!buf.is_pinned());
    }
}
