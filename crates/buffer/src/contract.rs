//! crates/buffer/src/contract.rs
//!
//! The polymorphic buffer contract (spec §4.A), grounded on
//! `alligator::ICollectiveBuffer` in `original_source/include/alligator/buffer/buffer.hpp`.
//!
//! Implemented as a capability-set trait rather than a class hierarchy
//! (spec §9 "Polymorphism"): network and GPU backends layer further
//! capability traits (`backend-net::NetworkBuffer`, `backend-gpu::GpuBuffer`)
//! on top of this one.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::BufferError;
use crate::flags::{BackendKind, BufferFlags};
use crate::id::BufferId;
use crate::span::ByteSpan;

/// Outcome of an atomic reservation against a buffer's writer frontier
/// (spec §4.B step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The reservation fits; bytes `[offset, offset + n)` belong to the
    /// caller.
    Reserved {
        /// Start of the reserved range.
        offset: usize,
    },
    /// The reservation would exceed `capacity`; the caller must chain.
    WouldOverflow,
}

/// The abstract byte-range buffer every backend implements (spec §3.1,
/// §4.A).
///
/// `Buffer` is object-safe (`dyn Buffer` is used throughout the registry)
/// so that heterogeneous backends can share one directory; generic
/// operations such as [`crate::typed::typed_element`] are free functions
/// layered on top instead of trait methods.
pub trait Buffer: Send + Sync {
    /// The buffer's 32-bit token, assigned once at construction.
    fn id(&self) -> BufferId;

    /// Size in bytes, immutable after construction.
    fn capacity(&self) -> usize;

    /// The atomic cell backing the writer frontier. Required so that
    /// [`Buffer::writer_frontier`] and [`Buffer::reserve`] have a single
    /// shared source of truth; backends own the `AtomicUsize` and expose
    /// it here.
    fn frontier_cell(&self) -> &AtomicUsize;

    /// The three flags fixed at construction.
    fn flags(&self) -> BufferFlags;

    /// Which backend constructed this buffer.
    fn backend_kind(&self) -> BackendKind;

    /// A directly-dereferenceable pointer, iff [`Buffer::is_local`].
    /// Valid until `deallocate` or until the next mapping operation on
    /// backends that map/unmap.
    fn data_ptr(&self) -> Option<NonNull<u8>>;

    /// A bounds-checked byte-range view (spec §4.A `span`).
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfRange`] if `offset > capacity` or
    /// `offset + effective_length > capacity`, and
    /// [`BufferError::NotSupported`] if the buffer is not [`Buffer::is_local`].
    fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError>;

    /// Sets every byte of `[0, capacity)` to `fill_byte`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidState`] if any pin is live.
    fn clear(&self, fill_byte: u8) -> Result<(), BufferError>;

    /// Releases the buffer's backing resource. Called at most once, by
    /// the Reclaimer or by fabric teardown.
    fn deallocate(&self);

    /// True iff at least one live [`crate::pin::PinHandle`] exists.
    fn is_pinned(&self) -> bool;

    /// Registers one more live pin. Called by
    /// [`crate::pin::PinHandle::new`].
    fn acquire_pin(&self);

    /// Releases one live pin. Called by `PinHandle`'s `Drop` impl.
    fn release_pin(&self);

    /// CPU may dereference this buffer's bytes directly.
    fn is_local(&self) -> bool {
        self.flags().local
    }

    /// The buffer is backed by a memory-mapped file.
    fn is_file_backed(&self) -> bool {
        self.flags().file_backed
    }

    /// The buffer is visible across process boundaries.
    fn is_shared(&self) -> bool {
        self.flags().shared
    }

    /// The current writer frontier: `writer_frontier == capacity` means
    /// "full".
    fn writer_frontier(&self) -> usize {
        self.frontier_cell().load(Ordering::Acquire)
    }

    /// `writer_frontier == capacity`.
    fn is_full(&self) -> bool {
        self.writer_frontier() >= self.capacity()
    }

    /// Atomically reserves `n` bytes from the writer frontier (spec
    /// §4.B step 1, the producer side before a chain decision is made).
    ///
    /// On success, bytes `[offset, offset + n)` belong exclusively to
    /// the caller; no other reservation will overlap them.
    fn reserve(&self, n: usize) -> Reservation {
        let capacity = self.capacity();
        let mut current = self.frontier_cell().load(Ordering::Acquire);
        loop {
            let Some(end) = current.checked_add(n) else {
                return Reservation::WouldOverflow;
            };
            if end > capacity {
                return Reservation::WouldOverflow;
            }
            match self.frontier_cell().compare_exchange_weak(
                current,
                end,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Reservation::Reserved { offset: current },
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::BufferFlags;
    use std::sync::atomic::AtomicBool;

    /// A minimal in-memory `Buffer` used only to exercise the default
    /// trait methods (`reserve`, `is_full`, flag delegation).
    struct TestBuffer {
        id: BufferId,
        capacity: usize,
        frontier: AtomicUsize,
        pinned: AtomicBool,
    }

    impl Buffer for TestBuffer {
        fn id(&self) -> BufferId {
            self.id
        }
        fn capacity(&self) -> usize {
            self.capacity
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
        fn span(&self, _offset: usize, _length: usize) -> Result<ByteSpan<'_>, BufferError> {
            Err(BufferError::NotSupported("test buffer".into()))
        }
        fn clear(&self, _fill_byte: u8) -> Result<(), BufferError> {
            Ok(())
        }
        fn deallocate(&self) {}
        fn is_pinned(&self) -> bool {
            self.pinned.load(Ordering::Acquire)
        }
        fn acquire_pin(&self) {
            self.pinned.store(true, Ordering::Release);
        }
        fn release_pin(&self) {
            self.pinned.store(false, Ordering::Release);
        }
    }

    fn test_buffer(capacity: usize) -> TestBuffer {
        TestBuffer {
            id: BufferId::from_raw(0),
            capacity,
            frontier: AtomicUsize::new(0),
            pinned: AtomicBool::new(false),
        }
    }

    #[test]
    fn reserve_advances_frontier_monotonically() {
        let buf = test_buffer(16);
        assert_eq!(buf.reserve(10), Reservation::Reserved { offset: 0 });
        assert_eq!(buf.writer_frontier(), 10);
        assert_eq!(buf.reserve(6), Reservation::Reserved { offset: 10 });
        assert_eq!(buf.writer_frontier(), 16);
        assert!(buf.is_full());
    }

    #[test]
    fn reserve_past_capacity_overflows_without_advancing() {
        let buf = test_buffer(16);
        assert_eq!(buf.reserve(10), Reservation::Reserved { offset: 0 });
        assert_eq!(buf.reserve(10), Reservation::WouldOverflow);
        assert_eq!(buf.writer_frontier(), 10);
    }

    #[test]
    fn concurrent_reserve_yields_disjoint_ranges() {
        use std::sync::Arc;
        use std::thread;

        let buf = Arc::new(test_buffer(1000));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let buf = Arc::clone(&buf);
            handles.push(thread::spawn(move || buf.reserve(100)));
        }
        let mut offsets: Vec<usize> = handles
            .into_iter()
            .map(|h| match h.join().unwrap() {
                Reservation::Reserved { offset } => offset,
                Reservation::WouldOverflow => panic!("unexpected overflow"),
            })
            .collect();
        offsets.sort_unstable();
        assert_eq!(offsets, (0..10).map(|i| i * 100).collect::<Vec<_>>());
    }

    #[test]
    fn flag_delegation_matches_flags() {
        let buf = test_buffer(16);
        assert!(buf.is_local());
        assert!(!buf.is_shared());
        assert!(!buf.is_file_backed());
    }

    #[test]
    fn pin_round_trip() {
        let buf = test_buffer(16);
        assert!(!buf.is_pinned());
        buf.acquire_pin();
        assert!(buf.is_pinned());
        buf.release_pin();
        assert!(!buf.is_pinned());
    }
}
