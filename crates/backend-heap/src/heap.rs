//! crates/backend-heap/src/heap.rs
//!
//! Plain contiguous process-heap allocation (spec §4.C), grounded on
//! `HeapBuffer` in `original_source/include/alligator/buffer/heap_buffer.hpp`.

use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::OnceLock;

use buffer::contract::Buffer;
use buffer::error::BufferError;
use buffer::flags::{BackendKind, BufferFlags};
use buffer::id::BufferId;
use buffer::span::{resolve_span, ByteSpan};
use chain::Chainable;

/// A fixed-size, zero-initialised region on the process heap.
///
/// `local = true`; `file_backed = false`; `shared = false` (spec §4.C).
pub struct HeapBuffer {
    id: BufferId,
    storage: UnsafeCell<Box<[u8]>>,
    frontier: AtomicUsize,
    pins: AtomicU32,
    deallocated: AtomicBool,
    next: OnceLock<std::sync::Arc<HeapBuffer>>,
}

// SAFETY: `storage` is only ever accessed through `Buffer::span` (shared
// read access bounds-checked against `capacity`) and `Buffer::clear`
// (exclusive write access gated by the caller holding no outstanding
// spans, per the buffer contract's single-writer discipline); no two
// overlapping mutable accesses are ever issued concurrently by the
// Alligator crates that construct a `HeapBuffer`.
unsafe impl Sync for HeapBuffer {}

impl HeapBuffer {
    /// Allocates `capacity` zero-initialised bytes and embeds `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidArgument`] for a zero-byte request;
    /// the heap backend has no other construction failure mode under
    /// normal operation (an allocator abort on true OOM is outside
    /// Rust's error-recovery model).
    pub fn new(id: BufferId, capacity: usize) -> Result<std::sync::Arc<Self>, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidArgument(
                "heap buffer capacity must be > 0".to_owned(),
            ));
        }
        Ok(std::sync::Arc::new(Self {
            id,
            storage: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
            frontier: AtomicUsize::new(0),
            pins: AtomicU32::new(0),
            deallocated: AtomicBool::new(false),
            next: OnceLock::new(),
        }))
    }
}

impl Buffer for HeapBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn capacity(&self) -> usize {
        // SAFETY: length never changes after construction; reading it
        // races with nothing that mutates the slice's length.
        unsafe { (*self.storage.get()).len() }
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
        if self.deallocated.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the boxed slice is never reallocated after
        // construction, so this pointer remains valid for `capacity()`
        // bytes until `deallocate`.
        NonNull::new(unsafe { (*self.storage.get()).as_mut_ptr() })
    }

    fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError> {
        if self.deallocated.load(Ordering::Acquire) {
            return Err(BufferError::InvalidState("buffer deallocated".to_owned()));
        }
        let (offset, length) = resolve_span(self.capacity(), offset, length)?;
        // SAFETY: `resolve_span` guarantees `offset + length <= capacity`.
        let slice = unsafe { &(*self.storage.get())[offset..offset + length] };
        Ok(ByteSpan::new(slice))
    }

    fn clear(&self, fill_byte: u8) -> Result<(), BufferError> {
        if self.is_pinned() {
            return Err(BufferError::InvalidState(
                "cannot clear a pinned buffer".to_owned(),
            ));
        }
        if self.deallocated.load(Ordering::Acquire) {
            return Err(BufferError::InvalidState("buffer deallocated".to_owned()));
        }
        // SAFETY: not pinned (checked above) and not concurrently
        // spanned by any caller that respects the buffer contract's
        // single-writer discipline.
        unsafe { (*self.storage.get()).fill(fill_byte) };
        Ok(())
    }

    fn deallocate(&self) {
        if self.deallocated.swap(true, Ordering::AcqRel) {
            return;
        }
        // SAFETY: swapping `deallocated` to `true` exactly once here
        // guarantees this runs at most once; replacing the boxed slice
        // with an empty one releases the heap allocation immediately.
        unsafe {
            *self.storage.get() = Box::new([]);
        }
    }

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

impl Chainable for HeapBuffer {
    fn next_link(&self) -> &OnceLock<std::sync::Arc<HeapBuffer>> {
        &self.next
    }
}
