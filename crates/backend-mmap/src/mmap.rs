//! crates/backend-mmap/src/mmap.rs
//!
//! A memory-mapped file region (spec §4.D), grounded on the file-backed
//! half of `original_source/include/alligator/buffer/shared_buffer.hpp`
//! (the original maps both named shared segments and plain files through
//! the same `mmap`/`MapViewOfFile` call; this backend covers the
//! plain-file case, `backend-shared` the named-segment case).

use std::cell::UnsafeCell;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use memmap2::MmapMut;

use buffer::contract::Buffer;
use buffer::error::BufferError;
use buffer::flags::{BackendKind, BufferFlags};
use buffer::id::BufferId;
use buffer::span::{resolve_span, ByteSpan};
use chain::Chainable;

/// A `capacity`-byte region of a file mapped into the address space.
///
/// `local = true`, `file_backed = true` (spec §4.D). Data survives
/// process exit iff the backing file does; `deallocate` unmaps without
/// deleting the file.
pub struct MmapBuffer {
    id: BufferId,
    capacity: usize,
    mapping: UnsafeCell<Option<MmapMut>>,
    _file: File,
    frontier: AtomicUsize,
    pins: AtomicU32,
    deallocated: AtomicBool,
    next: OnceLock<Arc<MmapBuffer>>,
}

// SAFETY: `mapping` is only read through `Buffer::span`/`data_ptr`
// (bounds-checked shared access) and written through `Buffer::clear` or
// `deallocate` (gated by `is_pinned`/`deallocated`), matching the same
// single-writer discipline `backend-heap::HeapBuffer` relies on.
unsafe impl Sync for MmapBuffer {}

impl MmapBuffer {
    /// Opens (creating if absent) `path`, truncates/extends it to
    /// `capacity` bytes, and maps the whole file.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidArgument`] for `capacity == 0`; any
    /// [`std::io::Error`] from opening, resizing, or mapping the file is
    /// converted via `BufferError`'s `From<std::io::Error>` impl.
    pub fn create(id: BufferId, path: impl AsRef<Path>, capacity: usize) -> Result<Arc<Self>, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidArgument(
                "mmap buffer capacity must be > 0".to_owned(),
            ));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.set_len(capacity as u64)?;
        // SAFETY: the file was just opened by this call and is not
        // concurrently truncated by another process for the lifetime of
        // this mapping, which is the precondition `memmap2::MmapMut`
        // documents for `map_mut`.
        let mapping = unsafe { MmapMut::map_mut(&file)? };
        Ok(Arc::new(Self {
            id,
            capacity,
            mapping: UnsafeCell::new(Some(mapping)),
            _file: file,
            frontier: AtomicUsize::new(0),
            pins: AtomicU32::new(0),
            deallocated: AtomicBool::new(false),
            next: OnceLock::new(),
        }))
    }

    fn mapping_ptr(&self) -> Option<NonNull<u8>> {
        // SAFETY: shared read of an `Option` that is only ever written
        // once more, by `deallocate`, which first checks `deallocated`;
        // no reader observes a torn value because `mapping` is replaced
        // wholesale, not mutated in place.
        let mapping = unsafe { &*self.mapping.get() };
        mapping.as_ref().and_then(|m| NonNull::new(m.as_ptr() as *mut u8))
    }
}

impl Buffer for MmapBuffer {
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
        BufferFlags::file_mapped()
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::FileBacked
    }

    fn data_ptr(&self) -> Option<NonNull<u8>> {
        if self.deallocated.load(Ordering::Acquire) {
            return None;
        }
        self.mapping_ptr()
    }

    fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError> {
        if self.deallocated.load(Ordering::Acquire) {
            return Err(BufferError::InvalidState("buffer deallocated".to_owned()));
        }
        let (offset, length) = resolve_span(self.capacity, offset, length)?;
        // SAFETY: `resolve_span` guarantees `offset + length <= capacity`,
        // and the mapping covers exactly `capacity` bytes.
        let mapping = unsafe { &*self.mapping.get() };
        let mapping = mapping
            .as_ref()
            .ok_or_else(|| BufferError::InvalidState("buffer deallocated".to_owned()))?;
        Ok(ByteSpan::new(&mapping[offset..offset + length]))
    }

    fn clear(&self, fill_byte: u8) -> Result<(), BufferError> {
        if self.is_pinned() {
            return Err(BufferError::InvalidState(
                "cannot clear a pinned buffer".to_owned(),
            ));
        }
        // SAFETY: not pinned (checked above); exclusive access is
        // respected by the same single-writer discipline as `span`.
        let mapping = unsafe { &mut *self.mapping.get() };
        let mapping = mapping
            .as_mut()
            .ok_or_else(|| BufferError::InvalidState("buffer deallocated".to_owned()))?;
        mapping.fill(fill_byte);
        Ok(())
    }

    fn deallocate(&self) {
        if self.deallocated.swap(true, Ordering::AcqRel) {
            return;
        }
        // SAFETY: `deallocated` flips to `true` at most once (via the
        // swap above), so this runs exactly once; dropping the mapping
        // unmaps it without touching the underlying file's contents.
        unsafe {
            *self.mapping.get() = None;
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

impl Chainable for MmapBuffer {
    fn next_link(&self) -> &OnceLock<Arc<MmapBuffer>> {
        &self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn zero_capacity_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let result = MmapBuffer::create(BufferId::from_raw(0), file.path(), 0);
        assert!(matches!(result, Err(BufferError::InvalidArgument(_))));
    }

    #[test]
    fn flags_are_local_and_file_backed() {
        let file = NamedTempFile::new().unwrap();
        let buf = MmapBuffer::create(BufferId::from_raw(0), file.path(), 64).unwrap();
        assert!(buf.is_local());
        assert!(buf.is_file_backed());
        assert!(!buf.is_shared());
    }

    #[test]
    fn clear_then_span_reads_back_fill_byte() {
        let file = NamedTempFile::new().unwrap();
        let buf = MmapBuffer::create(BufferId::from_raw(0), file.path(), 32).unwrap();
        buf.clear(0x5A).unwrap();
        assert!(buf.span(0, 0).unwrap().iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn data_survives_a_second_mapping_of_the_same_file() {
        let file = NamedTempFile::new().unwrap();
        {
            let buf = MmapBuffer::create(BufferId::from_raw(0), file.path(), 16).unwrap();
            buf.clear(0x7E).unwrap();
        }
        let reopened = MmapBuffer::create(BufferId::from_raw(1), file.path(), 16).unwrap();
        assert!(reopened.span(0, 0).unwrap().iter().all(|&b| b == 0x7E));
    }

    #[test]
    fn deallocate_invalidates_further_access() {
        let file = NamedTempFile::new().unwrap();
        let buf = MmapBuffer::create(BufferId::from_raw(0), file.path(), 16).unwrap();
        buf.deallocate();
        assert!(matches!(buf.span(0, 1), Err(BufferError::InvalidState(_))));
        assert!(buf.data_ptr().is_none());
    }
}
