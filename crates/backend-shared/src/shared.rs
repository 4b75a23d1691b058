//! crates/backend-shared/src/shared.rs
//!
//! A named, refcounted cross-process segment (spec §4.E), grounded on
//! `SharedBuffer` in
//! `original_source/include/alligator/buffer/shared_buffer.hpp`.

use std::cell::UnsafeCell;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
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

use crate::header::{generate_shm_name, HeaderView, HEADER_SIZE};

/// Resolves a segment name to a filesystem path backing it.
///
/// On Linux, `/dev/shm` is a `tmpfs` mount and the conventional home for
/// POSIX shared-memory objects (mirroring `shm_open`'s `/dev/shm/<name>`
/// naming in the original). Elsewhere, the system temp directory serves
/// the same role: any two processes that agree on `name` agree on this
/// path.
#[must_use]
pub fn shm_path(name: &str) -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        Path::new("/dev/shm").join(name)
    }
    #[cfg(not(target_os = "linux"))]
    {
        std::env::temp_dir().join(format!("alligator-shm-{name}"))
    }
}

/// A named segment with a 280-byte header (spec §6.2) followed by a
/// `capacity`-byte user region, refcounted across attaching processes.
///
/// `local = true`, `shared = true` (spec §4.E).
pub struct SharedBuffer {
    id: BufferId,
    name: String,
    path: PathBuf,
    capacity: usize,
    mapping: UnsafeCell<Option<MmapMut>>,
    _file: File,
    frontier: AtomicUsize,
    pins: AtomicU32,
    deallocated: AtomicBool,
    next: OnceLock<Arc<SharedBuffer>>,
}

// SAFETY: see `backend_heap::HeapBuffer` — `mapping` is only touched
// through the bounds-checked `Buffer` methods below, which never issue
// overlapping exclusive accesses.
unsafe impl Sync for SharedBuffer {}

impl SharedBuffer {
    /// Creates a brand-new named segment of `capacity` user bytes,
    /// generating a name if `name` is `None` (spec §4.E "On creation",
    /// "Naming").
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidArgument`] for `capacity == 0`; I/O
    /// failures creating or mapping the backing file surface via
    /// `BufferError`'s `From<std::io::Error>` impl.
    pub fn create(
        id: BufferId,
        name: Option<String>,
        capacity: usize,
    ) -> Result<Arc<Self>, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidArgument(
                "shared buffer capacity must be > 0".to_owned(),
            ));
        }
        let name = name.unwrap_or_else(generate_shm_name);
        let path = shm_path(&name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len((HEADER_SIZE + capacity) as u64)?;
        // SAFETY: the file was just created by this call with the
        // expected length and is not concurrently truncated for the
        // lifetime of this mapping.
        let mut mapping = unsafe { MmapMut::map_mut(&file)? };
        let creator_name = creator_process_name();
        // SAFETY: `mapping` is `HEADER_SIZE + capacity` bytes long and
        // page-aligned, satisfying `HeaderView::new`'s contract.
        let header = unsafe { HeaderView::new(mapping.as_mut_ptr()) };
        header.initialize(capacity as u64, &creator_name);

        Ok(Arc::new(Self {
            id,
            name,
            path,
            capacity,
            mapping: UnsafeCell::new(Some(mapping)),
            _file: file,
            frontier: AtomicUsize::new(0),
            pins: AtomicU32::new(0),
            deallocated: AtomicBool::new(false),
            next: OnceLock::new(),
        }))
    }

    /// Attaches to an existing named segment, validating that its
    /// recorded user size matches `capacity` (spec §4.E "On attach").
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidState`] if the segment's `total_size`
    /// disagrees with `capacity`; I/O failures opening or mapping the
    /// file surface via `BufferError`'s `From<std::io::Error>` impl.
    pub fn attach(id: BufferId, name: impl Into<String>, capacity: usize) -> Result<Arc<Self>, BufferError> {
        let name = name.into();
        let path = shm_path(&name);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        // SAFETY: the file already exists with a layout this process
        // did not just create but trusts to have been written by
        // `SharedBuffer::create`.
        let mut mapping = unsafe { MmapMut::map_mut(&file)? };
        // SAFETY: `mapping` must be at least `HEADER_SIZE` bytes for any
        // segment this crate created; a shorter file is a caller error
        // surfaced as a mismatch below rather than a memory-safety
        // violation, since `total_size` is read before any user-region
        // access.
        let header = unsafe { HeaderView::new(mapping.as_mut_ptr()) };
        let recorded_size = header.total_size().load(Ordering::Acquire);
        if recorded_size != capacity as u64 {
            return Err(BufferError::InvalidState(format!(
                "segment '{name}' has total_size {recorded_size}, expected {capacity}"
            )));
        }
        header.ref_count().fetch_add(1, Ordering::AcqRel);

        Ok(Arc::new(Self {
            id,
            name,
            path,
            capacity,
            mapping: UnsafeCell::new(Some(mapping)),
            _file: file,
            frontier: AtomicUsize::new(0),
            pins: AtomicU32::new(0),
            deallocated: AtomicBool::new(false),
            next: OnceLock::new(),
        }))
    }

    /// The segment's name, usable by another process to [`Self::attach`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn header(&self) -> Option<HeaderView<'_>> {
        // SAFETY: shared read of an `Option` only ever replaced wholesale
        // by `deallocate`, which checks `deallocated` first; the mapping
        // is always at least `HEADER_SIZE` bytes for a segment this type
        // constructed.
        let mapping = unsafe { &mut *self.mapping.get() };
        mapping
            .as_mut()
            .map(|m| unsafe { HeaderView::new(m.as_mut_ptr()) })
    }
}

impl Buffer for SharedBuffer {
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
        BufferFlags::shared_memory()
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Shared
    }

    fn data_ptr(&self) -> Option<NonNull<u8>> {
        if self.deallocated.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: the mapping is `HEADER_SIZE + capacity` bytes; the
        // user region starts exactly `HEADER_SIZE` bytes in.
        let mapping = unsafe { &*self.mapping.get() };
        mapping
            .as_ref()
            .and_then(|m| NonNull::new(unsafe { m.as_ptr().add(HEADER_SIZE) as *mut u8 }))
    }

    fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError> {
        if self.deallocated.load(Ordering::Acquire) {
            return Err(BufferError::InvalidState("buffer deallocated".to_owned()));
        }
        let (offset, length) = resolve_span(self.capacity, offset, length)?;
        // SAFETY: `resolve_span` guarantees `HEADER_SIZE + offset +
        // length <= HEADER_SIZE + capacity`, the mapping's full length.
        let mapping = unsafe { &*self.mapping.get() };
        let mapping = mapping
            .as_ref()
            .ok_or_else(|| BufferError::InvalidState("buffer deallocated".to_owned()))?;
        let start = HEADER_SIZE + offset;
        Ok(ByteSpan::new(&mapping[start..start + length]))
    }

    fn clear(&self, fill_byte: u8) -> Result<(), BufferError> {
        if self.is_pinned() {
            return Err(BufferError::InvalidState(
                "cannot clear a pinned buffer".to_owned(),
            ));
        }
        // SAFETY: not pinned (checked above); the user region is
        // `[HEADER_SIZE, HEADER_SIZE + capacity)` of the mapping.
        let mapping = unsafe { &mut *self.mapping.get() };
        let mapping = mapping
            .as_mut()
            .ok_or_else(|| BufferError::InvalidState("buffer deallocated".to_owned()))?;
        mapping[HEADER_SIZE..HEADER_SIZE + self.capacity].fill(fill_byte);
        Ok(())
    }

    fn deallocate(&self) {
        if self.deallocated.swap(true, Ordering::AcqRel) {
            return;
        }
        let remaining = self
            .header()
            .map(|header| header.ref_count().fetch_sub(1, Ordering::AcqRel) - 1);
        // SAFETY: `deallocated` flips to `true` at most once, so the
        // mapping is dropped exactly once here.
        unsafe {
            *self.mapping.get() = None;
        }
        if remaining == Some(0) {
            let _ = std::fs::remove_file(&self.path);
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

impl Chainable for SharedBuffer {
    fn next_link(&self) -> &OnceLock<Arc<SharedBuffer>> {
        &self.next
    }
}

fn creator_process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "alligator".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_test_name() -> String {
        format!("test-{}", generate_shm_name())
    }

    #[test]
    fn create_then_attach_shares_the_same_bytes() {
        let name = unique_test_name();
        let creator = SharedBuffer::create(BufferId::from_raw(0), Some(name.clone()), 64).unwrap();
        creator.clear(0x11).unwrap();

        let attached = SharedBuffer::attach(BufferId::from_raw(1), name, 64).unwrap();
        assert!(attached.span(0, 0).unwrap().iter().all(|&b| b == 0x11));

        creator.deallocate();
        attached.deallocate();
    }

    #[test]
    fn attach_with_mismatched_capacity_fails() {
        let name = unique_test_name();
        let creator = SharedBuffer::create(BufferId::from_raw(0), Some(name.clone()), 64).unwrap();
        let result = SharedBuffer::attach(BufferId::from_raw(1), name, 128);
        assert!(matches!(result, Err(BufferError::InvalidState(_))));
        creator.deallocate();
    }

    #[test]
    fn refcount_reaches_zero_and_removes_segment() {
        let name = unique_test_name();
        let path = shm_path(&name);
        let creator = SharedBuffer::create(BufferId::from_raw(0), Some(name.clone()), 32).unwrap();
        let attached = SharedBuffer::attach(BufferId::from_raw(1), name, 32).unwrap();

        creator.deallocate();
        assert!(path.exists());

        attached.deallocate();
        assert!(!path.exists());
    }

    #[test]
    fn flags_are_local_and_shared() {
        let name = unique_test_name();
        let buf = SharedBuffer::create(BufferId::from_raw(0), Some(name), 16).unwrap();
        assert!(buf.is_local());
        assert!(buf.is_shared());
        assert!(!buf.is_file_backed());
        buf.deallocate();
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let name = unique_test_name();
        let result = SharedBuffer::create(BufferId::from_raw(0), Some(name), 0);
        assert!(matches!(result, Err(BufferError::InvalidArgument(_))));
    }
}
