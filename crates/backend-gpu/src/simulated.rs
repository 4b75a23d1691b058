//! crates/backend-gpu/src/simulated.rs
//!
//! A host-heap-backed stand-in for a real device allocation (spec §4.F
//! "absent vendor bindings, one concrete backend simulates device
//! memory on the host"), grounded on `HeapBuffer` in
//! `backend_heap::heap` for the storage discipline and on `rayon`'s
//! global pool (already a workspace dependency via other crates) for
//! async dispatch.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use buffer::contract::Buffer;
use buffer::error::BufferError;
use buffer::flags::{BackendKind, BufferFlags};
use buffer::id::BufferId;
use buffer::span::{resolve_span, ByteSpan};
use chain::Chainable;

use crate::contract::{GpuBuffer, MemoryType};

static NEXT_NATIVE_HANDLE: AtomicU64 = AtomicU64::new(1);

/// A single simulated device allocation: host memory that behaves like
/// a [`GpuBuffer`] without requiring a real GPU driver.
///
/// `local` and `shared` follow [`MemoryType::is_local`] /
/// [`MemoryType::is_shared`] for the memory type it was constructed
/// with (spec §4.F).
pub struct SimulatedGpuBuffer {
    id: BufferId,
    memory_type: MemoryType,
    // Shared (not just owned) so `upload_async`/`download_async` can
    // clone the `Arc` into their spawned closure: the allocation then
    // outlives this buffer if the registry reclaims it mid-flight, and
    // every access — sync or async — serializes through the same lock
    // instead of racing on a raw pointer.
    storage: Arc<Mutex<Box<[u8]>>>,
    frontier: AtomicUsize,
    pins: AtomicU32,
    mapped: AtomicBool,
    deallocated: AtomicBool,
    native_handle: u64,
    next: OnceLock<Arc<SimulatedGpuBuffer>>,
}

impl SimulatedGpuBuffer {
    /// Allocates `capacity` zero-initialised simulated device bytes.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidArgument`] for `capacity == 0`.
    pub fn new(id: BufferId, capacity: usize, memory_type: MemoryType) -> Result<Arc<Self>, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidArgument(
                "gpu buffer capacity must be > 0".to_owned(),
            ));
        }
        Ok(Arc::new(Self {
            id,
            memory_type,
            storage: Arc::new(Mutex::new(vec![0u8; capacity].into_boxed_slice())),
            frontier: AtomicUsize::new(0),
            pins: AtomicU32::new(0),
            mapped: AtomicBool::new(false),
            deallocated: AtomicBool::new(false),
            native_handle: NEXT_NATIVE_HANDLE.fetch_add(1, Ordering::Relaxed),
            next: OnceLock::new(),
        }))
    }

    fn check_alive(&self) -> Result<(), BufferError> {
        if self.deallocated.load(Ordering::Acquire) {
            Err(BufferError::InvalidState("buffer deallocated".to_owned()))
        } else {
            Ok(())
        }
    }

    /// Whether this buffer's contents are directly dereferenceable right
    /// now: host-visible memory always is, device-local memory only
    /// while mapped (spec §3.1 invariant 5).
    fn is_directly_addressable(&self) -> bool {
        self.memory_type.is_local() || self.is_mapped()
    }
}

impl Buffer for SimulatedGpuBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn capacity(&self) -> usize {
        self.storage.lock().expect("gpu storage lock poisoned").len()
    }

    fn frontier_cell(&self) -> &AtomicUsize {
        &self.frontier
    }

    fn flags(&self) -> BufferFlags {
        if self.memory_type.is_local() {
            BufferFlags::gpu_host_visible(self.memory_type.is_shared())
        } else {
            BufferFlags::gpu_device_local()
        }
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Gpu
    }

    fn data_ptr(&self) -> Option<NonNull<u8>> {
        if self.deallocated.load(Ordering::Acquire) || !self.is_directly_addressable() {
            return None;
        }
        let mut storage = self.storage.lock().expect("gpu storage lock poisoned");
        NonNull::new(storage.as_mut_ptr())
    }

    fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError> {
        self.check_alive()?;
        if !self.is_directly_addressable() {
            return Err(BufferError::NotSupported(
                "device-local memory is not directly dereferenceable; map() it or use upload/download".to_owned(),
            ));
        }
        let storage = self.storage.lock().expect("gpu storage lock poisoned");
        let (offset, length) = resolve_span(storage.len(), offset, length)?;
        // SAFETY: the lock above guarantees the allocation was not
        // mid-resize while its pointer was read; `capacity` bytes are
        // never reallocated except by `deallocate`, so the returned
        // slice stays valid for the borrow of `&self` the buffer
        // contract's single-writer discipline grants it, matching every
        // other backend's `span`.
        let slice = unsafe { std::slice::from_raw_parts(storage.as_ptr().add(offset), length) };
        Ok(ByteSpan::new(slice))
    }

    fn clear(&self, fill_byte: u8) -> Result<(), BufferError> {
        if self.is_pinned() {
            return Err(BufferError::InvalidState(
                "cannot clear a pinned buffer".to_owned(),
            ));
        }
        self.check_alive()?;
        let mut storage = self.storage.lock().expect("gpu storage lock poisoned");
        storage.fill(fill_byte);
        Ok(())
    }

    fn deallocate(&self) {
        if self.deallocated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.mapped.store(false, Ordering::Release);
        let mut storage = self.storage.lock().expect("gpu storage lock poisoned");
        *storage = Box::new([]);
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

impl GpuBuffer for SimulatedGpuBuffer {
    fn memory_type(&self) -> MemoryType {
        self.memory_type
    }

    fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    fn map(&self, offset: usize, size: usize) -> Result<NonNull<u8>, BufferError> {
        if !self.memory_type.is_local() {
            return Err(BufferError::NotSupported(
                "device-local memory cannot be mapped for host access".to_owned(),
            ));
        }
        self.check_alive()?;
        let mut storage = self.storage.lock().expect("gpu storage lock poisoned");
        let (offset, _) = resolve_span(storage.len(), offset, size)?;
        self.mapped.store(true, Ordering::Release);
        // SAFETY: `offset <= storage.len()`, verified by `resolve_span`.
        Ok(unsafe { NonNull::new_unchecked(storage.as_mut_ptr().add(offset)) })
    }

    fn unmap(&self) {
        self.mapped.store(false, Ordering::Release);
    }

    fn upload(&self, src: &[u8], offset: usize) -> Result<(), BufferError> {
        self.check_alive()?;
        let mut storage = self.storage.lock().expect("gpu storage lock poisoned");
        let (offset, length) = resolve_span(storage.len(), offset, src.len())?;
        storage[offset..offset + length].copy_from_slice(src);
        Ok(())
    }

    fn download(&self, dst: &mut [u8], offset: usize) -> Result<(), BufferError> {
        self.check_alive()?;
        let storage = self.storage.lock().expect("gpu storage lock poisoned");
        let (offset, length) = resolve_span(storage.len(), offset, dst.len())?;
        dst[..length].copy_from_slice(&storage[offset..offset + length]);
        Ok(())
    }

    fn copy_from(
        &self,
        other: &dyn GpuBuffer,
        size: usize,
        src_offset: usize,
        dst_offset: usize,
    ) -> Result<(), BufferError> {
        let mut staging = vec![0u8; size];
        other.download(&mut staging, src_offset)?;
        self.upload(&staging, dst_offset)
    }

    fn sync(&self) -> Result<(), BufferError> {
        self.check_alive()
    }

    fn upload_async(&self, src: Vec<u8>, offset: usize, callback: Box<dyn FnOnce(bool) + Send>) {
        let storage = Arc::clone(&self.storage);
        rayon::spawn(move || {
            let success = (|| -> Result<(), BufferError> {
                let mut storage = storage.lock().expect("gpu storage lock poisoned");
                // An empty allocation only ever means `deallocate` ran;
                // checking under the same lock `deallocate` takes closes
                // the race a pre-spawn snapshot of the flag would leave
                // open.
                if storage.is_empty() {
                    return Err(BufferError::InvalidState("buffer deallocated".to_owned()));
                }
                let (offset, length) = resolve_span(storage.len(), offset, src.len())?;
                storage[offset..offset + length].copy_from_slice(&src);
                Ok(())
            })()
            .is_ok();
            callback(success);
        });
    }

    fn download_async(
        &self,
        size: usize,
        offset: usize,
        callback: Box<dyn FnOnce(Vec<u8>, bool) + Send>,
    ) {
        let storage = Arc::clone(&self.storage);
        rayon::spawn(move || {
            let result = (|| -> Result<Vec<u8>, BufferError> {
                let storage = storage.lock().expect("gpu storage lock poisoned");
                if storage.is_empty() {
                    return Err(BufferError::InvalidState("buffer deallocated".to_owned()));
                }
                let (offset, length) = resolve_span(storage.len(), offset, size)?;
                Ok(storage[offset..offset + length].to_vec())
            })();
            match result {
                Ok(bytes) => callback(bytes, true),
                Err(_) => callback(Vec::new(), false),
            }
        });
    }

    fn native_handle(&self) -> u64 {
        self.native_handle
    }
}

impl Chainable for SimulatedGpuBuffer {
    fn next_link(&self) -> &OnceLock<Arc<SimulatedGpuBuffer>> {
        &self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn zero_capacity_is_rejected() {
        let result = SimulatedGpuBuffer::new(BufferId::from_raw(0), 0, MemoryType::Unified);
        assert!(matches!(result, Err(BufferError::InvalidArgument(_))));
    }

    #[test]
    fn unified_memory_is_local_and_shared() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 16, MemoryType::Unified).unwrap();
        assert!(buf.is_local());
        assert!(buf.is_shared());
    }

    #[test]
    fn device_local_memory_cannot_be_mapped() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 16, MemoryType::DeviceLocal).unwrap();
        assert!(matches!(
            buf.map(0, 16),
            Err(BufferError::NotSupported(_))
        ));
    }

    #[test]
    fn device_local_span_is_not_supported() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 16, MemoryType::DeviceLocal).unwrap();
        assert!(matches!(buf.span(0, 4), Err(BufferError::NotSupported(_))));
    }

    #[test]
    fn device_local_data_ptr_is_none() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 16, MemoryType::DeviceLocal).unwrap();
        assert!(buf.data_ptr().is_none());
    }

    #[test]
    fn map_twice_returns_the_same_pointer() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 16, MemoryType::HostVisible).unwrap();
        let first = buf.map(0, 16).unwrap();
        let second = buf.map(0, 16).unwrap();
        assert_eq!(first, second);
        buf.unmap();
        assert!(!buf.is_mapped());
    }

    #[test]
    fn upload_then_download_round_trips() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 8, MemoryType::Unified).unwrap();
        buf.upload(&[1, 2, 3, 4], 0).unwrap();
        let mut out = [0u8; 4];
        buf.download(&mut out, 0).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn copy_from_moves_bytes_between_two_buffers() {
        let src =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 8, MemoryType::Unified).unwrap();
        let dst =
            SimulatedGpuBuffer::new(BufferId::from_raw(1), 8, MemoryType::Unified).unwrap();
        src.upload(&[9, 8, 7], 0).unwrap();
        dst.copy_from(src.as_ref(), 3, 0, 0).unwrap();
        let mut out = [0u8; 3];
        dst.download(&mut out, 0).unwrap();
        assert_eq!(out, [9, 8, 7]);
    }

    #[test]
    fn native_handles_are_distinct_per_buffer() {
        let a = SimulatedGpuBuffer::new(BufferId::from_raw(0), 4, MemoryType::Unified).unwrap();
        let b = SimulatedGpuBuffer::new(BufferId::from_raw(1), 4, MemoryType::Unified).unwrap();
        assert_ne!(a.native_handle(), b.native_handle());
    }

    #[test]
    fn upload_async_fires_callback_on_completion() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 8, MemoryType::Unified).unwrap();
        let (tx, rx) = mpsc::channel();
        buf.upload_async(vec![1, 2, 3], 0, Box::new(move |ok| tx.send(ok).unwrap()));
        let ok = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(ok);
        let mut out = [0u8; 3];
        buf.download(&mut out, 0).unwrap();
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn download_async_fires_callback_with_bytes() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 8, MemoryType::Unified).unwrap();
        buf.upload(&[5, 6, 7], 0).unwrap();
        let (tx, rx) = mpsc::channel();
        buf.download_async(3, 0, Box::new(move |bytes, ok| tx.send((bytes, ok)).unwrap()));
        let (bytes, ok) = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(ok);
        assert_eq!(bytes, vec![5, 6, 7]);
    }

    #[test]
    fn upload_async_completes_after_buffer_handle_is_dropped() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 8, MemoryType::Unified).unwrap();
        let (tx, rx) = mpsc::channel();
        buf.upload_async(vec![1, 2, 3], 0, Box::new(move |ok| tx.send(ok).unwrap()));
        // The registry can retire and drop its last `Arc` to this buffer
        // while the async write is still in flight; the write must still
        // land because the spawned closure holds its own `Arc` to the
        // storage, not a raw pointer into `buf`.
        drop(buf);
        let ok = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(ok);
    }

    #[test]
    fn upload_async_after_deallocate_reports_failure() {
        let buf =
            SimulatedGpuBuffer::new(BufferId::from_raw(0), 8, MemoryType::Unified).unwrap();
        buf.deallocate();
        let (tx, rx) = mpsc::channel();
        buf.upload_async(vec![1, 2, 3], 0, Box::new(move |ok| tx.send(ok).unwrap()));
        let ok = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(!ok);
    }
}
