//! crates/registry/src/fabric.rs
//!
//! The process-wide buffer directory (spec §4.H), grounded on
//! `BuffetAlligator`'s slot array in `buffet_alligator.hpp`.
//!
//! The original keeps a literal `std::atomic<ICollectiveBuffer*>[]` with
//! an explicit `growing` CAS gate. Here the array is a
//! `RwLock<Vec<Mutex<Slot>>>`: readers (`get_buffer`, `clear_buffer`,
//! reclamation) take the read lock and only the rare growth path takes
//! the write lock, which gives the same "single-writer, cooperative"
//! growth the spec describes while staying entirely in safe Rust (see
//! `DESIGN.md`).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use buffer::contract::Buffer;
use buffer::error::BufferError;
use buffer::id::{BufferId, IdSpace, DEFAULT_MAX_BUFFER_BIT};

use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::{RegistryError, RegistryResult};

const INITIAL_SLOT_CAPACITY: usize = 1024;

#[derive(Default)]
struct Slot {
    buffer: Option<Arc<dyn Buffer>>,
    retired: bool,
}

/// The process-wide buffer directory (spec §4.H).
pub struct Fabric {
    slots: RwLock<Vec<Mutex<Slot>>>,
    next_index: AtomicU32,
    id_space: IdSpace,
    diagnostics: Diagnostics,
}

impl Fabric {
    /// Builds a fabric whose id space can address `2^max_buffer_bit`
    /// slots (clamped into `[10, 30]`, spec §6.4).
    #[must_use]
    pub fn new(max_buffer_bit: u32) -> Self {
        let id_space = IdSpace::new(max_buffer_bit);
        let initial = INITIAL_SLOT_CAPACITY
            .min(id_space.capacity() as usize)
            .max(1);
        let mut slots = Vec::with_capacity(initial);
        slots.resize_with(initial, Slot::default);
        Self {
            slots: RwLock::new(slots),
            next_index: AtomicU32::new(0),
            id_space,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Builds a fabric with the spec's default `MAX_BUFFER_BIT` (22).
    #[must_use]
    pub fn with_default_id_space() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BIT)
    }

    /// A snapshot of the free-running allocation/deallocation counters.
    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Reserves a slot, invokes `construct` with the id it must embed in
    /// the new buffer, and publishes the result (spec §4.H `allocate`,
    /// steps 1-4).
    ///
    /// # Errors
    ///
    /// [`BufferError::OutOfMemory`] if every slot in this registry's id
    /// space is in use (spec §7 has no dedicated "exhausted" kind —
    /// an exhausted id space is a memory exhaustion); otherwise
    /// propagates whatever [`BufferError`] `construct` returns.
    pub fn allocate<F>(&self, construct: F) -> RegistryResult<Arc<dyn Buffer>>
    where
        F: FnOnce(BufferId) -> Result<Arc<dyn Buffer>, BufferError>,
    {
        let index = self.next_index.fetch_add(1, Ordering::AcqRel);
        if index >= self.id_space.capacity() {
            return Err(RegistryError::Buffer(BufferError::OutOfMemory));
        }

        self.ensure_capacity(index as usize + 1);

        let id = self.id_space.encode(index);
        let buffer = construct(id)?;
        debug_assert_eq!(
            buffer.id(),
            id,
            "construct() must embed the id it was handed"
        );

        {
            let slots = self.slots.read().expect("slot array lock poisoned");
            let mut slot = slots[index as usize]
                .lock()
                .expect("slot mutex poisoned");
            slot.buffer = Some(Arc::clone(&buffer));
            slot.retired = false;
        }

        self.diagnostics.record_allocation();
        #[cfg(feature = "tracing")]
        tracing::trace!(id = %id, "buffer allocated");
        Ok(buffer)
    }

    /// Decodes `id` and loads the current occupant of its slot, iff the
    /// slot is occupied and the occupant's own id still matches (spec
    /// §4.H `get_buffer`).
    #[must_use]
    pub fn get_buffer(&self, id: BufferId) -> Option<Arc<dyn Buffer>> {
        let index = self.id_space.decode(id)?;
        let slots = self.slots.read().expect("slot array lock poisoned");
        let slot = slots.get(index as usize)?.lock().expect("slot mutex poisoned");
        match &slot.buffer {
            Some(buffer) if buffer.id() == id => Some(Arc::clone(buffer)),
            _ => None,
        }
    }

    /// Marks `id`'s slot as eligible for reclamation (spec §4.H
    /// `clear_buffer`). Does not free anything itself; the Reclaimer
    /// performs the actual deallocation once the buffer is unpinned.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownId`] if `id` does not currently occupy a
    /// slot in this registry.
    pub fn clear_buffer(&self, id: BufferId) -> RegistryResult<()> {
        let index = self.id_space.decode(id).ok_or(RegistryError::UnknownId)?;
        let slots = self.slots.read().expect("slot array lock poisoned");
        let mut slot = slots
            .get(index as usize)
            .ok_or(RegistryError::UnknownId)?
            .lock()
            .expect("slot mutex poisoned");
        match &slot.buffer {
            Some(buffer) if buffer.id() == id => {
                slot.retired = true;
                Ok(())
            }
            _ => Err(RegistryError::UnknownId),
        }
    }

    /// One Reclaimer cycle (spec §4.I step 2): deallocates every
    /// retired, unpinned, occupied slot below the current write
    /// frontier. Returns the number of buffers reclaimed.
    pub(crate) fn reclaim_cycle(&self) -> usize {
        let frontier = self.next_index.load(Ordering::Acquire) as usize;
        let slots = self.slots.read().expect("slot array lock poisoned");
        let mut reclaimed = 0usize;
        for slot_lock in slots.iter().take(frontier.min(slots.len())) {
            let mut slot = slot_lock.lock().expect("slot mutex poisoned");
            let eligible = slot.retired
                && slot
                    .buffer
                    .as_ref()
                    .is_some_and(|buffer| !buffer.is_pinned());
            if eligible {
                if let Some(buffer) = slot.buffer.take() {
                    buffer.deallocate();
                    reclaimed += 1;
                }
                slot.retired = false;
            }
        }
        drop(slots);
        for _ in 0..reclaimed {
            self.diagnostics.record_deallocation();
        }
        reclaimed
    }

    /// Teardown: deallocates every still-occupied slot regardless of
    /// retirement (spec §4.I shutdown).
    pub(crate) fn deallocate_all(&self) {
        let slots = self.slots.read().expect("slot array lock poisoned");
        for slot_lock in slots.iter() {
            let mut slot = slot_lock.lock().expect("slot mutex poisoned");
            if let Some(buffer) = slot.buffer.take() {
                buffer.deallocate();
                self.diagnostics.record_deallocation();
            }
        }
    }

    /// Doubles the slot array until it holds at least `target_len`
    /// entries, capped at the id space's capacity (spec §4.H "Growth").
    fn ensure_capacity(&self, target_len: usize) {
        {
            let slots = self.slots.read().expect("slot array lock poisoned");
            if slots.len() >= target_len {
                return;
            }
        }
        let mut slots = self.slots.write().expect("slot array lock poisoned");
        if slots.len() >= target_len {
            return;
        }
        let mut new_len = slots.len().max(1);
        while new_len < target_len {
            new_len *= 2;
        }
        new_len = new_len.min(self.id_space.capacity() as usize);
        #[cfg(feature = "tracing")]
        tracing::debug!(old_len = slots.len(), new_len, "registry growing slot array");
        slots.resize_with(new_len, Slot::default);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buffer::error::BufferError;
    use buffer::flags::{BackendKind, BufferFlags};
    use buffer::span::{resolve_span, ByteSpan};
    use std::cell::UnsafeCell;
    use std::ptr::NonNull;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct TestBuffer {
        id: BufferId,
        storage: UnsafeCell<Vec<u8>>,
        frontier: AtomicUsize,
        pinned: AtomicBool,
    }

    unsafe impl Sync for TestBuffer {}

    impl Buffer for TestBuffer {
        fn id(&self) -> BufferId {
            self.id
        }
        fn capacity(&self) -> usize {
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
            NonNull::new(unsafe { (*self.storage.get()).as_mut_ptr() })
        }
        fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError> {
            let (offset, length) = resolve_span(self.capacity(), offset, length)?;
            let slice = unsafe { &(*self.storage.get())[offset..offset + length] };
            Ok(ByteSpan::new(slice))
        }
        fn clear(&self, fill_byte: u8) -> Result<(), BufferError> {
            unsafe { (*self.storage.get()).fill(fill_byte) };
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

    fn make_test_buffer(id: BufferId, capacity: usize) -> Arc<dyn Buffer> {
        Arc::new(TestBuffer {
            id,
            storage: UnsafeCell::new(vec![0u8; capacity]),
            frontier: AtomicUsize::new(0),
            pinned: AtomicBool::new(false),
        })
    }

    #[test]
    fn allocate_then_get_buffer_round_trips() {
        let fabric = Fabric::new(10);
        let buffer = fabric
            .allocate(|id| Ok(make_test_buffer(id, 64)))
            .unwrap();
        let id = buffer.id();
        let fetched = fabric.get_buffer(id).unwrap();
        assert_eq!(fetched.id(), id);
        assert_eq!(fabric.diagnostics().allocations, 1);
    }

    #[test]
    fn get_buffer_with_sentinel_is_none() {
        let fabric = Fabric::new(10);
        let space = IdSpace::new(10);
        assert!(fabric.get_buffer(space.sentinel()).is_none());
    }

    #[test]
    fn clear_then_reclaim_removes_unpinned_buffer() {
        let fabric = Fabric::new(10);
        let buffer = fabric
            .allocate(|id| Ok(make_test_buffer(id, 64)))
            .unwrap();
        let id = buffer.id();
        drop(buffer);

        fabric.clear_buffer(id).unwrap();
        assert!(fabric.get_buffer(id).is_some());

        let reclaimed = fabric.reclaim_cycle();
        assert_eq!(reclaimed, 1);
        assert!(fabric.get_buffer(id).is_none());
        assert_eq!(fabric.diagnostics().deallocations, 1);
    }

    #[test]
    fn reclaim_defers_while_pinned() {
        let fabric = Fabric::new(10);
        let buffer = fabric
            .allocate(|id| Ok(make_test_buffer(id, 64)))
            .unwrap();
        let id = buffer.id();
        buffer.acquire_pin();

        fabric.clear_buffer(id).unwrap();
        let reclaimed = fabric.reclaim_cycle();
        assert_eq!(reclaimed, 0);
        assert!(fabric.get_buffer(id).is_some());

        buffer.release_pin();
        assert_eq!(fabric.reclaim_cycle(), 1);
    }

    #[test]
    fn allocation_grows_slot_array_past_initial_capacity() {
        let fabric = Fabric::new(12);
        for _ in 0..(INITIAL_SLOT_CAPACITY + 5) {
            fabric.allocate(|id| Ok(make_test_buffer(id, 1))).unwrap();
        }
        assert_eq!(fabric.diagnostics().allocations, (INITIAL_SLOT_CAPACITY + 5) as u64);
    }

    #[test]
    fn exhausted_id_space_is_reported() {
        let fabric = Fabric::new(10); // capacity = 1024
        for _ in 0..1024 {
            fabric.allocate(|id| Ok(make_test_buffer(id, 1))).unwrap();
        }
        let result = fabric.allocate(|id| Ok(make_test_buffer(id, 1)));
        assert!(matches!(
            result,
            Err(RegistryError::Buffer(BufferError::OutOfMemory))
        ));
    }

    #[test]
    fn construction_failure_leaves_a_hole_not_a_dangling_slot() {
        let fabric = Fabric::new(10);
        let result = fabric.allocate(|_id| Err(BufferError::OutOfMemory));
        assert!(result.is_err());
        // The next allocation still proceeds from a fresh index.
        let buffer = fabric
            .allocate(|id| Ok(make_test_buffer(id, 1)))
            .unwrap();
        assert!(fabric.get_buffer(buffer.id()).is_some());
    }

    #[test]
    fn shutdown_deallocates_even_unretired_buffers() {
        let fabric = Fabric::new(10);
        fabric.allocate(|id| Ok(make_test_buffer(id, 1))).unwrap();
        fabric.allocate(|id| Ok(make_test_buffer(id, 1))).unwrap();
        fabric.deallocate_all();
        assert_eq!(fabric.diagnostics().deallocations, 2);
    }
}
