//! crates/backend-shared/src/header.rs
//!
//! The fixed segment header (spec §6.2) and the name-generation scheme
//! for anonymous segments (spec §4.E "Naming"), grounded on
//! `SharedHeader`/`generate_shm_name` in
//! `original_source/include/alligator/buffer/shared_buffer.hpp`.
//!
//! The spec lists the header fields in the order `ref_count: u32,
//! total_size: u64, version: u32, create_time: u64, creator_name: [u8;
//! 256]`. This implementation keeps the same 280-byte total and field
//! set but reorders the two `u64` fields before the two `u32` fields, so
//! every field lands on an offset naturally aligned for
//! `AtomicU64::from_ptr`/`AtomicU32::from_ptr` with zero padding — the
//! literal spec order would put `total_size` (a `u64`) at offset 4,
//! which is not 8-byte aligned. See `DESIGN.md`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// `total_size: u64` at offset 0.
pub const TOTAL_SIZE_OFFSET: usize = 0;
/// `create_time: u64` at offset 8.
pub const CREATE_TIME_OFFSET: usize = 8;
/// `ref_count: u32` at offset 16.
pub const REF_COUNT_OFFSET: usize = 16;
/// `version: u32` at offset 20.
pub const VERSION_OFFSET: usize = 20;
/// `creator_name: [u8; 256]` at offset 24.
pub const CREATOR_NAME_OFFSET: usize = 24;
/// Length of the `creator_name` field.
pub const CREATOR_NAME_LEN: usize = 256;
/// Total header size: `24 + 256 = 280` bytes (spec §6.2).
pub const HEADER_SIZE: usize = CREATOR_NAME_OFFSET + CREATOR_NAME_LEN;

/// The segment layout version this crate writes.
pub const SEGMENT_VERSION: u32 = 1;

/// Typed accessors over a header embedded in mapped bytes.
///
/// # Safety
///
/// `base` must point to at least [`HEADER_SIZE`] valid, writable bytes
/// for the lifetime `'a`, 8-byte aligned (true of any page-aligned
/// `mmap` base, which every offset here is derived from).
pub struct HeaderView<'a> {
    base: *mut u8,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> HeaderView<'a> {
    /// Wraps `base`, the first byte of a mapped segment.
    ///
    /// # Safety
    ///
    /// See the struct-level safety section.
    pub unsafe fn new(base: *mut u8) -> Self {
        Self {
            base,
            _marker: std::marker::PhantomData,
        }
    }

    fn field_ptr(&self, offset: usize) -> *mut u8 {
        // SAFETY: `offset` is always one of this module's named
        // constants, all `< HEADER_SIZE`, and `base` is valid for
        // `HEADER_SIZE` bytes per the constructor's safety contract.
        unsafe { self.base.add(offset) }
    }

    /// The `total_size` field.
    pub fn total_size(&self) -> &'a AtomicU64 {
        // SAFETY: offset 0 of an 8-byte-aligned base is itself 8-byte
        // aligned.
        unsafe { AtomicU64::from_ptr(self.field_ptr(TOTAL_SIZE_OFFSET).cast()) }
    }

    /// The `create_time` field.
    pub fn create_time(&self) -> &'a AtomicU64 {
        // SAFETY: offset 8 of an 8-byte-aligned base is 8-byte aligned.
        unsafe { AtomicU64::from_ptr(self.field_ptr(CREATE_TIME_OFFSET).cast()) }
    }

    /// The `ref_count` field.
    pub fn ref_count(&self) -> &'a AtomicU32 {
        // SAFETY: offset 16 of an 8-byte-aligned base is 4-byte aligned.
        unsafe { AtomicU32::from_ptr(self.field_ptr(REF_COUNT_OFFSET).cast()) }
    }

    /// The `version` field.
    pub fn version(&self) -> &'a AtomicU32 {
        // SAFETY: offset 20 of an 8-byte-aligned base is 4-byte aligned.
        unsafe { AtomicU32::from_ptr(self.field_ptr(VERSION_OFFSET).cast()) }
    }

    /// Writes `name`, truncated to [`CREATOR_NAME_LEN`] bytes and
    /// zero-padded, into the `creator_name` field.
    pub fn set_creator_name(&self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(CREATOR_NAME_LEN);
        // SAFETY: `creator_name` occupies
        // `[CREATOR_NAME_OFFSET, CREATOR_NAME_OFFSET + CREATOR_NAME_LEN)`,
        // entirely within the header the constructor guarantees is
        // valid; this call has exclusive access to it during creation.
        unsafe {
            let dst = self.field_ptr(CREATOR_NAME_OFFSET);
            std::ptr::write_bytes(dst, 0, CREATOR_NAME_LEN);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, len);
        }
    }

    /// Initialises a freshly created segment's header (spec §4.E "On
    /// creation").
    pub fn initialize(&self, total_size: u64, creator_name: &str) {
        self.total_size().store(total_size, Ordering::Release);
        self.create_time().store(now_unix_seconds(), Ordering::Release);
        self.version().store(SEGMENT_VERSION, Ordering::Release);
        self.ref_count().store(1, Ordering::Release);
        self.set_creator_name(creator_name);
    }
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a segment name unique to `(process id, wall-clock, a
/// monotonic counter)` (spec §4.E: "absent a name, one is generated
/// unique to (process, wall-clock, counter)"), matching
/// `generate_shm_name` in the original.
#[must_use]
pub fn generate_shm_name() -> String {
    let pid = std::process::id();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = NAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("alligator-{pid}-{now}-{counter}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_are_naturally_aligned() {
        assert_eq!(TOTAL_SIZE_OFFSET % 8, 0);
        assert_eq!(CREATE_TIME_OFFSET % 8, 0);
        assert_eq!(REF_COUNT_OFFSET % 4, 0);
        assert_eq!(VERSION_OFFSET % 4, 0);
    }

    #[test]
    fn header_size_is_280_bytes() {
        assert_eq!(HEADER_SIZE, 280);
    }

    #[test]
    fn generated_names_are_unique() {
        let first = generate_shm_name();
        let second = generate_shm_name();
        assert_ne!(first, second);
    }

    #[test]
    fn header_round_trips_through_a_byte_buffer() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        // SAFETY: `bytes` is exactly `HEADER_SIZE` long and 8-byte
        // aligned (heap allocations are at least pointer-aligned, and on
        // every platform this crate targets that is >= 8).
        let view = unsafe { HeaderView::new(bytes.as_mut_ptr()) };
        view.initialize(4096, "test-creator");
        assert_eq!(view.total_size().load(Ordering::Acquire), 4096);
        assert_eq!(view.ref_count().load(Ordering::Acquire), 1);
        assert_eq!(view.version().load(Ordering::Acquire), SEGMENT_VERSION);
    }
}
