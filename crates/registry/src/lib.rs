#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `registry` owns the process-wide buffer directory (spec §4.H): slot
//! allocation, id encoding/decoding, growth, and the background
//! Reclaimer (spec §4.I). It is the one crate that hands out
//! [`buffer::id::BufferId`]s and is the sole authority on whether a
//! given id currently names a live buffer.
//!
//! # Design
//!
//! [`fabric::Fabric`] stores its directory as a
//! `RwLock<Vec<Mutex<Slot>>>` rather than a literal lock-free atomic
//! pointer array: readers (`get_buffer`, `clear_buffer`, reclamation)
//! take only the read lock, and the rare growth path takes the write
//! lock once, which mirrors the spec's "single-writer, cooperative"
//! growth without hand-rolled unsafe atomic-pointer-array code (see
//! `DESIGN.md` for the full rationale). [`reclaimer::Reclaimer`] runs the
//! retire-then-reclaim cycle on its own thread, independent of any
//! caller.
//!
//! # Invariants
//!
//! - [`fabric::Fabric::allocate`] never hands out the same slot index
//!   twice; indices are consumed monotonically even across construction
//!   failures.
//! - [`fabric::Fabric::get_buffer`] only ever returns a buffer whose own
//!   `id()` matches the id decoded from the slot index — a stale or
//!   mismatched occupant is treated as absent.
//! - [`fabric::Fabric::clear_buffer`] never deallocates synchronously;
//!   only [`reclaimer::Reclaimer`] (or explicit shutdown) does.
//!
//! # Errors
//!
//! [`error::RegistryError`] wraps [`buffer::error::BufferError`]
//! transparently (an exhausted id space surfaces as
//! [`buffer::error::BufferError::OutOfMemory`]) and adds `UnknownId` for
//! directory-level failures that have no backend counterpart.
//!
//! # Examples
//!
//! ```
//! use registry::Fabric;
//! use buffer::contract::Buffer;
//! use buffer::error::BufferError;
//! use buffer::flags::{BackendKind, BufferFlags};
//! use buffer::id::BufferId;
//! use buffer::span::{resolve_span, ByteSpan};
//! use std::cell::UnsafeCell;
//! use std::ptr::NonNull;
//! use std::sync::atomic::AtomicUsize;
//! use std::sync::Arc;
//!
//! struct Scratch { id: BufferId, bytes: UnsafeCell<Vec<u8>>, frontier: AtomicUsize }
//! unsafe impl Sync for Scratch {}
//! impl Buffer for Scratch {
//!     fn id(&self) -> BufferId { self.id }
//!     fn capacity(&self) -> usize { unsafe { (*self.bytes.get()).len() } }
//!     fn frontier_cell(&self) -> &AtomicUsize { &self.frontier }
//!     fn flags(&self) -> BufferFlags { BufferFlags::heap() }
//!     fn backend_kind(&self) -> BackendKind { BackendKind::Heap }
//!     fn data_ptr(&self) -> Option<NonNull<u8>> {
//!         NonNull::new(unsafe { (*self.bytes.get()).as_mut_ptr() })
//!     }
//!     fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, BufferError> {
//!         let (offset, length) = resolve_span(self.capacity(), offset, length)?;
//!         Ok(ByteSpan::new(unsafe { &(*self.bytes.get())[offset..offset + length] }))
//!     }
//!     fn clear(&self, fill_byte: u8) -> Result<(), BufferError> {
//!         unsafe { (*self.bytes.get()).fill(fill_byte) };
//!         Ok(())
//!     }
//!     fn deallocate(&self) {}
//!     fn is_pinned(&self) -> bool { false }
//!     fn acquire_pin(&self) {}
//!     fn release_pin(&self) {}
//! }
//!
//! let fabric = Fabric::with_default_id_space();
//! let buffer = fabric.allocate(|id| Ok(Arc::new(Scratch {
//!     id, bytes: UnsafeCell::new(vec![0u8; 16]), frontier: AtomicUsize::new(0),
//! }) as Arc<dyn Buffer>)).unwrap();
//! assert!(fabric.get_buffer(buffer.id()).is_some());
//! ```
//!
//! # See also
//!
//! - `buffer` for the `Buffer` trait and id encoding this crate manages.
//! - `chain` for the per-buffer overflow protocol that calls back into
//!   `Fabric::allocate`/`clear_buffer` to grow and retire links.
//! - `alligator` for the public facade that wires `Fabric` and
//!   `Reclaimer` together behind one process-wide handle.

pub mod diagnostics;
pub mod error;
pub mod fabric;
pub mod reclaimer;

pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use error::{RegistryError, RegistryResult};
pub use fabric::Fabric;
pub use reclaimer::{Reclaimer, DEFAULT_GC_INTERVAL};
