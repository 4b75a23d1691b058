#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::undocumented_unsafe_blocks)]

//! # Overview
//!
//! `backend-gpu` defines the GPU buffer contract (spec §4.F) and ships
//! the one concrete backend this repository can offer without a vendor
//! driver dependency: [`simulated::SimulatedGpuBuffer`], which stands
//! in host heap memory for a device allocation. `BackendKind::Gpu`
//! always resolves to this backend (see `DESIGN.md`).
//!
//! # Design
//!
//! [`contract::GpuBuffer`] extends [`buffer::contract::Buffer`] and
//! stays free of generic methods, matching the object-safety
//! requirement every backend trait in this fabric shares. Async
//! operations dispatch onto `rayon`'s global thread pool and report
//! completion through a boxed `FnOnce` callback, since the fabric has
//! no single event loop for a future-based API to attach to.
//!
//! # Invariants
//!
//! - `map` is idempotent: repeated calls before the matching `unmap`
//!   return the same pointer.
//! - `upload`/`download`/`copy_from` bounds-check against capacity the
//!   same way every other backend's `span` does.
//! - A deallocated buffer refuses every `GpuBuffer` operation with
//!   [`buffer::error::BufferError::InvalidState`].
//!
//! # Errors
//!
//! [`buffer::error::BufferError::NotSupported`] when `map` is called on
//! device-local memory; [`buffer::error::BufferError::OutOfRange`] for
//! any operation whose offset/size exceeds capacity.
//!
//! # Examples
//!
//! ```
//! use backend_gpu::{MemoryType, SimulatedGpuBuffer};
//! use backend_gpu::GpuBuffer as _;
//! use buffer::id::BufferId;
//!
//! let buf = SimulatedGpuBuffer::new(BufferId::from_raw(0), 16, MemoryType::Unified).unwrap();
//! buf.upload(&[1, 2, 3], 0).unwrap();
//! let mut out = [0u8; 3];
//! buf.download(&mut out, 0).unwrap();
//! assert_eq!(out, [1, 2, 3]);
//! ```
//!
//! # See also
//!
//! - `backend-heap` for the storage discipline this backend reuses.
//! - `alligator` for how `BackendKind::Gpu` is routed to this crate.

pub mod contract;
mod simulated;

pub use contract::{GpuBuffer, MemoryType};
pub use simulated::SimulatedGpuBuffer;
