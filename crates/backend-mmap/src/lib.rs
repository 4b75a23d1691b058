#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::undocumented_unsafe_blocks)]

//! # Overview
//!
//! `backend-mmap` maps a plain file's bytes into the process address
//! space (spec §4.D). Content is durable across process restarts as
//! long as the backing file persists; `deallocate` only unmaps, it never
//! deletes the file.
//!
//! # Design
//!
//! [`mmap::MmapBuffer`] wraps [`memmap2::MmapMut`] (the corpus's mapped-
//! file crate, already a `workspace.dependencies` entry) behind the same
//! `UnsafeCell`-plus-atomic-flags shape as `backend_heap::HeapBuffer`, so
//! the two crates read nearly identically once you know one of them.
//!
//! # Invariants
//!
//! - `deallocate` drops the mapping exactly once; the file itself is
//!   untouched.
//! - Re-mapping the same file recovers whatever bytes the previous
//!   mapping wrote, since both map the same on-disk region.
//!
//! # Errors
//!
//! Any I/O failure opening, resizing, or mapping the file surfaces as
//! [`buffer::error::BufferError`] via its `From<std::io::Error>` impl.
//!
//! # Examples
//!
//! ```no_run
//! use backend_mmap::MmapBuffer;
//! use buffer::contract::Buffer;
//! use buffer::id::BufferId;
//!
//! let mapped = MmapBuffer::create(BufferId::from_raw(0), "/tmp/alligator-example", 4096).unwrap();
//! mapped.clear(0).unwrap();
//! ```
//!
//! # See also
//!
//! - `backend-heap` for the backend this one is modelled on.
//! - `backend-shared` for the named, refcounted cross-process variant of
//!   a mapped region.

mod mmap;

pub use mmap::MmapBuffer;
