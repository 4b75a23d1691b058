#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::undocumented_unsafe_blocks)]

//! # Overview
//!
//! `backend-shared` backs a named, refcounted segment visible across
//! process boundaries (spec §4.E): a fixed 280-byte header
//! ([`header::HeaderView`], spec §6.2) followed by the user region.
//! Creation initialises the header and sets `ref_count = 1`; attaching
//! validates the requested capacity against the segment's recorded size
//! and increments `ref_count`; the last detaching process removes the
//! segment.
//!
//! # Design
//!
//! [`shared::SharedBuffer`] maps the whole segment with
//! [`memmap2::MmapMut`], the same crate `backend-mmap` uses, and treats
//! the header as raw bytes accessed through
//! [`std::sync::atomic::AtomicU32::from_ptr`]/`AtomicU64::from_ptr`
//! rather than a `#[repr(C)]` struct, since the header is shared across
//! process boundaries and must stay layout-stable independent of this
//! crate's own type definitions.
//!
//! # Invariants
//!
//! - `ref_count` only ever changes by `+1` (attach) or `-1`
//!   (deallocate), both via `fetch_add`/`fetch_sub`.
//! - The segment's backing file is removed iff a `deallocate` observes
//!   `ref_count` reaching zero.
//! - `attach` never mutates `total_size`; a mismatch is reported, not
//!   silently corrected.
//!
//! # Errors
//!
//! [`buffer::error::BufferError::InvalidState`] on a capacity mismatch
//! at attach time; I/O failures opening, sizing, or mapping the segment
//! surface via `BufferError`'s `From<std::io::Error>` impl.
//!
//! # Examples
//!
//! ```no_run
//! use backend_shared::SharedBuffer;
//! use buffer::contract::Buffer;
//! use buffer::id::BufferId;
//!
//! let creator = SharedBuffer::create(BufferId::from_raw(0), None, 4096).unwrap();
//! let name = creator.name().to_owned();
//! let attached = SharedBuffer::attach(BufferId::from_raw(1), name, 4096).unwrap();
//! assert_eq!(attached.capacity(), 4096);
//! ```
//!
//! # See also
//!
//! - `backend-mmap` for the unnamed, non-refcounted mapped-file variant.
//! - `header` for the segment layout and name-generation scheme.

pub mod header;
mod shared;

pub use shared::{shm_path, SharedBuffer};
