#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::undocumented_unsafe_blocks)]

//! # Overview
//!
//! `backend-heap` is the simplest Alligator backend: a single
//! zero-initialised, fixed-size allocation on the process heap (spec
//! §4.C). It doubles as the reference implementation every other
//! backend crate's `Buffer`/`Chainable` impl is modelled on.
//!
//! # Design
//!
//! [`buffer::HeapBuffer`] stores its bytes in a `Box<[u8]>` behind an
//! `UnsafeCell`, the same pattern `registry`'s and `chain`'s test
//! doubles use, now promoted to production code: `Buffer::span` and
//! `Buffer::clear` are the only two places that touch the cell, and both
//! route through [`buffer::span::resolve_span`] or check `is_pinned`
//! first. `Chainable` is implemented directly, so `HeapBuffer` can be
//! linked by `chain::reserve_with_chain` without any adapter type.
//!
//! # Invariants
//!
//! - `deallocate` is idempotent; a second call is a no-op.
//! - Once deallocated, every span/clear call returns
//!   [`buffer::error::BufferError::InvalidState`] instead of touching
//!   freed memory.
//!
//! # Errors
//!
//! Construction fails only for a zero-byte request
//! ([`buffer::error::BufferError::InvalidArgument`]); true allocator
//! exhaustion aborts the process, matching `Vec`'s own OOM behaviour.
//!
//! # Examples
//!
//! ```
//! use backend_heap::HeapBuffer;
//! use buffer::contract::Buffer;
//! use buffer::id::BufferId;
//!
//! let heap = HeapBuffer::new(BufferId::from_raw(0), 64).unwrap();
//! heap.clear(0x42).unwrap();
//! assert_eq!(heap.span(0, 4).unwrap().as_slice(), &[0x42; 4]);
//! ```
//!
//! # See also
//!
//! - `buffer` for the `Buffer` trait this type implements.
//! - `chain` for the protocol that links `HeapBuffer`s together once one
//!   fills up.

mod heap;

pub use heap::HeapBuffer;
