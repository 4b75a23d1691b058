#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `buffer` defines the polymorphic byte-range contract every Alligator
//! backend implements: identity ([`id::BufferId`]), construction-time
//! flags ([`flags::BufferFlags`], [`flags::BackendKind`]), the writer
//! frontier and reservation protocol ([`contract::Buffer::reserve`]),
//! bounds-checked views ([`span::ByteSpan`]), pinning
//! ([`pin::PinHandle`]), and typed element access
//! ([`typed::typed_element`]).
//!
//! # Design
//!
//! [`contract::Buffer`] is kept strictly object-safe: no generic methods,
//! no `Self`-returning associated functions. This lets the registry crate
//! store every backend behind one `Arc<dyn Buffer>` directory regardless
//! of concrete type. Operations that are naturally generic — typed
//! element access — live as free functions in [`typed`] that take
//! `&dyn Buffer`, rather than as trait methods.
//!
//! # Invariants
//!
//! - A [`id::BufferId`] is either the sentinel (index field all-ones) or
//!   carries the registry-valid bit; see [`id::IdSpace`].
//! - [`contract::Buffer::reserve`] only ever advances the writer
//!   frontier; it never decreases it, and two concurrent reservations
//!   never observe overlapping ranges.
//! - [`span::resolve_span`] is the single bounds-check every backend's
//!   `span` implementation is expected to route through.
//!
//! # Errors
//!
//! All fallible operations return [`error::BufferError`], the flat error
//! enum that every other Alligator crate converts its own errors into at
//! the point it crosses back into buffer-contract territory.
//!
//! # Examples
//!
//! ```
//! use buffer::contract::{Buffer, Reservation};
//! use buffer::flags::{BackendKind, BufferFlags};
//! use buffer::id::BufferId;
//! use buffer::span::{resolve_span, ByteSpan};
//! use std::cell::UnsafeCell;
//! use std::ptr::NonNull;
//! use std::sync::atomic::AtomicUsize;
//!
//! struct Scratch {
//!     bytes: UnsafeCell<[u8; 8]>,
//!     frontier: AtomicUsize,
//! }
//! unsafe impl Sync for Scratch {}
//!
//! impl Buffer for Scratch {
//!     fn id(&self) -> BufferId { BufferId::from_raw(0) }
//!     fn capacity(&self) -> usize { 8 }
//!     fn frontier_cell(&self) -> &AtomicUsize { &self.frontier }
//!     fn flags(&self) -> BufferFlags { BufferFlags::heap() }
//!     fn backend_kind(&self) -> BackendKind { BackendKind::Heap }
//!     fn data_ptr(&self) -> Option<NonNull<u8>> {
//!         NonNull::new(self.bytes.get().cast())
//!     }
//!     fn span(&self, offset: usize, length: usize) -> Result<ByteSpan<'_>, buffer::error::BufferError> {
//!         let (offset, length) = resolve_span(8, offset, length)?;
//!         let slice = unsafe { &(*self.bytes.get())[offset..offset + length] };
//!         Ok(ByteSpan::new(slice))
//!     }
//!     fn clear(&self, fill_byte: u8) -> Result<(), buffer::error::BufferError> {
//!         unsafe { (*self.bytes.get()).fill(fill_byte) };
//!         Ok(())
//!     }
//!     fn deallocate(&self) {}
//!     fn is_pinned(&self) -> bool { false }
//!     fn acquire_pin(&self) {}
//!     fn release_pin(&self) {}
//! }
//!
//! let scratch = Scratch { bytes: UnsafeCell::new([0; 8]), frontier: AtomicUsize::new(0) };
//! assert_eq!(scratch.reserve(5), Reservation::Reserved { offset: 0 });
//! assert_eq!(scratch.reserve(5), Reservation::WouldOverflow);
//! ```
//!
//! # See also
//!
//! - `chain` for the multi-buffer Chain Protocol layered on top of
//!   [`contract::Buffer::reserve`].
//! - `registry` for the fabric directory that owns buffers behind
//!   `Arc<dyn Buffer>`.

pub mod contract;
pub mod endpoint;
pub mod error;
pub mod flags;
pub mod id;
pub mod pin;
pub mod receive;
pub mod span;
pub mod typed;

pub use contract::{Buffer, Reservation};
pub use endpoint::{Endpoint, NetworkOptimization, NetworkTransport};
pub use error::{BufferError, BufferResult};
pub use flags::{BackendKind, BufferFlags};
pub use id::{BufferId, IdSpace};
pub use pin::PinHandle;
pub use receive::ReceiveDescriptor;
pub use span::{ByteSpan, ByteSpanMut};
pub use typed::{set_typed_element, typed_element, PlainData};
