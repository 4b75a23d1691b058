#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `chain` implements the Chain Protocol (spec §4.B): when a producer's
//! reservation would exceed a buffer's capacity, the buffer installs a
//! successor of the same backend kind and at least the requested size,
//! and the producer's reservation restarts against it. Traversal from a
//! chain head yields the logically concatenated byte stream across every
//! installed link.
//!
//! # Design
//!
//! [`contract::Chainable`] is the minimal capability a concrete buffer
//! type needs: a `Buffer` impl plus a single-assignment
//! `OnceLock<Arc<Self>>` cell for its successor. `OnceLock::set` gives
//! exactly the CAS-once semantics spec §4.B step 1 asks for without
//! hand-rolled atomic-pointer management: the first thread to `set`
//! installs the real successor, and every other contender's candidate is
//! routed to the caller-supplied `retire_loser` closure (see
//! [`reserve::reserve_with_chain`]) rather than synchronously freed,
//! since concrete buffer teardown belongs to the registry's
//! retire-then-reclaim pipeline.
//!
//! # Invariants
//!
//! - At most one successor is ever installed per link.
//! - A losing candidate is handed to `retire_loser` exactly once and
//!   never becomes reachable from any link's `next_link`.
//! - [`iter::chain_links`] always terminates: the chain only grows
//!   forward, so there is no cycle to traverse into.
//!
//! # Errors
//!
//! [`reserve::reserve_with_chain`] propagates whatever
//! [`buffer::error::BufferError`] the caller's `make_successor` closure
//! returns, e.g. `OutOfMemory` if the registry has no more slots.
//!
//! # See also
//!
//! - `buffer` for the underlying `Buffer::reserve` primitive this crate
//!   builds on.
//! - `registry` for the `Fabric::allocate`/`clear_buffer` closures wired
//!   in as `make_successor`/`retire_loser`.

pub mod contract;
pub mod iter;
pub mod reserve;

pub use contract::Chainable;
pub use iter::{chain_links, ChainIter};
pub use reserve::{reserve_with_chain, ChainReservation};
