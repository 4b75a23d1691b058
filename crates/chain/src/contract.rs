//! crates/chain/src/contract.rs
//!
//! The capability a concrete buffer type needs to participate in the
//! Chain Protocol (spec §4.B).

use std::sync::{Arc, OnceLock};

use buffer::Buffer;

/// A buffer type that can be linked into a chain.
///
/// `next_link` is a single-assignment cell: the first successful
/// `OnceLock::set` wins the race to install a successor, and every
/// other contender observes `Err` and must retire its own candidate
/// (spec §4.B step 2). `OnceLock` gives this CAS-once semantics without
/// hand-rolled atomic-pointer juggling.
pub trait Chainable: Buffer + Sized {
    /// The cell holding this link's successor, once installed.
    fn next_link(&self) -> &OnceLock<Arc<Self>>;
}
