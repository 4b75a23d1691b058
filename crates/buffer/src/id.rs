//! crates/buffer/src/id.rs
//!
//! Buffer id encoding (spec §4.H "Id encoding", §6.1).
//!
//! Bit 31 is the valid flag; the low bits hold the slot index. The width
//! of the index field is configurable via [`IdSpace`] (`MAX_BUFFER_BIT`,
//! spec §6.4), defaulting to 22 bits (~4.2M slots), matching the
//! original `MAX_BUFFER_BIT` macro in `buffer.hpp`.

use std::fmt;

/// High bit of a buffer id: set iff the id is live.
const VALID_BIT: u32 = 1 << 31;

/// Default width, in bits, of the slot-index field.
pub const DEFAULT_MAX_BUFFER_BIT: u32 = 22;

/// Smallest and largest accepted `MAX_BUFFER_BIT` values (spec §6.4).
pub const MIN_MAX_BUFFER_BIT: u32 = 10;
/// See [`MIN_MAX_BUFFER_BIT`].
pub const MAX_MAX_BUFFER_BIT: u32 = 30;

/// A 32-bit buffer token (spec §3.1, §6.1).
///
/// Assigned exactly once at construction and immutable thereafter. Valid
/// iff the high bit is set and the low bits are `<=` the registry's
/// current capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u32);

impl BufferId {
    /// Wraps a raw 32-bit value without validating it.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw 32-bit wire value (little-endian on the wire per
    /// spec §6.1; in-memory representation is host-endian).
    #[must_use]
    pub const fn into_raw(self) -> u32 {
        self.0
    }

    /// True iff the high bit is set, i.e. this id was ever assigned by
    /// an [`IdSpace`].
    #[must_use]
    pub const fn is_valid_bit_set(self) -> bool {
        self.0 & VALID_BIT != 0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Governs id encoding/decoding for one registry: the mask width derived
/// from `MAX_BUFFER_BIT` and the sentinel "empty" id.
#[derive(Debug, Clone, Copy)]
pub struct IdSpace {
    index_mask: u32,
    sentinel: BufferId,
}

impl IdSpace {
    /// Builds an id space for the given `MAX_BUFFER_BIT` (spec §6.4:
    /// 10-30 inclusive). Clamped into range rather than panicking, since
    /// this is a build/runtime configuration value, not a programming
    /// error.
    #[must_use]
    pub fn new(max_buffer_bit: u32) -> Self {
        let bits = max_buffer_bit.clamp(MIN_MAX_BUFFER_BIT, MAX_MAX_BUFFER_BIT);
        let index_mask = (1u32 << bits) - 1;
        Self {
            index_mask,
            sentinel: BufferId(VALID_BIT | index_mask),
        }
    }

    /// The maximum number of slots this id space can address.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.index_mask + 1
    }

    /// The sentinel "no buffer" id (spec §6.1: `0x803FFFFF` at the
    /// default `MAX_BUFFER_BIT`).
    #[must_use]
    pub const fn sentinel(&self) -> BufferId {
        self.sentinel
    }

    /// Encodes a slot index into a live id.
    #[must_use]
    pub fn encode(&self, index: u32) -> BufferId {
        BufferId(VALID_BIT | (index & self.index_mask))
    }

    /// Decodes an id into a slot index, iff the id is well-formed and
    /// live (spec §3.1 invariant 3).
    #[must_use]
    pub fn decode(&self, id: BufferId) -> Option<u32> {
        if id == self.sentinel || id.0 & VALID_BIT == 0 {
            return None;
        }
        Some(id.0 & self.index_mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sentinel_matches_spec() {
        let space = IdSpace::new(DEFAULT_MAX_BUFFER_BIT);
        assert_eq!(space.sentinel().into_raw(), 0x803F_FFFF);
    }

    #[test]
    fn encode_decode_round_trips() {
        let space = IdSpace::new(DEFAULT_MAX_BUFFER_BIT);
        let id = space.encode(12345);
        assert_eq!(space.decode(id), Some(12345));
    }

    #[test]
    fn sentinel_decodes_to_none() {
        let space = IdSpace::new(DEFAULT_MAX_BUFFER_BIT);
        assert_eq!(space.decode(space.sentinel()), None);
    }

    #[test]
    fn id_without_valid_bit_decodes_to_none() {
        let space = IdSpace::new(DEFAULT_MAX_BUFFER_BIT);
        assert_eq!(space.decode(BufferId::from_raw(42)), None);
    }

    #[test]
    fn out_of_range_max_buffer_bit_is_clamped() {
        let too_small = IdSpace::new(0);
        assert_eq!(too_small.capacity(), 1 << MIN_MAX_BUFFER_BIT);
        let too_large = IdSpace::new(64);
        assert_eq!(too_large.capacity(), 1 << MAX_MAX_BUFFER_BIT);
    }

    #[test]
    fn encode_masks_index_to_field_width() {
        let space = IdSpace::new(10);
        let id = space.encode(u32::MAX);
        assert_eq!(space.decode(id), Some(space.index_mask));
    }
}
