//! crates/registry/src/diagnostics.rs
//!
//! Process-wide allocation/deallocation counters, grounded on
//! `allocation_counter_`/`deallocation_counter_` in
//! `buffet_alligator.hpp`. Independent of any single buffer's own
//! statistics; purely a fabric-level diagnostic.

use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time read of the fabric's free-running counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    /// Total buffers ever constructed by `allocate`.
    pub allocations: u64,
    /// Total buffers ever handed to their backend's `deallocate`.
    pub deallocations: u64,
}

/// The fabric's counter pair.
#[derive(Debug, Default)]
pub struct Diagnostics {
    allocations: AtomicU64,
    deallocations: AtomicU64,
}

impl Diagnostics {
    /// A zeroed counter pair.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            deallocations: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_allocation(&self) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deallocation(&self) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads both counters.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let diagnostics = Diagnostics::new();
        assert_eq!(
            diagnostics.snapshot(),
            DiagnosticsSnapshot {
                allocations: 0,
                deallocations: 0
            }
        );
    }

    #[test]
    fn counters_increment_independently() {
        let diagnostics = Diagnostics::new();
        diagnostics.record_allocation();
        diagnostics.record_allocation();
        diagnostics.record_deallocation();
        assert_eq!(
            diagnostics.snapshot(),
            DiagnosticsSnapshot {
                allocations: 2,
                deallocations: 1
            }
        );
    }
}
