//! crates/backend-net/src/stats.rs
//!
//! Per-buffer network statistics (spec §4.G "Per-buffer statistics",
//! §6.3), grounded on `AsioTcpBuffer::Stats`/`get_stats()` in
//! `original_source/include/alligator/buffer/asio_tcp_buffer.hpp`.

use std::sync::atomic::{AtomicU64, Ordering};

/// A read-only snapshot of the six monotonic counters (spec §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkStatsSnapshot {
    /// Total bytes handed to the transport for sending.
    pub bytes_sent: u64,
    /// Total bytes copied out of an ingress event.
    pub bytes_received: u64,
    /// Total successful `send`/`send_from` calls.
    pub packets_sent: u64,
    /// Total successful `receive`/`receive_into` calls.
    pub packets_received: u64,
    /// Total failed operations.
    pub errors: u64,
    /// Total receive descriptors dropped for a full queue.
    pub drops: u64,
}

/// The live counters backing a [`NetworkStatsSnapshot`]. Every update is
/// `Ordering::Relaxed` (spec §4.G: "monotonic counters with relaxed
/// atomic semantics") — these numbers are diagnostic, never used to
/// order memory.
#[derive(Debug, Default)]
pub(crate) struct NetworkStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    errors: AtomicU64,
    drops: AtomicU64,
}

impl NetworkStats {
    pub(crate) const fn new() -> Self {
        Self {
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_send(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_receive(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> NetworkStatsSnapshot {
        NetworkStatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stats_are_all_zero() {
        let stats = NetworkStats::new();
        assert_eq!(stats.snapshot(), NetworkStatsSnapshot::default());
    }

    #[test]
    fn record_send_updates_bytes_and_packets() {
        let stats = NetworkStats::new();
        stats.record_send(128);
        stats.record_send(64);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.bytes_sent, 192);
        assert_eq!(snapshot.packets_sent, 2);
    }

    #[test]
    fn record_drop_is_independent_of_errors() {
        let stats = NetworkStats::new();
        stats.record_drop();
        stats.record_error();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.drops, 1);
        assert_eq!(snapshot.errors, 1);
    }
}
