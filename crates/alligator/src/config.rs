//! crates/alligator/src/config.rs
//!
//! The configuration surface spec §6.4 asks the core to consume:
//! `MAX_BUFFER_BIT` (build-time, here runtime-configured for
//! testability), `GC_INTERVAL_MS`, and the per-network/per-GPU option
//! bundles each backend records rather than interprets.

use std::time::Duration;

use buffer::endpoint::NetworkOptimization;
use buffer::id::{DEFAULT_MAX_BUFFER_BIT, MAX_MAX_BUFFER_BIT, MIN_MAX_BUFFER_BIT};
use registry::DEFAULT_GC_INTERVAL;

use backend_gpu::MemoryType;

/// Top-level configuration for one [`crate::Alligator`] instance (spec
/// §6.4).
#[derive(Debug, Clone)]
pub struct FabricConfig {
    /// Width, in bits, of the registry's slot-index field; clamped into
    /// `[10, 30]` by [`registry::fabric::Fabric::new`] (spec §6.4).
    pub max_buffer_bit: u32,
    /// How often the Reclaimer walks the registry (spec §4.I step 1:
    /// "recommended 1-10 ms").
    pub gc_interval: Duration,
    /// Default settings new network buffers are configured with.
    pub network: NetworkConfig,
    /// Default settings new GPU buffers are configured with.
    pub gpu: GpuConfig,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            max_buffer_bit: DEFAULT_MAX_BUFFER_BIT,
            gc_interval: DEFAULT_GC_INTERVAL,
            network: NetworkConfig::default(),
            gpu: GpuConfig::default(),
        }
    }
}

impl FabricConfig {
    /// Clamps [`FabricConfig::max_buffer_bit`] into the spec's accepted
    /// range (spec §6.4: "10-30 inclusive").
    #[must_use]
    pub fn clamped_max_buffer_bit(&self) -> u32 {
        self.max_buffer_bit.clamp(MIN_MAX_BUFFER_BIT, MAX_MAX_BUFFER_BIT)
    }
}

/// Default settings a network buffer is configured with at allocation
/// time (spec §6.4 "for network backends").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Optimisation profile new endpoints default to absent an explicit
    /// override.
    pub optimization: NetworkOptimization,
    /// Whether 0-RTT is enabled on new QUIC buffers.
    pub zero_rtt: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            optimization: NetworkOptimization::Throughput,
            zero_rtt: false,
        }
    }
}

/// Default settings a GPU buffer is configured with at allocation time
/// (spec §6.4 "for GPU backends").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuConfig {
    /// Which simulated device id new buffers are attributed to; purely
    /// descriptive since only one simulated backend exists (see
    /// `DESIGN.md`).
    pub device_id: u32,
    /// Memory type `BackendKind::Gpu` resolves to absent an explicit
    /// override.
    pub memory_type: MemoryType,
    /// Whether newly allocated GPU buffers should eagerly `sync` after
    /// construction. Recorded for API parity with the original; this
    /// crate's simulated backend has no prefetch to perform.
    pub prefetch_on_allocate: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            memory_type: MemoryType::Unified,
            prefetch_on_allocate: false,
        }
    }
}
