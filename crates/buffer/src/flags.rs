//! crates/buffer/src/flags.rs
//!
//! Backend flags (spec §3.1) and the backend-kind enumeration a caller
//! selects at allocation time (spec §6.5).

/// The three independent booleans fixed at a buffer's construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferFlags {
    /// CPU may dereference the buffer's bytes directly.
    pub local: bool,
    /// The buffer is backed by a memory-mapped file.
    pub file_backed: bool,
    /// The buffer is visible across process boundaries.
    pub shared: bool,
}

impl BufferFlags {
    /// Flags for a plain process-heap allocation.
    #[must_use]
    pub const fn heap() -> Self {
        Self {
            local: true,
            file_backed: false,
            shared: false,
        }
    }

    /// Flags for a memory-mapped file region.
    #[must_use]
    pub const fn file_mapped() -> Self {
        Self {
            local: true,
            file_backed: true,
            shared: false,
        }
    }

    /// Flags for a named cross-process segment.
    #[must_use]
    pub const fn shared_memory() -> Self {
        Self {
            local: true,
            file_backed: false,
            shared: true,
        }
    }

    /// Flags for a non-host-visible GPU allocation (device-local).
    #[must_use]
    pub const fn gpu_device_local() -> Self {
        Self {
            local: false,
            file_backed: false,
            shared: false,
        }
    }

    /// Flags for a host-visible or unified GPU allocation.
    #[must_use]
    pub const fn gpu_host_visible(unified: bool) -> Self {
        Self {
            local: true,
            file_backed: false,
            shared: unified,
        }
    }

    /// Flags for any network backend: network buffers are local staging
    /// storage, never file-backed or cross-process shared.
    #[must_use]
    pub const fn network() -> Self {
        Self {
            local: true,
            file_backed: false,
            shared: false,
        }
    }
}

/// The kind of backend the allocator should construct (spec §6.5).
///
/// `Gpu` is the only "auto" kind in this crate: concrete GPU vendor
/// bindings are out of scope (spec §1), so `Gpu` always resolves to the
/// one simulated backend `backend-gpu` ships (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Contiguous process-heap allocation.
    Heap,
    /// Memory-mapped file region.
    FileBacked,
    /// Named cross-process shared-memory segment.
    Shared,
    /// GPU-resident buffer (auto-resolves to the in-repo simulated
    /// device; see `DESIGN.md`).
    Gpu,
    /// TCP network buffer.
    Tcp,
    /// UDP network buffer.
    Udp,
    /// QUIC-like multiplexed network buffer.
    Quic,
    /// Thunderbolt-preferred TCP network buffer.
    Thunderbolt,
}

impl BackendKind {
    /// True for the four network backend kinds.
    #[must_use]
    pub const fn is_network(self) -> bool {
        matches!(
            self,
            Self::Tcp | Self::Udp | Self::Quic | Self::Thunderbolt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_flags_are_local_only() {
        let flags = BufferFlags::heap();
        assert!(flags.local);
        assert!(!flags.file_backed);
        assert!(!flags.shared);
    }

    #[test]
    fn gpu_device_local_is_not_local() {
        assert!(!BufferFlags::gpu_device_local().local);
    }

    #[test]
    fn gpu_unified_is_shared() {
        assert!(BufferFlags::gpu_host_visible(true).shared);
        assert!(!BufferFlags::gpu_host_visible(false).shared);
    }

    #[test]
    fn network_kinds_are_recognised() {
        assert!(BackendKind::Tcp.is_network());
        assert!(BackendKind::Thunderbolt.is_network());
        assert!(!BackendKind::Heap.is_network());
        assert!(!BackendKind::Gpu.is_network());
    }
}
