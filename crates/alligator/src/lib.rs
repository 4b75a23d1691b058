#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `alligator` is the public facade: one [`Alligator`] handle wires a
//! [`registry::Fabric`] to its [`registry::Reclaimer`] and dispatches
//! `allocate*` calls to the concrete backend crate a caller's
//! [`buffer::flags::BackendKind`] names (spec §4.H/§6.5).
//!
//! # Design
//!
//! Every `allocate_*` method follows the same shape: build the concrete
//! backend type, stash an extra typed [`std::sync::Arc`] clone in a
//! `OnceLock` owned by the call itself, then hand the
//! `Arc<dyn Buffer>` coercion to [`registry::Fabric::allocate`] for
//! registration. The `OnceLock` lets the method return the
//! capability-bearing type (`Arc<dyn backend_net::NetworkBuffer>`,
//! `Arc<dyn backend_gpu::GpuBuffer>`, or a concrete struct) instead of
//! just `Arc<dyn Buffer>`, without widening `Fabric::allocate`'s own
//! signature or adding downcasting to the core `Buffer` trait.
//!
//! # Invariants
//!
//! - [`Alligator::allocate`] only ever constructs backends that take no
//!   arguments beyond a capacity (spec §6.5): `Heap`, `Gpu`, and the
//!   four network kinds. `FileBacked` and `Shared` need a path or a
//!   segment name and are refused with
//!   [`error::AlligatorError::WrongConstructor`].
//! - [`Alligator::shutdown`] is idempotent: a second call is a no-op.
//!
//! # Examples
//!
//! ```
//! use alligator::{Alligator, FabricConfig};
//! use buffer::flags::BackendKind;
//!
//! let fabric = Alligator::init(FabricConfig::default());
//! let buffer = fabric.allocate(BackendKind::Heap, 64).unwrap();
//! assert_eq!(buffer.capacity(), 64);
//! fabric.clear_buffer(buffer.id()).unwrap();
//! fabric.shutdown();
//! ```
//!
//! # See also
//!
//! - `registry` for the directory and background reclamation this
//!   facade drives.
//! - `backend-heap`, `backend-mmap`, `backend-shared`, `backend-gpu`,
//!   `backend-net` for the concrete backends dispatched to here.

pub mod config;
pub mod error;

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use buffer::contract::Buffer;
use buffer::flags::BackendKind;
use buffer::id::BufferId;

use registry::{DiagnosticsSnapshot, Fabric, Reclaimer};

use backend_gpu::{GpuBuffer, SimulatedGpuBuffer};
use backend_heap::HeapBuffer;
use backend_mmap::MmapBuffer;
use backend_net::{NetworkBuffer, QuicBuffer, TcpBuffer, ThunderboltBuffer, UdpBuffer};
use backend_shared::SharedBuffer;

pub use config::{FabricConfig, GpuConfig, NetworkConfig};
pub use error::{AlligatorError, AlligatorResult};

/// One process-wide buffer fabric: a [`registry::Fabric`] plus the
/// [`registry::Reclaimer`] thread that walks it (spec §4.H/§4.I).
///
/// Construct with [`Alligator::init`]; the returned `Arc<Alligator>` is
/// the handle every caller shares. Dropping the last `Arc` stops the
/// Reclaimer thread but does not deallocate outstanding buffers — call
/// [`Alligator::shutdown`] for the full teardown sequence.
pub struct Alligator {
    fabric: Arc<Fabric>,
    reclaimer: Mutex<Option<Reclaimer>>,
    config: FabricConfig,
}

impl Alligator {
    /// Builds a fabric sized by `config.max_buffer_bit` and spawns its
    /// Reclaimer on `config.gc_interval` (spec §4.I step 1).
    #[must_use]
    pub fn init(config: FabricConfig) -> Arc<Self> {
        let fabric = Arc::new(Fabric::new(config.clamped_max_buffer_bit()));
        let reclaimer = Reclaimer::spawn(Arc::clone(&fabric), config.gc_interval);
        Arc::new(Self {
            fabric,
            reclaimer: Mutex::new(Some(reclaimer)),
            config,
        })
    }

    /// This instance's configuration, as passed to [`Alligator::init`].
    #[must_use]
    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    /// Allocates `size` bytes on `kind`'s backend (spec §6.5).
    ///
    /// Covers every backend kind whose constructor needs nothing beyond
    /// a capacity. For `FileBacked` use
    /// [`Alligator::allocate_file_backed`]; for `Shared` use
    /// [`Alligator::allocate_shared`] or [`Alligator::attach_shared`].
    ///
    /// # Errors
    ///
    /// [`AlligatorError::WrongConstructor`] for `FileBacked`/`Shared`;
    /// otherwise propagates the backend's own construction failure or
    /// [`buffer::error::BufferError::OutOfMemory`] (an exhausted id space).
    pub fn allocate(&self, kind: BackendKind, size: usize) -> AlligatorResult<Arc<dyn Buffer>> {
        match kind {
            BackendKind::Heap => Ok(self.fabric.allocate(|id| {
                HeapBuffer::new(id, size).map(|buffer| buffer as Arc<dyn Buffer>)
            })?),
            BackendKind::Gpu => {
                let memory_type = self.config.gpu.memory_type;
                Ok(self.fabric.allocate(|id| {
                    SimulatedGpuBuffer::new(id, size, memory_type).map(|buffer| buffer as Arc<dyn Buffer>)
                })?)
            }
            BackendKind::Tcp => Ok(self.fabric.allocate(|id| {
                TcpBuffer::new(id, size).map(|buffer| buffer as Arc<dyn Buffer>)
            })?),
            BackendKind::Udp => Ok(self.fabric.allocate(|id| {
                UdpBuffer::new(id, size).map(|buffer| buffer as Arc<dyn Buffer>)
            })?),
            BackendKind::Quic => Ok(self.fabric.allocate(|id| {
                QuicBuffer::new(id, size).map(|buffer| buffer as Arc<dyn Buffer>)
            })?),
            BackendKind::Thunderbolt => Ok(self.fabric.allocate(|id| {
                ThunderboltBuffer::new(id, size).map(|buffer| buffer as Arc<dyn Buffer>)
            })?),
            BackendKind::FileBacked => Err(AlligatorError::WrongConstructor(
                "BackendKind::FileBacked (use allocate_file_backed)",
            )),
            BackendKind::Shared => Err(AlligatorError::WrongConstructor(
                "BackendKind::Shared (use allocate_shared/attach_shared)",
            )),
        }
    }

    /// Allocates a heap buffer, returning the concrete
    /// [`backend_heap::HeapBuffer`] rather than just [`Buffer`] — e.g.
    /// so a caller can drive [`chain::reserve_with_chain`] directly
    /// against it.
    ///
    /// # Errors
    ///
    /// [`buffer::error::BufferError::InvalidArgument`] for `size == 0`,
    /// or [`buffer::error::BufferError::OutOfMemory`] (an exhausted id space).
    pub fn allocate_heap(&self, size: usize) -> AlligatorResult<Arc<HeapBuffer>> {
        let holder: Arc<OnceLock<Arc<HeapBuffer>>> = Arc::new(OnceLock::new());
        let holder_for_construct = Arc::clone(&holder);
        self.fabric.allocate(move |id| {
            let concrete = HeapBuffer::new(id, size)?;
            let _ = holder_for_construct.set(Arc::clone(&concrete));
            Ok(concrete as Arc<dyn Buffer>)
        })?;
        Ok(Arc::clone(
            holder.get().expect("construct ran synchronously inside Fabric::allocate"),
        ))
    }

    /// Allocates a file-mapped buffer over `path` (spec §4.D).
    ///
    /// # Errors
    ///
    /// Propagates I/O failures opening, sizing, or mapping `path`, or
    /// [`buffer::error::BufferError::OutOfMemory`] (an exhausted id space).
    pub fn allocate_file_backed(&self, path: impl AsRef<Path>, size: usize) -> AlligatorResult<Arc<MmapBuffer>> {
        let holder: Arc<OnceLock<Arc<MmapBuffer>>> = Arc::new(OnceLock::new());
        let holder_for_construct = Arc::clone(&holder);
        let path = path.as_ref().to_path_buf();
        self.fabric.allocate(move |id| {
            let mapped = MmapBuffer::create(id, &path, size)?;
            let _ = holder_for_construct.set(Arc::clone(&mapped));
            Ok(mapped as Arc<dyn Buffer>)
        })?;
        Ok(Arc::clone(
            holder.get().expect("construct ran synchronously inside Fabric::allocate"),
        ))
    }

    /// Creates a fresh named shared-memory segment, or an anonymous one
    /// if `name` is `None` (spec §4.E).
    ///
    /// # Errors
    ///
    /// Propagates I/O failures creating or mapping the segment, or
    /// [`buffer::error::BufferError::OutOfMemory`] (an exhausted id space).
    pub fn allocate_shared(&self, name: Option<String>, size: usize) -> AlligatorResult<Arc<SharedBuffer>> {
        let holder: Arc<OnceLock<Arc<SharedBuffer>>> = Arc::new(OnceLock::new());
        let holder_for_construct = Arc::clone(&holder);
        self.fabric.allocate(move |id| {
            let shared = SharedBuffer::create(id, name, size)?;
            let _ = holder_for_construct.set(Arc::clone(&shared));
            Ok(shared as Arc<dyn Buffer>)
        })?;
        Ok(Arc::clone(
            holder.get().expect("construct ran synchronously inside Fabric::allocate"),
        ))
    }

    /// Attaches to an existing named shared-memory segment (spec §4.E
    /// `attach`).
    ///
    /// # Errors
    ///
    /// [`buffer::error::BufferError::InvalidState`] on a capacity
    /// mismatch with the segment's recorded size; propagates I/O
    /// failures, or [`buffer::error::BufferError::OutOfMemory`] (an exhausted id space).
    pub fn attach_shared(&self, name: impl Into<String>, size: usize) -> AlligatorResult<Arc<SharedBuffer>> {
        let name = name.into();
        let holder: Arc<OnceLock<Arc<SharedBuffer>>> = Arc::new(OnceLock::new());
        let holder_for_construct = Arc::clone(&holder);
        self.fabric.allocate(move |id| {
            let shared = SharedBuffer::attach(id, name, size)?;
            let _ = holder_for_construct.set(Arc::clone(&shared));
            Ok(shared as Arc<dyn Buffer>)
        })?;
        Ok(Arc::clone(
            holder.get().expect("construct ran synchronously inside Fabric::allocate"),
        ))
    }

    /// Allocates `size` bytes on one of the four network backends,
    /// returning the shared [`backend_net::NetworkBuffer`] capability
    /// rather than just [`Buffer`] (spec §4.G).
    ///
    /// # Errors
    ///
    /// [`AlligatorError::WrongConstructor`] if `kind` is not a network
    /// kind; otherwise the backend's own construction failure or
    /// [`buffer::error::BufferError::OutOfMemory`] (an exhausted id space).
    pub fn allocate_network(&self, kind: BackendKind, size: usize) -> AlligatorResult<Arc<dyn NetworkBuffer>> {
        if !kind.is_network() {
            return Err(AlligatorError::WrongConstructor(
                "allocate_network only accepts Tcp/Udp/Quic/Thunderbolt",
            ));
        }
        let holder: Arc<OnceLock<Arc<dyn NetworkBuffer>>> = Arc::new(OnceLock::new());
        let holder_for_construct = Arc::clone(&holder);
        self.fabric.allocate(move |id| {
            let (as_buffer, as_network): (Arc<dyn Buffer>, Arc<dyn NetworkBuffer>) = match kind {
                BackendKind::Tcp => {
                    let concrete = TcpBuffer::new(id, size)?;
                    (concrete.clone() as Arc<dyn Buffer>, concrete as Arc<dyn NetworkBuffer>)
                }
                BackendKind::Udp => {
                    let concrete = UdpBuffer::new(id, size)?;
                    (concrete.clone() as Arc<dyn Buffer>, concrete as Arc<dyn NetworkBuffer>)
                }
                BackendKind::Quic => {
                    let concrete = QuicBuffer::new(id, size)?;
                    (concrete.clone() as Arc<dyn Buffer>, concrete as Arc<dyn NetworkBuffer>)
                }
                BackendKind::Thunderbolt => {
                    let concrete = ThunderboltBuffer::new(id, size)?;
                    (concrete.clone() as Arc<dyn Buffer>, concrete as Arc<dyn NetworkBuffer>)
                }
                _ => unreachable!("kind.is_network() already filtered non-network kinds"),
            };
            let _ = holder_for_construct.set(as_network);
            Ok(as_buffer)
        })?;
        Ok(Arc::clone(
            holder.get().expect("construct ran synchronously inside Fabric::allocate"),
        ))
    }

    /// Allocates a GPU buffer, returning the [`backend_gpu::GpuBuffer`]
    /// capability rather than just [`Buffer`] (spec §4.F).
    ///
    /// Defaults `memory_type` to [`Alligator::config`]'s
    /// `gpu.memory_type` when `memory_type` is `None`.
    ///
    /// # Errors
    ///
    /// Propagates the backend's own construction failure or
    /// [`buffer::error::BufferError::OutOfMemory`] (an exhausted id space).
    pub fn allocate_gpu(
        &self,
        size: usize,
        memory_type: Option<backend_gpu::MemoryType>,
    ) -> AlligatorResult<Arc<dyn GpuBuffer>> {
        let memory_type = memory_type.unwrap_or(self.config.gpu.memory_type);
        let holder: Arc<OnceLock<Arc<dyn GpuBuffer>>> = Arc::new(OnceLock::new());
        let holder_for_construct = Arc::clone(&holder);
        self.fabric.allocate(move |id| {
            let concrete = SimulatedGpuBuffer::new(id, size, memory_type)?;
            let as_buffer = concrete.clone() as Arc<dyn Buffer>;
            let _ = holder_for_construct.set(concrete as Arc<dyn GpuBuffer>);
            Ok(as_buffer)
        })?;
        Ok(Arc::clone(
            holder.get().expect("construct ran synchronously inside Fabric::allocate"),
        ))
    }

    /// Looks up a buffer by id (spec §4.H `get_buffer`).
    #[must_use]
    pub fn get_buffer(&self, id: BufferId) -> Option<Arc<dyn Buffer>> {
        self.fabric.get_buffer(id)
    }

    /// Marks a buffer's slot eligible for reclamation (spec §4.H
    /// `clear_buffer`).
    ///
    /// # Errors
    ///
    /// [`registry::RegistryError::UnknownId`] if `id` does not name a
    /// live slot.
    pub fn clear_buffer(&self, id: BufferId) -> AlligatorResult<()> {
        Ok(self.fabric.clear_buffer(id)?)
    }

    /// A snapshot of the allocation/deallocation counters (spec §6.1
    /// diagnostics).
    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.fabric.diagnostics()
    }

    /// Stops the Reclaimer thread and deallocates every still-live
    /// buffer regardless of retirement (spec §4.I "Shutdown").
    /// Idempotent: a second call observes the Reclaimer already taken
    /// and does nothing.
    pub fn shutdown(&self) {
        if let Some(reclaimer) = self.reclaimer.lock().expect("reclaimer mutex poisoned").take() {
            reclaimer.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn heap_allocate_then_get_buffer_round_trips() {
        let fabric = Alligator::init(FabricConfig::default());
        let buffer = fabric.allocate(BackendKind::Heap, 32).unwrap();
        let id = buffer.id();
        assert!(fabric.get_buffer(id).is_some());
        fabric.shutdown();
    }

    #[test]
    fn file_backed_requires_dedicated_constructor() {
        let fabric = Alligator::init(FabricConfig::default());
        let err = fabric.allocate(BackendKind::FileBacked, 32).unwrap_err();
        assert!(matches!(err, AlligatorError::WrongConstructor(_)));
        fabric.shutdown();
    }

    #[test]
    fn shared_requires_dedicated_constructor() {
        let fabric = Alligator::init(FabricConfig::default());
        let err = fabric.allocate(BackendKind::Shared, 32).unwrap_err();
        assert!(matches!(err, AlligatorError::WrongConstructor(_)));
        fabric.shutdown();
    }

    #[test]
    fn allocate_file_backed_returns_usable_mmap_buffer() {
        let fabric = Alligator::init(FabricConfig::default());
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.bin");
        let mapped = fabric.allocate_file_backed(&path, 4096).unwrap();
        mapped.clear(0x11).unwrap();
        assert_eq!(mapped.span(0, 4).unwrap().as_slice(), &[0x11; 4]);
        fabric.shutdown();
    }

    #[test]
    fn allocate_shared_then_attach_shared_see_the_same_segment() {
        let fabric = Alligator::init(FabricConfig::default());
        let creator = fabric.allocate_shared(None, 4096).unwrap();
        let name = creator.name().to_owned();
        let attached = fabric.attach_shared(name, 4096).unwrap();
        assert_eq!(attached.capacity(), creator.capacity());
        fabric.shutdown();
    }

    #[test]
    fn allocate_network_rejects_non_network_kind() {
        let fabric = Alligator::init(FabricConfig::default());
        let err = fabric.allocate_network(BackendKind::Heap, 32).unwrap_err();
        assert!(matches!(err, AlligatorError::WrongConstructor(_)));
        fabric.shutdown();
    }

    #[test]
    fn allocate_network_tcp_returns_network_capability() {
        let fabric = Alligator::init(FabricConfig::default());
        let tcp = fabric.allocate_network(BackendKind::Tcp, 64).unwrap();
        assert_eq!(tcp.network_state(), backend_net::NetworkState::Idle);
        fabric.shutdown();
    }

    #[test]
    fn allocate_gpu_returns_gpu_capability() {
        let fabric = Alligator::init(FabricConfig::default());
        let gpu = fabric.allocate_gpu(64, None).unwrap();
        gpu.upload(&[1, 2, 3], 0).unwrap();
        let mut out = [0u8; 3];
        gpu.download(&mut out, 0).unwrap();
        assert_eq!(out, [1, 2, 3]);
        fabric.shutdown();
    }

    #[test]
    fn clear_buffer_then_reclaim_eventually_frees_it() {
        let fabric = Alligator::init(FabricConfig {
            gc_interval: std::time::Duration::from_millis(2),
            ..FabricConfig::default()
        });
        let buffer = fabric.allocate(BackendKind::Heap, 16).unwrap();
        let id = buffer.id();
        drop(buffer);
        fabric.clear_buffer(id).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(fabric.get_buffer(id).is_none());
        fabric.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let fabric = Alligator::init(FabricConfig::default());
        fabric.shutdown();
        fabric.shutdown();
    }

    #[test]
    fn unknown_id_clear_reports_error() {
        let fabric = Alligator::init(FabricConfig::default());
        let other = Alligator::init(FabricConfig::default());
        let buffer = other.allocate(BackendKind::Heap, 8).unwrap();
        let err = fabric.clear_buffer(buffer.id()).unwrap_err();
        assert!(matches!(err, AlligatorError::Registry(registry::RegistryError::UnknownId)));
        fabric.shutdown();
        other.shutdown();
    }
}
