//! crates/alligator/src/error.rs
//!
//! The facade's error type, layered over [`registry::RegistryError`]
//! (spec §7).

use thiserror::Error;

use buffer::error::BufferError;
use registry::RegistryError;

/// Result type for [`crate::Alligator`] operations.
pub type AlligatorResult<T> = Result<T, AlligatorError>;

/// Errors the facade can raise on top of the registry's own failures.
#[derive(Debug, Error)]
pub enum AlligatorError {
    /// Propagated from the registry (construction failure, unknown id;
    /// an exhausted id space arrives here as
    /// [`BufferError::OutOfMemory`]).
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Propagated directly from a backend's own buffer contract.
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// `allocate` was asked for a [`buffer::flags::BackendKind`] that
    /// needs extra construction arguments (a file path, a segment name)
    /// this entry point does not accept; use the backend-specific
    /// `allocate_*` method instead.
    #[error("{0} requires a dedicated allocate_* method, not allocate()")]
    WrongConstructor(&'static str),
}
