//! crates/registry/src/error.rs
//!
//! Registry-specific error kinds, layered over [`buffer::error::BufferError`]
//! (spec §7).

use thiserror::Error;

use buffer::error::BufferError;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors the registry can raise on top of a backend's own failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A backend's buffer contract was violated (construction failure,
    /// out-of-range span, an exhausted id space reported as
    /// [`BufferError::OutOfMemory`] per spec §7's closed error taxonomy,
    /// etc).
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// `get_buffer`/`clear_buffer` was asked for an id this registry
    /// never issued (wrong fabric instance, or corrupted wire value).
    #[error("buffer id not recognised by this registry")]
    UnknownId,
}
