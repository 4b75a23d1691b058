//! crates/buffer/src/error.rs
//!
//! Error kinds shared by every layer of the fabric (spec §7).

use thiserror::Error;

/// Result alias used throughout the fabric crates.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors the core must distinguish (spec §7).
///
/// Construction errors propagate to the caller and never leave a
/// half-registered registry slot. Run-time errors on individual backend
/// operations are reported through their return value and an error
/// counter; they never abort the process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The allocator or the OS refused to hand out memory.
    #[error("out of memory")]
    OutOfMemory,
    /// An argument was invalid for this operation, e.g. capacity 0 or an
    /// unknown backend kind.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An offset or length violated the buffer's capacity.
    #[error("out of range")]
    OutOfRange,
    /// The operation is not permitted in the current state, e.g. `send`
    /// before `Ready`, or `clear` on a pinned buffer.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// `get_buffer(id)` decoded to a slot that is empty or id-mismatched.
    #[error("buffer not found")]
    NotFound,
    /// A generic I/O or device failure.
    #[error("operation failed: {0}")]
    OperationFailed(String),
    /// A bounded wait expired.
    #[error("operation timed out")]
    Timeout,
    /// The backend is unavailable on this platform.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// A producer requested more bytes than a chain can supply without
    /// exceeding the registry's capacity.
    #[error("buffer chain overflow")]
    BufferOverflow,
}

impl From<std::io::Error> for BufferError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut => Self::Timeout,
            ErrorKind::InvalidInput | ErrorKind::InvalidData => {
                Self::InvalidArgument(err.to_string())
            }
            ErrorKind::Unsupported => Self::NotSupported(err.to_string()),
            _ => Self::OperationFailed(err.to_string()),
        }
    }
}
