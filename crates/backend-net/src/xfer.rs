//! crates/backend-net/src/xfer.rs
//!
//! The raw-pointer write path `send_from`/`receive_into` use to reach
//! into a caller-supplied `other` buffer without widening the
//! object-safe [`Buffer`] trait with a generic or mutable-write method
//! (spec §4.A `data()` is exactly this "directly-dereferenceable
//! pointer iff local" escape hatch).

use std::sync::atomic::Ordering;

use buffer::contract::Buffer;
use buffer::error::BufferError;
use buffer::span::resolve_span;

/// Copies `bytes` into `buf` at `offset` through its `data_ptr`,
/// advancing `buf`'s writer frontier to cover the written range.
///
/// # Errors
///
/// [`BufferError::NotSupported`] if `buf` is not host-local;
/// [`BufferError::OutOfRange`] if the destination range exceeds
/// capacity; [`BufferError::InvalidState`] if `buf` has been
/// deallocated.
pub(crate) fn write_bytes_at(buf: &dyn Buffer, offset: usize, bytes: &[u8]) -> Result<usize, BufferError> {
    if !buf.is_local() {
        return Err(BufferError::NotSupported(
            "destination buffer is not host-local".to_owned(),
        ));
    }
    let (offset, length) = resolve_span(buf.capacity(), offset, bytes.len())?;
    let ptr = buf
        .data_ptr()
        .ok_or_else(|| BufferError::InvalidState("buffer deallocated".to_owned()))?;
    // SAFETY: `resolve_span` guarantees `offset + length <= capacity`,
    // and `data_ptr` is documented to stay valid for `capacity` bytes
    // until the next deallocate/mapping operation.
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr().add(offset), length);
    }
    buf.frontier_cell()
        .fetch_max((offset + length) as usize, Ordering::AcqRel);
    Ok(length)
}
