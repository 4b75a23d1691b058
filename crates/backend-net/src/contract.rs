//! crates/backend-net/src/contract.rs
//!
//! The state machine and operation surface every network variant
//! shares (spec §4.G), grounded on `ConnectionState` and the
//! bind/connect/send/receive surface in
//! `original_source/include/alligator/buffer/asio_tcp_buffer.hpp`.

use std::sync::atomic::{AtomicU8, Ordering};

use buffer::contract::Buffer;
use buffer::endpoint::Endpoint;
use buffer::error::BufferError;
use buffer::receive::ReceiveDescriptor;

use crate::stats::NetworkStatsSnapshot;

/// A network buffer's connection lifecycle (spec §4.G).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Freshly constructed; no `bind`/`connect` issued yet.
    Idle = 0,
    /// `connect` in flight.
    Connecting = 1,
    /// `bind` in flight (transient — resolves to `Listening`).
    Binding = 2,
    /// Bound and accepting; the server path's terminal success state.
    Listening = 3,
    /// Connected; the client path's terminal success state.
    Ready = 4,
    /// An explicit close or peer FIN is being processed.
    Closing = 5,
    /// Fully torn down.
    Closed = 6,
    /// A fatal error ended the connection attempt or the connection.
    Failed = 7,
}

impl NetworkState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Binding,
            3 => Self::Listening,
            4 => Self::Ready,
            5 => Self::Closing,
            6 => Self::Closed,
            _ => Self::Failed,
        }
    }
}

/// The transition table of spec §4.G, plus the implicit
/// `Closing -> Closed` step that reaches the stated terminal state.
const fn is_allowed(from: NetworkState, to: NetworkState) -> bool {
    use NetworkState::{Binding, Closed, Closing, Connecting, Failed, Idle, Listening, Ready};
    if matches!(to, Failed) {
        return !matches!(from, Closed);
    }
    matches!(
        (from, to),
        (Idle, Connecting)
            | (Connecting, Ready)
            | (Idle, Binding)
            | (Binding, Listening)
            | (Ready, Closing)
            | (Listening, Closing)
            | (Closing, Closed)
    )
}

/// An atomic cell holding a [`NetworkState`], enforcing spec §4.G's
/// transition table on every write.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(NetworkState::Idle as u8))
    }

    pub(crate) fn get(&self) -> NetworkState {
        NetworkState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Attempts to move to `to`, retrying the CAS against the latest
    /// observed state until it succeeds or the transition is illegal.
    pub(crate) fn transition(&self, to: NetworkState) -> Result<(), BufferError> {
        loop {
            let current = self.get();
            if !is_allowed(current, to) {
                return Err(BufferError::InvalidState(format!(
                    "illegal network state transition {current:?} -> {to:?}"
                )));
            }
            if self
                .0
                .compare_exchange(current as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Force-sets the state without a transition check, used only to
    /// record a fatal I/O error observed mid-operation.
    pub(crate) fn force(&self, to: NetworkState) {
        self.0.store(to as u8, Ordering::Release);
    }
}

/// The operation surface every concrete network backend exposes
/// (spec §4.G), on top of [`Buffer`].
pub trait NetworkBuffer: Buffer {
    /// The buffer's current connection state.
    fn network_state(&self) -> NetworkState;

    /// Binds and begins listening at `endpoint` (precondition: `Idle`).
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidState`] outside `Idle`; I/O failures
    /// surface via `BufferError`'s `From<std::io::Error>` impl.
    fn bind(&self, endpoint: &Endpoint) -> Result<bool, BufferError>;

    /// Connects to `endpoint`, blocking until `Ready` or `Failed`
    /// (precondition: `Idle`).
    ///
    /// # Errors
    ///
    /// Same conditions as [`NetworkBuffer::bind`].
    fn connect(&self, endpoint: &Endpoint) -> Result<bool, BufferError>;

    /// Transmits `size` bytes from this buffer's own storage starting
    /// at `offset` (precondition: `Ready`).
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidState`] outside `Ready`;
    /// [`BufferError::OutOfRange`] if the range exceeds capacity.
    fn send(&self, offset: usize, size: usize) -> Result<i64, BufferError>;

    /// Copies up to `size` bytes of the next pending packet/stream into
    /// `[offset, offset + size)`, advancing `writer_frontier`
    /// (precondition: `Ready` or `Listening`).
    ///
    /// # Errors
    ///
    /// Same conditions as [`NetworkBuffer::send`].
    fn receive(&self, offset: usize, size: usize) -> Result<i64, BufferError>;

    /// Transmits directly from `other`'s storage without staging
    /// through this buffer (precondition: `Ready`).
    ///
    /// # Errors
    ///
    /// Same conditions as [`NetworkBuffer::send`].
    fn send_from(&self, other: &dyn Buffer, size: usize, src_offset: usize) -> Result<i64, BufferError>;

    /// Inverse of [`NetworkBuffer::send_from`]: receives directly into
    /// `other`'s storage (precondition: `Ready` or `Listening`).
    ///
    /// # Errors
    ///
    /// Same conditions as [`NetworkBuffer::send`].
    fn receive_into(&self, other: &dyn Buffer, size: usize, dst_offset: usize) -> Result<i64, BufferError>;

    /// Dequeues the next receive descriptor without blocking.
    fn get_rx(&self, size: usize) -> Option<ReceiveDescriptor>;

    /// Drives I/O progress for at most `timeout_ms`; returns the count
    /// of completed events.
    ///
    /// # Errors
    ///
    /// [`BufferError::OperationFailed`] on a fatal I/O error while
    /// polling.
    fn poll(&self, timeout_ms: u64) -> Result<usize, BufferError>;

    /// A read-only snapshot of this buffer's counters (spec §6.3).
    fn stats(&self) -> NetworkStatsSnapshot;

    /// The local address this buffer's listener or stream is bound to,
    /// once `bind`/`connect` has succeeded — e.g. to discover the
    /// ephemeral port the OS chose for a `:0` bind (spec §8 scenario 4:
    /// "discover port P"). `None` before `bind`/`connect`, or if the
    /// local address could not be queried.
    fn local_port(&self) -> Option<u16>;

    /// Initiates an explicit close, transitioning towards `Closed`.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use NetworkState::{Binding, Closed, Closing, Connecting, Failed, Idle, Listening, Ready};

    #[test]
    fn client_path_allows_idle_to_ready() {
        assert!(is_allowed(Idle, Connecting));
        assert!(is_allowed(Connecting, Ready));
        assert!(is_allowed(Ready, Closing));
        assert!(is_allowed(Closing, Closed));
    }

    #[test]
    fn server_path_allows_idle_to_listening() {
        assert!(is_allowed(Idle, Binding));
        assert!(is_allowed(Binding, Listening));
        assert!(is_allowed(Listening, Closing));
    }

    #[test]
    fn failed_is_reachable_from_anything_but_closed() {
        assert!(is_allowed(Connecting, Failed));
        assert!(is_allowed(Ready, Failed));
        assert!(!is_allowed(Closed, Failed));
    }

    #[test]
    fn connecting_cannot_jump_straight_to_listening() {
        assert!(!is_allowed(Connecting, Listening));
    }

    #[test]
    fn state_cell_rejects_illegal_transition() {
        let cell = StateCell::new();
        assert!(matches!(
            cell.transition(NetworkState::Ready),
            Err(BufferError::InvalidState(_))
        ));
        assert_eq!(cell.get(), NetworkState::Idle);
    }

    #[test]
    fn state_cell_walks_the_client_path() {
        let cell = StateCell::new();
        cell.transition(NetworkState::Connecting).unwrap();
        cell.transition(NetworkState::Ready).unwrap();
        assert_eq!(cell.get(), NetworkState::Ready);
    }
}
