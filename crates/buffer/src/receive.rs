//! crates/buffer/src/receive.rs
//!
//! The receive descriptor enqueued by ingress handlers on network buffers
//! (spec §3.3), grounded on `AsioTcpBuffer::RxPacket` in
//! `asio_tcp_buffer.hpp`, extended with the optional sender endpoint the
//! spec's data model calls for.

use crate::endpoint::Endpoint;

/// `(offset, size, optional sender)` recording one ingress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveDescriptor {
    /// Byte offset within the owning buffer where the payload starts.
    pub offset: usize,
    /// Payload length in bytes.
    pub size: usize,
    /// The endpoint the datagram arrived from, when the transport
    /// exposes one (always `None` for stream transports such as TCP).
    pub sender: Option<Endpoint>,
}

impl ReceiveDescriptor {
    /// Builds a descriptor with no known sender (the common TCP case).
    #[must_use]
    pub const fn new(offset: usize, size: usize) -> Self {
        Self {
            offset,
            size,
            sender: None,
        }
    }

    /// Builds a descriptor carrying the sender's endpoint (the common
    /// UDP/QUIC case).
    #[must_use]
    pub fn with_sender(offset: usize, size: usize, sender: Endpoint) -> Self {
        Self {
            offset,
            size,
            sender: Some(sender),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_has_no_sender() {
        let descriptor = ReceiveDescriptor::new(0, 5);
        assert!(descriptor.sender.is_none());
    }

    #[test]
    fn with_sender_carries_endpoint() {
        use crate::endpoint::{Endpoint, NetworkTransport};
        let endpoint = Endpoint::new("10.0.0.1", 4242, NetworkTransport::Udp);
        let descriptor = ReceiveDescriptor::with_sender(4, 8, endpoint.clone());
        assert_eq!(descriptor.sender, Some(endpoint));
    }
}
