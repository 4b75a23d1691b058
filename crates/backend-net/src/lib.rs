#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `backend-net` implements the network buffer state machine shared by
//! every transport variant (spec §4.G): bind/connect, send/receive,
//! zero-copy buffer-to-buffer transfer, the per-buffer receive queue,
//! and connection statistics. [`contract::NetworkBuffer`] is the
//! operation surface; [`core::NetCore`] is the field set and plumbing
//! every concrete backend embeds rather than duplicates.
//!
//! Four concrete backends build on that shared skeleton:
//! [`tcp::TcpBuffer`], [`udp::UdpBuffer`], [`quic::QuicBuffer`] (stream
//! multiplexing over a UDP socket), and [`thunderbolt::ThunderboltBuffer`]
//! (spec §4.G: "behaviourally identical to TCP" with a fixed
//! optimisation profile and interface-preference hint).
//!
//! # Design
//!
//! `NetCore` owns staging storage, the connection state machine
//! ([`contract::NetworkState`]), statistics, and the receive queue.
//! Each concrete backend adds only its transport-specific socket
//! handles and `Buffer`/`NetworkBuffer`/`Chainable` impls that mostly
//! delegate straight through to `NetCore`, the way
//! `asio_tcp_buffer.hpp`/`asio_udp_buffer.hpp` in the original shared a
//! base class instead of duplicating bookkeeping per transport.
//!
//! # Invariants
//!
//! - Every concrete backend enforces spec §4.G's transition table via
//!   [`contract::NetworkState`]/`StateCell` before any I/O is attempted.
//! - The receive queue policy is drop-newest with a `drops` counter
//!   (spec §4.G "Receive queue").
//! - A chain successor starts with its own empty receive queue; queues
//!   are local to each link (documented Open Question resolution, see
//!   `DESIGN.md`).
//!
//! # Errors
//!
//! [`buffer::error::BufferError::InvalidState`] for an operation
//! attempted outside its required state; I/O failures surface via
//! `BufferError`'s `From<std::io::Error>` impl.
//!
//! # See also
//!
//! - `buffer` for the `Buffer` trait every backend here implements.
//! - `chain` for the protocol each backend's `Chainable` impl plugs
//!   into once its storage fills.

pub mod contract;
pub(crate) mod core;
pub mod quic;
pub mod rx_queue;
pub mod stats;
pub mod tcp;
pub mod thunderbolt;
pub mod udp;
mod xfer;

pub use contract::{NetworkBuffer, NetworkState};
pub use quic::QuicBuffer;
pub use stats::NetworkStatsSnapshot;
pub use tcp::TcpBuffer;
pub use thunderbolt::ThunderboltBuffer;
pub use udp::UdpBuffer;
