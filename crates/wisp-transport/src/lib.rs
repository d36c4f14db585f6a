//! # WISP Transport
//!
//! Message channel layer for the WISP protocol.
//!
//! This crate provides:
//! - The [`Transport`] trait: open a named local endpoint, dial a remote one
//! - Reliable, ordered, message-framed [`Connection`]s between two peers
//! - [`MemoryNetwork`], an in-process network used by tests and embedding
//! - [`TcpTransport`], length-prefixed frames over TCP

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod tcp;
pub mod transport;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::TcpTransport;
pub use transport::{Connection, FrameSink, Listener, Transport, TransportError, TransportResult};

/// Peer identifier as understood by the transport in use
pub type PeerId = String;

/// Largest frame accepted on a connection (64 MiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;
