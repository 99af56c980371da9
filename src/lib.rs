//! # a3s-demux
//!
//! Session demultiplexing for stream-multiplexed transports in the A3S ecosystem.
//!
//! ## Overview
//!
//! A single connection (QUIC or anything shaped like it) carries many
//! sessions. Peers routinely open a stream for a session before the
//! handshake that establishes the session has been processed locally.
//! `a3s-demux` routes every incoming stream and datagram to its session,
//! buffers early streams for a bounded time, and releases each exactly once.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_demux::{RegistryConfig, RouteOutcome, SessionId, SessionRegistry};
//! use a3s_demux::transport::memory::{MemoryBiStream, MemoryConnection, MemorySession};
//!
//! # async fn example() -> a3s_demux::Result<()> {
//! let registry = SessionRegistry::new(RegistryConfig::default())?;
//! let conn = MemoryConnection::new();
//!
//! // A stream shows up before its session is known: it gets buffered
//! let (stream, _probe) = MemoryBiStream::new(0);
//! assert_eq!(registry.route_stream(&conn, SessionId(4), stream), RouteOutcome::Buffered);
//!
//! // The handshake completes and the buffered stream is released
//! let (session, mut events) = MemorySession::new();
//! registry.announce_session(&conn, SessionId(4), session);
//! let _delivered = events.recv().await;
//!
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **SessionRegistry** — the three routing entry points plus shutdown
//! - **Connection** / **BiStream** / **UniStream** traits — the connection substrate
//! - **SessionHandle** trait — an established application session
//! - **varint** — QUIC variable-length integers used to prefix datagrams

pub mod config;
pub mod error;
pub mod registry;
pub mod transport;
pub mod types;
pub mod varint;

// Re-export core types
pub use config::RegistryConfig;
pub use error::{DemuxError, Result};
pub use registry::SessionRegistry;
pub use transport::{BiStream, Connection, SessionHandle, SessionRef, UniStream};
pub use types::{
    ConnectionId, RegistryStats, RouteOutcome, SessionId, SessionKey, BUFFERED_STREAM_REJECTED,
};
