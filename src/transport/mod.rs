//! Transport traits — the collaborators the registry routes between
//!
//! The connection substrate (a QUIC connection or anything with the same
//! shape) implements `Connection` and its stream types; the application's
//! established session implements `SessionHandle`. The registry never looks
//! inside streams and only reads the leading session id of datagrams.

use crate::error::Result;
use crate::types::ConnectionId;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

pub mod memory;

/// An underlying multiplexed connection hosting many sessions
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Incoming bidirectional stream type
    type BiStream: BiStream;

    /// Incoming unidirectional (receive-only) stream type
    type UniStream: UniStream;

    /// Stable identity of this connection for the lifetime of the registry
    fn id(&self) -> ConnectionId;

    /// Wait for the next datagram
    ///
    /// An error means the connection is failed or closing; the registry
    /// stops reading from it and does not retry.
    async fn recv_datagram(&self) -> Result<Bytes>;
}

/// A bidirectional stream that can be aborted in either direction
pub trait BiStream: Send + 'static {
    /// Stop reading, signalling `code` to the peer
    fn abort_read(&mut self, code: u64);

    /// Reset the sending side with `code`
    fn abort_write(&mut self, code: u64);
}

/// A receive-only stream
pub trait UniStream: Send + 'static {
    /// Stop reading, signalling `code` to the peer
    fn abort_read(&mut self, code: u64);
}

/// An established application session
///
/// Intake methods are called from registry tasks and from the caller of
/// `route_stream`; they must not block. Hand the work to a queue or task.
pub trait SessionHandle<C: Connection>: Send + Sync + 'static {
    /// Take ownership of a bidirectional stream for this session
    fn accept_bi(&self, stream: C::BiStream);

    /// Take ownership of a unidirectional stream for this session
    fn accept_uni(&self, stream: C::UniStream);

    /// Receive a datagram payload with the session id already stripped
    fn handle_datagram(&self, payload: Bytes);
}

/// Shared handle to an established session
pub type SessionRef<C> = Arc<dyn SessionHandle<C>>;
