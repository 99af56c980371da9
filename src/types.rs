//! Core identity and reporting types for the a3s-demux registry

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application error code sent when a buffered stream is reset because its
/// session was never established in time
///
/// Distinct from any normal stream-close code.
pub const BUFFERED_STREAM_REJECTED: u64 = 0x3994_bd84;

/// Identity of an underlying multiplexed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Session identifier, scoped to a single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Registry key: a session id is only unique within its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub connection: ConnectionId,
    pub session: SessionId,
}

impl SessionKey {
    pub fn new(connection: ConnectionId, session: SessionId) -> Self {
        Self {
            connection,
            session,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.connection, self.session)
    }
}

/// What the registry did with a routed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Session was established; the stream went straight to its intake
    Delivered,

    /// Session not established yet; a waiter task now holds the stream
    Buffered,

    /// Registry is shut down; the stream was dropped without an abort
    Dropped,
}

/// Point-in-time registry counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Records in the registry
    pub sessions: usize,

    /// Records with an attached session
    pub established_sessions: usize,

    /// Records still waiting for their announcement
    pub pending_sessions: usize,

    /// Streams parked behind pending sessions
    pub buffered_streams: usize,

    /// Connections registered for datagram fan-out
    pub connections: usize,

    /// Waiter and datagram tasks that have not finished yet
    pub tasks: usize,
}
