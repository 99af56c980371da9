//! Error types for a3s-demux

use thiserror::Error;

/// Errors that can occur while demultiplexing sessions
#[derive(Debug, Error)]
pub enum DemuxError {
    /// Underlying connection failed to deliver a datagram
    #[error("Connection error: {0}")]
    Connection(String),

    /// Underlying connection is closed
    #[error("Connection closed")]
    Closed,

    /// Not enough bytes to decode a variable-length integer
    #[error("Truncated varint: need {needed} bytes, {available} available")]
    Varint { needed: usize, available: usize },

    /// Value does not fit in a 62-bit variable-length integer
    #[error("Varint overflow: {0} exceeds 2^62 - 1")]
    VarintOverflow(u64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for demux operations
pub type Result<T> = std::result::Result<T, DemuxError>;
