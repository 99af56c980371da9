//! Registry configuration
//!
//! Serialized as camelCase JSON so it can live next to the rest of an
//! endpoint's configuration.

use crate::error::{DemuxError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time a buffered stream waits for its session: 5 seconds
pub const DEFAULT_STREAM_TIMEOUT_MS: u64 = 5_000;

/// Configuration for a `SessionRegistry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    /// How long a stream that arrived before its session may wait, in milliseconds
    ///
    /// Every buffered stream gets the full window, counted from the moment
    /// it was routed.
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,
}

fn default_stream_timeout_ms() -> u64 {
    DEFAULT_STREAM_TIMEOUT_MS
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stream_timeout_ms: DEFAULT_STREAM_TIMEOUT_MS,
        }
    }
}

impl RegistryConfig {
    /// Set the buffered stream timeout
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Buffered stream timeout as a `Duration`
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    /// Check the configuration for values the registry cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.stream_timeout_ms == 0 {
            return Err(DemuxError::Config(
                "streamTimeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
