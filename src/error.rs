//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Every variant is recoverable: the rejected operation has no side effect.
/// A missing key is never an error, lookups report it as `None` or `false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache has been closed and rejects every operation
    #[error("cache is closed")]
    Closed,

    /// A state-gated operation was attempted while the cache is stopped
    #[error("cache is stopped, must be started before calling {0}()")]
    Stopped(&'static str),

    /// Purge was attempted while the cache is still serving traffic
    #[error("cache is started, must be stopped before calling purge()")]
    NotStopped,

    /// Telemetry was requested from a cache built with telemetry off
    #[error("cache telemetry is disabled")]
    TelemetryDisabled,

    /// The configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No tokio runtime was available to host the cleanup scheduler
    #[error("runtime unavailable: {0}")]
    Runtime(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(CacheError::Closed.to_string(), "cache is closed");
        assert_eq!(
            CacheError::Stopped("get").to_string(),
            "cache is stopped, must be started before calling get()"
        );
        assert_eq!(
            CacheError::NotStopped.to_string(),
            "cache is started, must be stopped before calling purge()"
        );
        assert_eq!(
            CacheError::InvalidConfig("shard_count must be at least 1".to_string()).to_string(),
            "invalid configuration: shard_count must be at least 1"
        );
    }
}
