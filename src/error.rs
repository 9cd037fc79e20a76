//! Error types for the query, feed and configuration layers.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced across component boundaries.
///
/// Lower-level faults (SQLite, MQTT, JSON, timestamp parsing) are classified
/// into one of these variants where they happen, so callers never see a raw
/// driver error. The type is `Clone` so it can travel inside published state
/// alongside the last good value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The reading store could not be opened (missing file, no permission).
    #[error("reading store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store was open but reading or decoding its rows failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// The feed client could not be constructed at all.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The broker rejected a subscription.
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    /// The broker connection dropped or was refused; the connection retries.
    #[error("MQTT connection lost: {0}")]
    ConnectionLost(String),

    /// No connect acknowledgement arrived within the bounded wait.
    #[error("no connect acknowledgement within {0:?}")]
    ConnectionTimeout(Duration),

    /// A reading could not be written to the store.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Settings could not be loaded or are invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for the "store missing" case, which the HTTP layer maps to 404.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias for sensorwatch operations.
pub type Result<T> = std::result::Result<T, Error>;
