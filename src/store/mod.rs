//! Reading store abstraction.
//!
//! The query side only ever reads through [`ReadingStore`]; the ingestion side
//! writes through [`ReadingSink`]. Two implementations ship with the crate:
//!
//! - [`SqliteStore`]: the persisted `sensor_readings` table (production)
//! - [`MemoryStore`]: an in-process store for tests and demos

mod memory;
mod sqlite;
mod timestamp;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SqliteWriter};
pub use timestamp::{format_timestamp, parse_timestamp};

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensorwatch_types::{Reading, ReadingSummary};

use crate::error::Result;

/// Read access to recorded sensor readings.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use sensorwatch::store::{MemoryStore, ReadingStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// let readings = store.readings_since(Utc::now() - Duration::hours(24)).await.unwrap();
/// assert!(readings.is_empty());
/// # });
/// ```
#[async_trait]
pub trait ReadingStore: Send + Sync + Debug {
    /// All readings with `timestamp > cutoff`, newest first.
    ///
    /// Fails with `StoreUnavailable` when the store cannot be opened and with
    /// `QueryFailed` for any other read or decode error.
    async fn readings_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reading>>;

    /// Count and value range per (sensor, kind), ordered by sensor id then kind name.
    async fn summary(&self) -> Result<Vec<ReadingSummary>>;

    /// Human-readable description, used in log lines.
    fn description(&self) -> &str;
}

/// Write access for the ingestion side.
#[async_trait]
pub trait ReadingSink: Send + Sync + Debug {
    /// Append one reading.
    async fn record(&self, reading: &Reading) -> Result<()>;
}
