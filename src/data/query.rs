//! Reading store query service.
//!
//! Turns raw readings from a trailing window into per-sensor snapshots: the
//! latest value per kind plus a capped, time-bucketed history.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sensorwatch_types::{
    LatestValue, Reading, ReadingSummary, SensorSnapshot, SensorsResponse, SnapshotMap,
};

use super::duration::format_duration;
use super::history::{HistoryBuckets, DEFAULT_HISTORY_CAP, DEFAULT_MERGE_TOLERANCE};
use crate::error::{Error, Result};
use crate::store::ReadingStore;

/// Default trailing window for queries.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 3600);

/// Tunables for snapshot construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    /// How far back readings are considered.
    pub window: Duration,
    /// Maximum history points per sensor.
    pub history_cap: usize,
    /// Readings closer than this share one history point.
    pub merge_tolerance: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            history_cap: DEFAULT_HISTORY_CAP,
            merge_tolerance: DEFAULT_MERGE_TOLERANCE,
        }
    }
}

/// Accumulates one sensor's snapshot from readings offered newest first.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    snapshot: SensorSnapshot,
    buckets: HistoryBuckets,
}

impl SnapshotBuilder {
    pub fn new(options: &QueryOptions) -> Self {
        Self {
            snapshot: SensorSnapshot::default(),
            buckets: HistoryBuckets::new(options.history_cap, options.merge_tolerance),
        }
    }

    /// Offer the next (older or equal) reading.
    ///
    /// The first reading of each kind becomes the latest value and is never
    /// replaced afterwards.
    pub fn add(&mut self, reading: &Reading) {
        if self.snapshot.latest(reading.kind).is_none() {
            self.snapshot
                .set_latest(reading.kind, LatestValue::from(reading));
        }
        self.buckets
            .insert(reading.kind, reading.value, reading.timestamp);
    }

    /// Finish the snapshot with history ordered ascending.
    pub fn build(self) -> SensorSnapshot {
        let mut snapshot = self.snapshot;
        snapshot.history = self.buckets.into_sorted();
        snapshot
    }
}

/// Build snapshots for every sensor present in `readings`.
///
/// Input order does not matter; readings are scanned newest first.
pub fn build_snapshots(mut readings: Vec<Reading>, options: &QueryOptions) -> SnapshotMap {
    readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut builders: BTreeMap<String, SnapshotBuilder> = BTreeMap::new();
    for reading in &readings {
        builders
            .entry(reading.sensor_id.clone())
            .or_insert_with(|| SnapshotBuilder::new(options))
            .add(reading);
    }

    builders
        .into_iter()
        .map(|(sensor_id, builder)| (sensor_id, builder.build()))
        .collect()
}

/// Queries a [`ReadingStore`] and shapes the result for the dashboard.
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<dyn ReadingStore>,
    options: QueryOptions,
}

impl QueryService {
    pub fn new(store: Arc<dyn ReadingStore>, options: QueryOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn description(&self) -> &str {
        self.store.description()
    }

    /// Query with the configured window.
    pub async fn query(&self) -> Result<SensorsResponse> {
        self.query_window(self.options.window).await
    }

    /// Query readings newer than `now - window`.
    pub async fn query_window(&self, window: Duration) -> Result<SensorsResponse> {
        let as_of = Utc::now();
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|span| as_of.checked_sub_signed(span))
            .ok_or_else(|| {
                Error::QueryFailed(format!("window out of range: {}", format_duration(window)))
            })?;

        let readings = self.store.readings_since(cutoff).await?;
        let count = readings.len();
        let sensors = build_snapshots(readings, &self.options);

        tracing::debug!(
            "Query over {} ({}): {} readings, {} sensors",
            self.store.description(),
            format_duration(window),
            count,
            sensors.len()
        );

        Ok(SensorsResponse {
            timestamp: as_of,
            sensors,
        })
    }

    /// Per (sensor, kind) count and value range over the whole store.
    pub async fn summary(&self) -> Result<Vec<ReadingSummary>> {
        self.store.summary().await
    }
}
