//! In-memory reading store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sensorwatch_types::{MeasurementKind, Reading, ReadingSummary};

use super::{ReadingSink, ReadingStore};
use crate::error::{Error, Result};

/// A reading store held entirely in memory.
///
/// Used by tests and by embedders that keep readings in process. It can be
/// switched to "unavailable" to exercise the store-missing path.
#[derive(Debug)]
pub struct MemoryStore {
    readings: RwLock<Vec<Reading>>,
    available: AtomicBool,
    description: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            description: "memory".to_string(),
        }
    }

    /// Create a store pre-filled with readings.
    pub fn with_readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        let store = Self::new();
        store.readings.write().extend(readings);
        store
    }

    /// Append a reading without going through the async sink.
    pub fn push(&self, reading: Reading) {
        self.readings.write().push(reading);
    }

    /// Make subsequent reads fail with `StoreUnavailable` (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.readings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.read().is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn readings_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reading>> {
        self.check_available()?;

        let mut selected: Vec<Reading> = self
            .readings
            .read()
            .iter()
            .filter(|reading| reading.timestamp > cutoff)
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(selected)
    }

    async fn summary(&self) -> Result<Vec<ReadingSummary>> {
        self.check_available()?;

        // Keyed by kind name so the order matches the SQLite store.
        let mut groups: BTreeMap<(String, &'static str), (MeasurementKind, Vec<f64>)> =
            BTreeMap::new();
        for reading in self.readings.read().iter() {
            groups
                .entry((reading.sensor_id.clone(), reading.kind.as_str()))
                .or_insert_with(|| (reading.kind, Vec::new()))
                .1
                .push(reading.value);
        }

        Ok(groups
            .into_iter()
            .map(|((sensor_id, _), (kind, values))| {
                let count = values.len() as u64;
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let avg = values.iter().sum::<f64>() / values.len() as f64;
                ReadingSummary {
                    sensor_id,
                    kind,
                    count,
                    min,
                    max,
                    avg,
                }
            })
            .collect())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[async_trait]
impl ReadingSink for MemoryStore {
    async fn record(&self, reading: &Reading) -> Result<()> {
        self.check_available()
            .map_err(|err| Error::WriteFailed(err.to_string()))?;
        self.push(reading.clone());
        Ok(())
    }
}
