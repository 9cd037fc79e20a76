//! Snapshot - the per-sensor latest values and chartable history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{MeasurementKind, Reading};

/// The current value of one measurement kind for a sensor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LatestValue {
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Reading> for LatestValue {
    fn from(reading: &Reading) -> Self {
        Self {
            value: reading.value,
            unit: reading.unit.clone(),
            timestamp: reading.timestamp,
        }
    }
}

/// A time bucket in a sensor's history.
///
/// Readings of different kinds taken close together share one point, so a
/// point may carry a temperature, a humidity, or both.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,

    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub temperature: Option<f64>,

    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub humidity: Option<f64>,
}

impl HistoryPoint {
    /// Create an empty point at the given time.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            temperature: None,
            humidity: None,
        }
    }

    /// Get the value for a kind, if this point carries one.
    pub fn get(&self, kind: MeasurementKind) -> Option<f64> {
        match kind {
            MeasurementKind::Temperature => self.temperature,
            MeasurementKind::Humidity => self.humidity,
        }
    }

    /// Set the value for a kind.
    pub fn set(&mut self, kind: MeasurementKind, value: f64) {
        match kind {
            MeasurementKind::Temperature => self.temperature = Some(value),
            MeasurementKind::Humidity => self.humidity = Some(value),
        }
    }
}

/// Latest values plus history for one sensor.
///
/// Rebuilt from scratch on every query; never persisted.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorSnapshot {
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub temperature: Option<LatestValue>,

    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub humidity: Option<LatestValue>,

    /// History points, ordered by timestamp ascending.
    #[cfg_attr(feature = "serde", serde(default))]
    pub history: Vec<HistoryPoint>,
}

impl SensorSnapshot {
    /// Get the latest value for a kind.
    pub fn latest(&self, kind: MeasurementKind) -> Option<&LatestValue> {
        match kind {
            MeasurementKind::Temperature => self.temperature.as_ref(),
            MeasurementKind::Humidity => self.humidity.as_ref(),
        }
    }

    /// Replace the latest value for a kind.
    pub fn set_latest(&mut self, kind: MeasurementKind, value: LatestValue) {
        match kind {
            MeasurementKind::Temperature => self.temperature = Some(value),
            MeasurementKind::Humidity => self.humidity = Some(value),
        }
    }

    /// True when the snapshot has neither latest values nor history.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none() && self.history.is_empty()
    }
}

/// Snapshots keyed by sensor id.
pub type SnapshotMap = BTreeMap<String, SensorSnapshot>;

/// The result of one query over the reading store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorsResponse {
    /// When the query was evaluated.
    pub timestamp: DateTime<Utc>,
    /// Per-sensor snapshots.
    pub sensors: SnapshotMap,
}

impl SensorsResponse {
    /// Create an empty response as of the given instant.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            sensors: BTreeMap::new(),
        }
    }
}
