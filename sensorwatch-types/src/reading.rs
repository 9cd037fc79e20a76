//! Raw readings as recorded by the ingestion side.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};

/// The kind of measurement a reading carries.
///
/// The lowercase name is what appears in MQTT topics
/// (`sensors/{id}/temperature`) and in the store's `sensor_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MeasurementKind {
    Temperature,
    Humidity,
}

impl MeasurementKind {
    /// All kinds, in display order.
    pub const ALL: [MeasurementKind; 2] = [MeasurementKind::Temperature, MeasurementKind::Humidity];

    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKind::Temperature => "temperature",
            MeasurementKind::Humidity => "humidity",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known measurement kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown measurement kind: {:?}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for MeasurementKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(MeasurementKind::Temperature),
            "humidity" => Ok(MeasurementKind::Humidity),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// A single measurement from one sensor.
///
/// Readings are immutable facts: the core only ever reads them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Sensor identifier, as it appears in the topic.
    pub sensor_id: String,
    /// What was measured.
    pub kind: MeasurementKind,
    /// Measured value.
    pub value: f64,
    /// Unit string reported by the sensor (e.g. "°C", "%"). May be empty.
    pub unit: String,
    /// When the sensor took the measurement.
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Create a new reading.
    pub fn new(
        sensor_id: impl Into<String>,
        kind: MeasurementKind,
        value: f64,
        unit: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            kind,
            value,
            unit: unit.into(),
            timestamp,
        }
    }
}
