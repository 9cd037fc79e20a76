//! Aggregate statistics over stored readings.

use crate::MeasurementKind;

/// Count and value range for one (sensor, kind) pair in the store.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadingSummary {
    pub sensor_id: String,
    pub kind: MeasurementKind,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}
