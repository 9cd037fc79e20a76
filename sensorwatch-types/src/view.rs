//! The reconciled per-sensor record served to the dashboard.

use chrono::{DateTime, Utc};

use crate::{HistoryPoint, LatestValue, SensorStatus};

/// Live status merged with the latest queried values for one sensor.
///
/// Recomputed on every read; never mutated in place.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReconciledSensorView {
    pub sensor_id: String,
    pub status: SensorStatus,

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

    #[cfg_attr(feature = "serde", serde(default))]
    pub history: Vec<HistoryPoint>,

    /// When the sensor last reported a value, if ever.
    pub last_update: Option<DateTime<Utc>>,
}
