//! Topic layout: `sensors/{sensor_id}/{leaf}`.

use sensorwatch_types::MeasurementKind;

/// Subscription filter for status events.
pub const STATUS_TOPIC_FILTER: &str = "sensors/+/status";

/// Subscription filters for readings.
pub const READING_TOPIC_FILTERS: [&str; 2] = ["sensors/+/temperature", "sensors/+/humidity"];

const ROOT: &str = "sensors";
const STATUS_LEAF: &str = "status";

/// A parsed `sensors/{id}/{leaf}` topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorTopic<'a> {
    pub sensor_id: &'a str,
    pub leaf: &'a str,
}

impl<'a> SensorTopic<'a> {
    /// Split a topic into sensor id and leaf.
    ///
    /// Returns `None` unless the topic has exactly three non-empty segments
    /// under the `sensors` root.
    pub fn parse(topic: &'a str) -> Option<Self> {
        let mut parts = topic.split('/');
        let (root, sensor_id, leaf) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || root != ROOT || sensor_id.is_empty() || leaf.is_empty() {
            return None;
        }
        Some(Self { sensor_id, leaf })
    }

    pub fn is_status(&self) -> bool {
        self.leaf == STATUS_LEAF
    }

    /// The measurement kind named by the leaf, if any.
    pub fn kind(&self) -> Option<MeasurementKind> {
        self.leaf.parse().ok()
    }
}
