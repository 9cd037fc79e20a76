//! Reconciliation of live status with queried snapshots.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sensorwatch_types::{ReconciledSensorView, SensorSnapshot, SnapshotMap, StatusMap};

/// How the reconciled `last_update` is chosen when both kinds have a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LastUpdatePolicy {
    /// Temperature timestamp, falling back to humidity.
    #[default]
    PreferTemperature,
    /// The newer of the two timestamps.
    Latest,
}

impl LastUpdatePolicy {
    /// Pick the last-update instant for a snapshot.
    pub fn last_update(&self, snapshot: &SensorSnapshot) -> Option<DateTime<Utc>> {
        let temperature = snapshot.temperature.as_ref().map(|v| v.timestamp);
        let humidity = snapshot.humidity.as_ref().map(|v| v.timestamp);

        match self {
            LastUpdatePolicy::PreferTemperature => temperature.or(humidity),
            LastUpdatePolicy::Latest => temperature.max(humidity),
        }
    }
}

/// Merge the status map and the snapshot map into one record per sensor.
///
/// The result is keyed by the union of both inputs' ids. A sensor the feed has
/// not reported on is offline; a sensor with no readings in the window has
/// empty values and history.
pub fn reconcile(
    statuses: &StatusMap,
    snapshots: &SnapshotMap,
    policy: LastUpdatePolicy,
) -> BTreeMap<String, ReconciledSensorView> {
    let ids: BTreeSet<&String> = statuses.keys().chain(snapshots.keys()).collect();
    let empty = SensorSnapshot::default();

    ids.into_iter()
        .map(|id| {
            let status = statuses.get(id).copied().unwrap_or_default();
            let snapshot = snapshots.get(id).unwrap_or(&empty);

            let view = ReconciledSensorView {
                sensor_id: id.clone(),
                status,
                temperature: snapshot.temperature.clone(),
                humidity: snapshot.humidity.clone(),
                history: snapshot.history.clone(),
                last_update: policy.last_update(snapshot),
            };
            (id.clone(), view)
        })
        .collect()
}
