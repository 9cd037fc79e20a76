//! Capped history bucketing by time proximity.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sensorwatch_types::{HistoryPoint, MeasurementKind};

/// Default maximum number of history points kept per sensor.
pub const DEFAULT_HISTORY_CAP: usize = 120;

/// Default window within which readings share a history point.
pub const DEFAULT_MERGE_TOLERANCE: Duration = Duration::from_millis(2000);

/// What happened to a reading offered to [`HistoryBuckets::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Folded into an existing point that had no value of this kind yet.
    Merged,
    /// Started a new point.
    Appended,
    /// A matching point already carries this kind; the reading was skipped.
    Duplicate,
    /// No matching point and the cap is reached.
    Dropped,
}

/// A capped set of history points keyed by time proximity.
///
/// Readings are offered newest first. A reading lands in the first point whose
/// anchor is within the merge tolerance (inclusive) of its own timestamp. The
/// anchor is the timestamp of the reading that created the point and never
/// moves; the reported timestamp is the earliest reading merged into it. Once
/// `cap` points exist, readings that match no point are dropped, so the newest
/// data survives.
///
/// Lookup is a linear scan, which is fine at the default cap. Everything goes
/// through [`HistoryBuckets::find`], so an indexed structure can replace it.
#[derive(Debug, Clone)]
pub struct HistoryBuckets {
    cap: usize,
    tolerance_ms: i64,
    buckets: Vec<Bucket>,
}

#[derive(Debug, Clone)]
struct Bucket {
    anchor: DateTime<Utc>,
    point: HistoryPoint,
}

impl HistoryBuckets {
    /// Create an empty set with the given cap and merge tolerance.
    pub fn new(cap: usize, tolerance: Duration) -> Self {
        Self {
            cap,
            tolerance_ms: i64::try_from(tolerance.as_millis()).unwrap_or(i64::MAX),
            buckets: Vec::with_capacity(cap.min(DEFAULT_HISTORY_CAP)),
        }
    }

    /// Offer one reading.
    pub fn insert(&mut self, kind: MeasurementKind, value: f64, timestamp: DateTime<Utc>) -> Merge {
        if let Some(index) = self.find(timestamp) {
            let point = &mut self.buckets[index].point;
            if point.get(kind).is_some() {
                return Merge::Duplicate;
            }
            point.set(kind, value);
            if timestamp < point.timestamp {
                point.timestamp = timestamp;
            }
            return Merge::Merged;
        }

        if self.buckets.len() >= self.cap {
            return Merge::Dropped;
        }

        let mut point = HistoryPoint::at(timestamp);
        point.set(kind, value);
        self.buckets.push(Bucket {
            anchor: timestamp,
            point,
        });
        Merge::Appended
    }

    /// Index of the bucket whose anchor is within tolerance of `timestamp`.
    fn find(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        self.buckets.iter().position(|bucket| {
            (bucket.anchor - timestamp).num_milliseconds().abs() <= self.tolerance_ms
        })
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Consume the buckets, returning points ordered by timestamp ascending.
    pub fn into_sorted(self) -> Vec<HistoryPoint> {
        let mut points: Vec<HistoryPoint> =
            self.buckets.into_iter().map(|bucket| bucket.point).collect();
        points.sort_by_key(|point| point.timestamp);
        points
    }
}

impl Default for HistoryBuckets {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAP, DEFAULT_MERGE_TOLERANCE)
    }
}
