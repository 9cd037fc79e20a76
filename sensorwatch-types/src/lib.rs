//! # sensorwatch-types
//!
//! Core types for environmental sensor dashboards. This crate defines the
//! shapes shared between the reading store, the query layer, the status feed
//! and anything that renders the result.
//!
//! ## Design Goals
//!
//! - **Immutable facts**: a [`Reading`] is never modified once recorded
//! - **Chart-ready output**: [`SensorSnapshot`] carries the latest value per
//!   kind plus an ordered [`HistoryPoint`] series
//! - **Optional serialization**: enable the `serde` feature for JSON
//!
//! ## Features
//!
//! - `serde`: serialization via serde (timestamps as RFC 3339 strings)
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use sensorwatch_types::{LatestValue, MeasurementKind, Reading, SensorSnapshot};
//!
//! let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
//! let reading = Reading::new("greenhouse", MeasurementKind::Temperature, 21.5, "°C", at);
//!
//! let mut snapshot = SensorSnapshot::default();
//! snapshot.set_latest(reading.kind, LatestValue::from(&reading));
//!
//! assert_eq!(snapshot.latest(MeasurementKind::Temperature).unwrap().value, 21.5);
//! assert!(snapshot.latest(MeasurementKind::Humidity).is_none());
//! ```

mod reading;
mod snapshot;
mod status;
mod summary;
mod view;

pub use reading::*;
pub use snapshot::*;
pub use status::*;
pub use summary::*;
pub use view::*;

/// Re-exported so downstream crates agree on the timestamp type.
pub use chrono::{DateTime, Utc};
