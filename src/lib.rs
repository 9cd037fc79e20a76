//! # sensorwatch
//!
//! Backend for a live environmental sensor dashboard.
//!
//! Sensor readings (temperature, humidity) are recorded in SQLite by an MQTT
//! ingestor; online/offline status arrives separately on an MQTT status feed.
//! This crate queries the store on a fixed cadence, follows the status feed,
//! and reconciles both into one record per sensor.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           server                             │
//! │        /sensors   /sensors/summary   /dashboard   /health    │
//! └──────┬───────────────────────────────────────┬───────────────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐   PollState    ┌──────────────────────────────┐
//! │ QueryService│◀──── poller ──▶│ app  (reconcile on demand)   │
//! │   (data)    │                └──────────────┬───────────────┘
//! └──────┬──────┘                               │ Arc<StatusMap>
//!        │                                      │ LinkState
//!        ▼                              ┌───────┴───────┐
//! ┌─────────────┐  record  ┌────────┐   │  StatusFeed   │
//! │ ReadingStore│◀─────────│ ingest │   │    (feed)     │
//! │   (store)   │          └───┬────┘   └───────┬───────┘
//! └─────────────┘              │                │
//!                      sensors/+/temperature  sensors/+/status
//!                      sensors/+/humidity
//! ```
//!
//! - **[`data`]**: snapshot construction ([`QueryService`], [`HistoryBuckets`])
//!   and [`reconcile`]
//! - **[`store`]**: the [`ReadingStore`] trait with SQLite and in-memory
//!   implementations
//! - **[`feed`]**: the reconnecting MQTT connection and the [`StatusFeed`]
//! - **[`poller`]**: runs the query service on an interval
//! - **[`app`]**: owns the live sources and produces the [`DashboardView`]
//! - **[`ingest`]**: records reading messages into the store
//! - **[`server`]**: the axum router
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Serve the dashboard API on 0.0.0.0:3000
//! sensorwatch --store sensor_data.db serve
//!
//! # One-shot query of the last 6 hours
//! sensorwatch query --window 6h
//!
//! # Fill the store from the broker
//! sensorwatch --config sensorwatch.toml ingest
//! ```
//!
//! ### As a library
//!
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use sensorwatch::{MeasurementKind, MemoryStore, QueryOptions, QueryService, Reading};
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::with_readings(vec![
//!     Reading::new("greenhouse", MeasurementKind::Temperature, 21.5, "°C", Utc::now()),
//! ]);
//! let service = QueryService::new(Arc::new(store), QueryOptions::default());
//!
//! let response = service.query().await.unwrap();
//! assert_eq!(response.sensors["greenhouse"].history.len(), 1);
//! # });
//! ```
//!
//! ### Reconciling status with snapshots
//!
//! ```
//! use sensorwatch::{reconcile, LastUpdatePolicy, SensorStatus, SnapshotMap, StatusMap};
//!
//! let statuses = StatusMap::from([("attic".to_string(), SensorStatus::Online)]);
//! let views = reconcile(&statuses, &SnapshotMap::new(), LastUpdatePolicy::default());
//!
//! assert!(views["attic"].status.is_online());
//! assert!(views["attic"].last_update.is_none());
//! ```

pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod poller;
pub mod server;
pub mod store;

// Re-export main types for convenience
pub use app::{App, DashboardView};
pub use config::Settings;
pub use data::{
    build_snapshots, reconcile, HistoryBuckets, LastUpdatePolicy, QueryOptions, QueryService,
};
pub use error::{Error, Result};
pub use feed::{Connectivity, FeedConfig, LinkState, MqttConnection, StatusFeed};
pub use ingest::Ingestor;
pub use poller::{PollState, Poller, PollerHandle};
pub use store::{MemoryStore, ReadingSink, ReadingStore, SqliteStore, SqliteWriter};

pub use sensorwatch_types::{
    HistoryPoint, LatestValue, MeasurementKind, Reading, ReadingSummary, ReconciledSensorView,
    SensorSnapshot, SensorStatus, SensorsResponse, SnapshotMap, StatusMap,
};
