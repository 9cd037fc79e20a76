//! Snapshot construction and reconciliation.
//!
//! ## Submodules
//!
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "2s", "24h")
//! - [`history`]: Capped, time-proximity history bucketing
//! - [`query`]: The query service that turns readings into snapshots
//! - [`reconcile`]: Merging live status with queried snapshots
//!
//! ## Data Flow
//!
//! ```text
//! ReadingStore::readings_since(now - window)
//!        │  (newest first)
//!        ▼
//! SnapshotBuilder::add()  ──▶  latest value per kind
//!        │
//!        └──▶ HistoryBuckets::insert()  (merge within tolerance, cap)
//!        │
//!        ▼
//! SnapshotMap ──┐
//!               ├──▶ reconcile() ──▶ ReconciledSensorView per sensor
//! StatusMap  ───┘
//! ```

pub mod duration;
pub mod history;
pub mod query;
pub mod reconcile;

pub use history::{HistoryBuckets, Merge};
pub use query::{build_snapshots, QueryOptions, QueryService, SnapshotBuilder};
pub use reconcile::{reconcile, LastUpdatePolicy};
