//! SQLite-backed reading store.
//!
//! Readings live in a single `sensor_readings` table:
//!
//! ```text
//! id | sensor_name | sensor_type | value | unit | timestamp | received_at
//! ```
//!
//! The query side opens a fresh connection per call so a store file that
//! appears or disappears between polls is picked up without a restart.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sensorwatch_types::{MeasurementKind, Reading, ReadingSummary};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{ConnectOptions, Connection};

use super::timestamp::{format_timestamp, parse_timestamp};
use super::{ReadingSink, ReadingStore};
use crate::error::{Error, Result};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sensor_readings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sensor_name TEXT NOT NULL,
        sensor_type TEXT NOT NULL,
        value REAL NOT NULL,
        unit TEXT NOT NULL,
        timestamp DATETIME NOT NULL,
        received_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_timestamp ON sensor_readings(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_sensor_name ON sensor_readings(sensor_name)",
];

const READINGS_SINCE: &str = "
    SELECT sensor_name, sensor_type, CAST(value AS REAL), unit, CAST(timestamp AS TEXT)
    FROM sensor_readings
    WHERE julianday(timestamp) > julianday(?)
    ORDER BY julianday(timestamp) DESC";

const SUMMARY: &str = "
    SELECT sensor_name, sensor_type, COUNT(*),
           CAST(MIN(value) AS REAL), CAST(MAX(value) AS REAL), CAST(AVG(value) AS REAL)
    FROM sensor_readings
    GROUP BY sensor_name, sensor_type
    ORDER BY sensor_name, sensor_type";

const INSERT: &str = "
    INSERT INTO sensor_readings (sensor_name, sensor_type, value, unit, timestamp)
    VALUES (?, ?, ?, ?, ?)";

type ReadingRow = (String, String, f64, String, String);
type SummaryRow = (String, String, i64, f64, f64, f64);

/// Read-only view of a SQLite reading store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    description: String,
}

impl SqliteStore {
    /// Create a store for the database at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let description = format!("sqlite: {}", path.display());
        Self { path, description }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<SqliteConnection> {
        if !self.path.exists() {
            return Err(Error::StoreUnavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(false)
            .disable_statement_logging();

        let conn = options
            .connect()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("{}: {}", self.path.display(), e)))?;
        Ok(conn)
    }
}

#[async_trait]
impl ReadingStore for SqliteStore {
    async fn readings_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reading>> {
        let mut conn = self.open().await?;

        let rows: std::result::Result<Vec<ReadingRow>, sqlx::Error> =
            sqlx::query_as(READINGS_SINCE)
                .bind(format_timestamp(cutoff))
                .fetch_all(&mut conn)
                .await;
        let _ = conn.close().await;
        let rows = rows.map_err(query_failed)?;

        let mut readings = Vec::with_capacity(rows.len());
        for (sensor_id, kind, value, unit, timestamp) in rows {
            let Ok(kind) = kind.parse::<MeasurementKind>() else {
                tracing::debug!("Skipping reading with unknown kind {:?}", kind);
                continue;
            };
            let timestamp = parse_timestamp(&timestamp)?;
            readings.push(Reading {
                sensor_id,
                kind,
                value,
                unit,
                timestamp,
            });
        }

        Ok(readings)
    }

    async fn summary(&self) -> Result<Vec<ReadingSummary>> {
        let mut conn = self.open().await?;

        let rows: std::result::Result<Vec<SummaryRow>, sqlx::Error> =
            sqlx::query_as(SUMMARY).fetch_all(&mut conn).await;
        let _ = conn.close().await;
        let rows = rows.map_err(query_failed)?;

        let summary = rows
            .into_iter()
            .filter_map(|(sensor_id, kind, count, min, max, avg)| {
                let kind = kind.parse::<MeasurementKind>().ok()?;
                Some(ReadingSummary {
                    sensor_id,
                    kind,
                    count: count.max(0) as u64,
                    min,
                    max,
                    avg,
                })
            })
            .collect();

        Ok(summary)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

fn query_failed(err: sqlx::Error) -> Error {
    Error::QueryFailed(err.to_string())
}

/// Write side of the SQLite store, used by the ingestor.
///
/// Creates the database file and schema on first use.
#[derive(Debug, Clone)]
pub struct SqliteWriter {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteWriter {
    /// Open (or create) the database at `path` and make sure the schema exists.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::StoreUnavailable(format!("{}: {}", path.display(), e)))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| Error::WriteFailed(format!("schema setup: {}", e)))?;
        }

        tracing::info!("Reading store ready at {}", path.display());
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ReadingSink for SqliteWriter {
    async fn record(&self, reading: &Reading) -> Result<()> {
        sqlx::query(INSERT)
            .bind(&reading.sensor_id)
            .bind(reading.kind.as_str())
            .bind(reading.value)
            .bind(&reading.unit)
            .bind(format_timestamp(reading.timestamp))
            .execute(&self.pool)
            .await
            .map_err(|e| Error::WriteFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_714_564_800 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_is_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("sensor_data.db"));

        let err = store.readings_since(ts(0)).await.unwrap_err();
        assert!(err.is_store_unavailable(), "got {:?}", err);

        let err = store.summary().await.unwrap_err();
        assert!(err.is_store_unavailable());
    }

    #[tokio::test]
    async fn test_write_then_read_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor_data.db");

        let writer = SqliteWriter::create(&path).await.unwrap();
        for (offset, value) in [(0, 20.0), (60, 21.0), (120, 22.0)] {
            let reading = Reading::new("greenhouse", MeasurementKind::Temperature, value, "°C", ts(offset));
            writer.record(&reading).await.unwrap();
        }
        writer
            .record(&Reading::new("greenhouse", MeasurementKind::Humidity, 55.0, "%", ts(90)))
            .await
            .unwrap();
        writer.close().await;

        let store = SqliteStore::new(&path);
        let readings = store.readings_since(ts(30)).await.unwrap();

        let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![22.0, 55.0, 21.0]);
        assert_eq!(readings[0].unit, "°C");
        assert_eq!(readings[0].timestamp, ts(120));
        assert_eq!(readings[1].kind, MeasurementKind::Humidity);
    }

    #[tokio::test]
    async fn test_reads_naive_timestamps_and_skips_unknown_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor_data.db");
        let writer = SqliteWriter::create(&path).await.unwrap();

        for (kind, stamp) in [
            ("temperature", "2024-05-01T12:05:00.500000"),
            ("pressure", "2024-05-01T12:06:00"),
            ("humidity", "2024-05-01 12:07:00"),
        ] {
            sqlx::query(INSERT)
                .bind("attic")
                .bind(kind)
                .bind(1.0)
                .bind("")
                .bind(stamp)
                .execute(&writer.pool)
                .await
                .unwrap();
        }
        writer.close().await;

        let readings = SqliteStore::new(&path).readings_since(ts(0)).await.unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].kind, MeasurementKind::Humidity);
        assert_eq!(readings[0].timestamp, ts(7 * 60));
        assert_eq!(readings[1].timestamp.timestamp_subsec_millis(), 500);
    }

    #[tokio::test]
    async fn test_summary_per_sensor_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensor_data.db");
        let writer = SqliteWriter::create(&path).await.unwrap();

        for (sensor, kind, value) in [
            ("b", MeasurementKind::Temperature, 10.0),
            ("a", MeasurementKind::Humidity, 40.0),
            ("a", MeasurementKind::Temperature, 18.0),
            ("a", MeasurementKind::Temperature, 22.0),
        ] {
            writer
                .record(&Reading::new(sensor, kind, value, "", ts(0)))
                .await
                .unwrap();
        }
        writer.close().await;

        let summary = SqliteStore::new(&path).summary().await.unwrap();
        let keys: Vec<_> = summary
            .iter()
            .map(|s| (s.sensor_id.as_str(), s.kind))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a", MeasurementKind::Humidity),
                ("a", MeasurementKind::Temperature),
                ("b", MeasurementKind::Temperature),
            ]
        );

        let a_temp = &summary[1];
        assert_eq!(a_temp.count, 2);
        assert_eq!(a_temp.min, 18.0);
        assert_eq!(a_temp.max, 22.0);
        assert_eq!(a_temp.avg, 20.0);
    }
}
