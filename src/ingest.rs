//! Ingestion of reading messages into the store.
//!
//! Listens on `sensors/+/temperature` and `sensors/+/humidity`. Each payload is
//! JSON:
//!
//! ```json
//! {"value": 21.5, "unit": "°C", "timestamp": "2024-05-01T12:00:00"}
//! ```
//!
//! `unit` defaults to an empty string and `timestamp` to the time of receipt.
//! Messages that cannot be turned into a [`Reading`] are logged and skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sensorwatch_types::{Reading, ReadingSummary};
use serde::Deserialize;
use thiserror::Error;

use crate::error::Result;
use crate::feed::{FeedConfig, MqttConnection, SensorTopic, READING_TOPIC_FILTERS};
use crate::store::{parse_timestamp, ReadingSink, ReadingStore};

/// Why a message was not recorded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejected {
    #[error("unexpected topic format: {0}")]
    Topic(String),

    #[error("unknown measurement kind on {0}")]
    Kind(String),

    #[error("invalid JSON payload: {0}")]
    Json(String),

    #[error("no value in payload")]
    MissingValue,

    #[error("invalid timestamp: {0}")]
    Timestamp(String),
}

#[derive(Debug, Deserialize)]
struct ReadingPayload {
    value: Option<f64>,
    #[serde(default)]
    unit: String,
    timestamp: Option<String>,
}

/// Turn one message into a reading. `now` stamps payloads without a timestamp.
pub fn parse_reading(
    topic: &str,
    payload: &[u8],
    now: DateTime<Utc>,
) -> std::result::Result<Reading, Rejected> {
    let parsed = SensorTopic::parse(topic).ok_or_else(|| Rejected::Topic(topic.to_string()))?;
    let kind = parsed
        .kind()
        .ok_or_else(|| Rejected::Kind(topic.to_string()))?;

    let body: ReadingPayload =
        serde_json::from_slice(payload).map_err(|e| Rejected::Json(e.to_string()))?;
    let value = body.value.ok_or(Rejected::MissingValue)?;

    let timestamp = match body.timestamp.as_deref() {
        Some(raw) => parse_timestamp(raw).map_err(|_| Rejected::Timestamp(raw.to_string()))?,
        None => now,
    };

    Ok(Reading::new(parsed.sensor_id, kind, value, body.unit, timestamp))
}

/// One summary row as a log line.
pub fn format_summary_line(row: &ReadingSummary) -> String {
    format!(
        "{:15} {:11}: samples={:4} | min={:6.1} | max={:6.1} | avg={:6.1}",
        row.sensor_id,
        row.kind.as_str(),
        row.count,
        row.min,
        row.max,
        row.avg
    )
}

/// Records reading messages through a [`ReadingSink`].
#[derive(Debug)]
pub struct Ingestor {
    sink: Arc<dyn ReadingSink>,
    summary_source: Option<Arc<dyn ReadingStore>>,
    received: u64,
    stored: u64,
}

impl Ingestor {
    pub fn new(sink: Arc<dyn ReadingSink>) -> Self {
        Self {
            sink,
            summary_source: None,
            received: 0,
            stored: 0,
        }
    }

    /// Log a summary from `store` on every summary tick.
    pub fn with_summary(mut self, store: Arc<dyn ReadingStore>) -> Self {
        self.summary_source = Some(store);
        self
    }

    /// Messages seen so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Readings successfully recorded so far.
    pub fn stored(&self) -> u64 {
        self.stored
    }

    /// Handle one message, returning the reading if it was recorded.
    pub async fn handle(&mut self, topic: &str, payload: &[u8]) -> Option<Reading> {
        self.received += 1;

        let reading = match parse_reading(topic, payload, Utc::now()) {
            Ok(reading) => reading,
            Err(reason) => {
                tracing::warn!("Skipping message on {}: {}", topic, reason);
                return None;
            }
        };

        if let Err(e) = self.sink.record(&reading).await {
            tracing::error!("Failed to store reading from {}: {}", topic, e);
            return None;
        }

        self.stored += 1;
        tracing::info!(
            "[{:04}] {:15} | {:11} = {:6.1} {}",
            self.received,
            reading.sensor_id,
            reading.kind.as_str(),
            reading.value,
            reading.unit
        );
        Some(reading)
    }

    /// Log the per-sensor summary, if a summary source is attached.
    pub async fn log_summary(&self) {
        let Some(store) = &self.summary_source else {
            return;
        };

        match store.summary().await {
            Ok(rows) if rows.is_empty() => tracing::info!("No readings stored yet"),
            Ok(rows) => {
                tracing::info!("--- Reading summary ---");
                for row in &rows {
                    tracing::info!("  {}", format_summary_line(row));
                }
            }
            Err(e) => tracing::warn!("Could not summarise readings: {}", e),
        }
    }

    /// Subscribe to the reading topics and record messages until `shutdown`
    /// resolves. Returns the number of readings stored.
    pub async fn run(
        mut self,
        config: &FeedConfig,
        summary_interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> Result<u64> {
        let client_id = format!("{}-ingest", config.client_id);
        let (mut connection, mut publishes) =
            MqttConnection::open(config, &client_id, &READING_TOPIC_FILTERS)?;

        let mut summary_timer = tokio::time::interval(summary_interval);
        summary_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it.
        summary_timer.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                message = publishes.recv() => match message {
                    Some(publish) => {
                        self.handle(&publish.topic, &publish.payload).await;
                    }
                    None => break,
                },
                _ = summary_timer.tick() => self.log_summary().await,
            }
        }

        connection.close().await;
        tracing::info!("Total messages stored: {}", self.stored);
        Ok(self.stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::test_broker::TestBroker;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use sensorwatch_types::MeasurementKind;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_full_payload() {
        let reading = parse_reading(
            "sensors/greenhouse/temperature",
            br#"{"value": 21.5, "unit": "C", "timestamp": "2024-05-01T11:59:00"}"#,
            now(),
        )
        .unwrap();

        assert_eq!(reading.sensor_id, "greenhouse");
        assert_eq!(reading.kind, MeasurementKind::Temperature);
        assert_eq!(reading.value, 21.5);
        assert_eq!(reading.unit, "C");
        assert_eq!(reading.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 11, 59, 0).unwrap());
    }

    #[test]
    fn test_parse_defaults_unit_and_timestamp() {
        let reading = parse_reading("sensors/attic/humidity", br#"{"value": 40}"#, now()).unwrap();
        assert_eq!(reading.unit, "");
        assert_eq!(reading.timestamp, now());
        assert_eq!(reading.value, 40.0);
    }

    #[test]
    fn test_parse_rejections() {
        let cases: [(&str, &[u8], fn(&Rejected) -> bool); 5] = [
            ("sensors/a/b/temperature", br#"{"value": 1}"#, |r| matches!(r, Rejected::Topic(_))),
            ("sensors/a/pressure", br#"{"value": 1}"#, |r| matches!(r, Rejected::Kind(_))),
            ("sensors/a/temperature", b"not json", |r| matches!(r, Rejected::Json(_))),
            ("sensors/a/temperature", br#"{"unit": "C"}"#, |r| *r == Rejected::MissingValue),
            (
                "sensors/a/temperature",
                br#"{"value": 1, "timestamp": "later"}"#,
                |r| matches!(r, Rejected::Timestamp(_)),
            ),
        ];

        for (topic, payload, expected) in cases {
            let err = parse_reading(topic, payload, now()).unwrap_err();
            assert!(expected(&err), "{} gave {:?}", topic, err);
        }
    }

    #[tokio::test]
    async fn test_handle_records_valid_and_counts_all() {
        let store = Arc::new(MemoryStore::new());
        let mut ingestor = Ingestor::new(store.clone()).with_summary(store.clone());

        assert!(ingestor
            .handle("sensors/s1/temperature", br#"{"value": 20.0}"#)
            .await
            .is_some());
        assert!(ingestor.handle("sensors/s1/temperature", b"{}").await.is_none());
        assert!(ingestor
            .handle("sensors/s1/humidity", br#"{"value": 55.0, "unit": "%"}"#)
            .await
            .is_some());

        assert_eq!(ingestor.received(), 3);
        assert_eq!(ingestor.stored(), 2);
        assert_eq!(store.len(), 2);

        ingestor.log_summary().await;
    }

    #[tokio::test]
    async fn test_handle_write_failure_is_not_counted() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let mut ingestor = Ingestor::new(store.clone());

        assert!(ingestor
            .handle("sensors/s1/temperature", br#"{"value": 20.0}"#)
            .await
            .is_none());
        assert_eq!(ingestor.stored(), 0);
    }

    #[test]
    fn test_summary_line_layout() {
        let row = ReadingSummary {
            sensor_id: "greenhouse".to_string(),
            kind: MeasurementKind::Temperature,
            count: 12,
            min: 18.3,
            max: 24.0,
            avg: 21.5,
        };
        assert_eq!(
            format_summary_line(&row),
            "greenhouse      temperature: samples=  12 | min=  18.3 | max=  24.0 | avg=  21.5"
        );
    }

    #[tokio::test]
    async fn test_run_records_broker_messages_until_shutdown() {
        let wait = Duration::from_secs(5);
        let mut broker = TestBroker::start().await;
        let config = FeedConfig {
            url: broker.url().to_string(),
            ..FeedConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(store.clone());

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let run = tokio::spawn(async move {
            ingestor
                .run(&config, Duration::from_secs(60), async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut filters = vec![broker.next_subscription().await, broker.next_subscription().await];
        filters.sort();
        assert_eq!(filters, vec!["sensors/+/humidity", "sensors/+/temperature"]);

        broker.publish("sensors/attic/humidity", b"not json");
        broker.publish(
            "sensors/attic/temperature",
            br#"{"value": 19.5, "unit": "C", "timestamp": "2024-05-01T12:00:00"}"#,
        );
        tokio::time::timeout(wait, async {
            while store.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let _ = stop_tx.send(());
        let stored = run.await.unwrap().unwrap();
        assert_eq!(stored, 1);

        let readings = store.readings_since(now() - chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].sensor_id, "attic");
        assert_eq!(readings[0].kind, MeasurementKind::Temperature);
        assert_eq!(readings[0].value, 19.5);
        assert_eq!(readings[0].timestamp, now());
    }
}
