//! Status feed client.

use std::sync::Arc;
use std::time::Duration;

use sensorwatch_types::{SensorStatus, StatusMap};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::connection::{FeedConfig, LinkState, MqttConnection};
use super::topic::{SensorTopic, STATUS_TOPIC_FILTER};
use crate::error::Result;

/// Holds the last received status per sensor.
///
/// Every update replaces the whole map behind an `Arc`, so readers never see
/// a half-applied change. Arrival order wins; payload timestamps are not
/// consulted.
#[derive(Debug)]
pub struct StatusTracker {
    tx: watch::Sender<Arc<StatusMap>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(StatusMap::new()));
        Self { tx }
    }

    /// Subscribe to map replacements.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StatusMap>> {
        self.tx.subscribe()
    }

    /// The current map.
    pub fn statuses(&self) -> Arc<StatusMap> {
        self.tx.borrow().clone()
    }

    /// Record a status for a sensor, replacing any previous value.
    pub fn set(&self, sensor_id: &str, status: SensorStatus) {
        self.tx.send_modify(|map| {
            Arc::make_mut(map).insert(sensor_id.to_string(), status);
        });
    }

    /// Apply one inbound message. Returns false if it was ignored.
    pub fn apply(&self, topic: &str, payload: &[u8]) -> bool {
        let Some(parsed) = SensorTopic::parse(topic).filter(|t| t.is_status()) else {
            tracing::warn!("Ignoring message on unexpected topic {}", topic);
            return false;
        };

        let status = match std::str::from_utf8(payload).map(str::parse::<SensorStatus>) {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                tracing::warn!("Ignoring status for {}: {}", parsed.sensor_id, e);
                return false;
            }
            Err(_) => {
                tracing::warn!("Ignoring non UTF-8 status for {}", parsed.sensor_id);
                return false;
            }
        };

        tracing::debug!("{} is {}", parsed.sensor_id, status);
        self.set(parsed.sensor_id, status);
        true
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to `sensors/+/status`.
///
/// # Example
///
/// ```no_run
/// use sensorwatch::feed::{FeedConfig, StatusFeed};
///
/// # async fn run() -> sensorwatch::Result<()> {
/// let config = FeedConfig::default();
/// let mut feed = StatusFeed::connect(&config)?;
/// feed.wait_connected(config.connect_timeout).await?;
///
/// for (sensor, status) in feed.current().iter() {
///     println!("{sensor}: {status}");
/// }
/// feed.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StatusFeed {
    connection: MqttConnection,
    tracker: Arc<StatusTracker>,
    drain: Option<JoinHandle<()>>,
}

impl StatusFeed {
    /// Open a connection and start applying status events.
    ///
    /// Fails with `TransportUnavailable` if the client cannot be built. An
    /// unreachable broker is not an error here; it shows up in [`Self::link`].
    pub fn connect(config: &FeedConfig) -> Result<Self> {
        let client_id = format!("{}-status", config.client_id);
        let (connection, publishes) =
            MqttConnection::open(config, &client_id, &[STATUS_TOPIC_FILTER])?;

        let tracker = Arc::new(StatusTracker::new());
        let drain = tokio::spawn(drain(publishes, Arc::clone(&tracker)));

        Ok(Self {
            connection,
            tracker,
            drain: Some(drain),
        })
    }

    /// Observe status map replacements.
    pub fn statuses(&self) -> watch::Receiver<Arc<StatusMap>> {
        self.tracker.subscribe()
    }

    /// The current status map.
    pub fn current(&self) -> Arc<StatusMap> {
        self.tracker.statuses()
    }

    /// Observe connectivity transitions.
    pub fn link(&self) -> watch::Receiver<LinkState> {
        self.connection.link()
    }

    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        self.connection.wait_connected(timeout).await
    }

    /// Stop applying updates and disconnect.
    pub async fn close(&mut self) {
        if let Some(drain) = self.drain.take() {
            drain.abort();
            let _ = drain.await;
        }
        self.connection.close().await;
    }
}

impl Drop for StatusFeed {
    fn drop(&mut self) {
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}

async fn drain(mut publishes: mpsc::Receiver<rumqttc::Publish>, tracker: Arc<StatusTracker>) {
    while let Some(publish) = publishes.recv().await {
        tracker.apply(&publish.topic, &publish.payload);
    }
}
