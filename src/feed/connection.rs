//! Reconnecting MQTT connection.
//!
//! A single actor task owns the rumqttc `EventLoop`. It reports every
//! connectivity transition on a watch channel, forwards inbound publishes on
//! an mpsc channel, and (re)subscribes to its topics on every `ConnAck`, so a
//! reconnect restores the subscriptions.
//!
//! ```text
//! Connecting ──ConnAck──▶ Connected
//!     ▲                      │ poll error
//!     │ reconnect_delay      ▼
//!     └────────────────── Error
//!
//! close() ──▶ Disconnected (terminal)
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, Publish, QoS};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 1883;
const REQUEST_CAPACITY: usize = 10;
const INBOUND_CAPACITY: usize = 256;
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// Broker connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Broker URL: `mqtt://host:port`, `tcp://host:port` or bare `host[:port]`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Base client id; each connection appends its own suffix.
    pub client_id: String,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "mqtt://localhost:1883".to_string(),
            username: None,
            password: None,
            client_id: "sensorwatch".to_string(),
            keep_alive: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connecting,
    Connected,
    Error,
    Disconnected,
}

/// Connectivity plus the most recent fault, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkState {
    pub connectivity: Connectivity,
    pub error: Option<Error>,
}

impl LinkState {
    pub fn connecting() -> Self {
        Self {
            connectivity: Connectivity::Connecting,
            error: None,
        }
    }

    /// Terminal state, optionally carrying why the link never came up.
    pub fn disconnected(error: Option<Error>) -> Self {
        Self {
            connectivity: Connectivity::Disconnected,
            error,
        }
    }
}

/// Split a broker URL into host and port.
pub fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let trimmed = url.trim();
    let address = trimmed
        .strip_prefix("mqtt://")
        .or_else(|| trimmed.strip_prefix("tcp://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    if address.is_empty() || address.contains("://") || address.contains('/') {
        return Err(Error::TransportUnavailable(format!(
            "invalid broker URL: {:?}",
            url
        )));
    }

    match address.split_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse().map_err(|_| {
                Error::TransportUnavailable(format!("invalid port in broker URL: {:?}", url))
            })?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(Error::TransportUnavailable(format!(
            "missing host in broker URL: {:?}",
            url
        ))),
        None => Ok((address.to_string(), DEFAULT_PORT)),
    }
}

/// An open broker connection with an explicit lifecycle.
#[derive(Debug)]
pub struct MqttConnection {
    link: watch::Receiver<LinkState>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    broker: String,
}

impl MqttConnection {
    /// Start connecting to the broker and subscribe to `topics` once connected.
    ///
    /// Returns immediately; the connection is established in the background.
    /// Fails with `TransportUnavailable` when the client cannot be built.
    pub fn open(
        config: &FeedConfig,
        client_id: &str,
        topics: &[&str],
    ) -> Result<(Self, mpsc::Receiver<Publish>)> {
        let (host, port) = parse_broker_url(&config.url)?;
        let broker = format!("{}:{}", host, port);

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(config.keep_alive);
        if let Some(username) = &config.username {
            options.set_credentials(username, config.password.as_deref().unwrap_or_default());
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (link_tx, link) = watch::channel(LinkState::connecting());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (publish_tx, publish_rx) = mpsc::channel(INBOUND_CAPACITY);

        let actor = ConnectionActor {
            client,
            event_loop,
            topics: topics.iter().map(|t| t.to_string()).collect(),
            link_tx,
            publish_tx,
            stop_rx,
            reconnect_delay: config.reconnect_delay,
            broker: broker.clone(),
        };

        tracing::info!("Connecting to MQTT broker at {} as {}", broker, client_id);
        let task = tokio::spawn(actor.run());

        Ok((
            Self {
                link,
                stop_tx,
                task: Some(task),
                broker,
            },
            publish_rx,
        ))
    }

    /// `host:port` of the broker.
    pub fn broker(&self) -> &str {
        &self.broker
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        self.link.borrow().clone()
    }

    /// A receiver that observes every link transition.
    pub fn link(&self) -> watch::Receiver<LinkState> {
        self.link.clone()
    }

    /// Wait until the broker acknowledges the connection.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut link = self.link.clone();
        let outcome = tokio::time::timeout(
            timeout,
            link.wait_for(|state| state.connectivity == Connectivity::Connected),
        )
        .await
        .map(|waited| waited.map(|_| ()));

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::ConnectionLost("connection closed".to_string())),
            Err(_) => Err(Error::ConnectionTimeout(timeout)),
        }
    }

    /// Disconnect and wait for the actor to finish.
    ///
    /// No publish is forwarded after this returns.
    pub async fn close(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        let _ = self.stop_tx.send(true);
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                tracing::error!("MQTT connection task for {} failed: {}", self.broker, e);
            }
        }
        tracing::info!("Disconnected from MQTT broker at {}", self.broker);
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct ConnectionActor {
    client: AsyncClient,
    event_loop: EventLoop,
    topics: Vec<String>,
    link_tx: watch::Sender<LinkState>,
    publish_tx: mpsc::Sender<Publish>,
    stop_rx: watch::Receiver<bool>,
    reconnect_delay: Duration,
    broker: String,
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.stop_rx.changed() => break,
                event = self.event_loop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => self.on_connected(),
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        let rejected = ack
                            .return_codes
                            .iter()
                            .any(|code| matches!(code, rumqttc::SubscribeReasonCode::Failure));
                        if rejected {
                            tracing::warn!("Broker {} rejected a subscription", self.broker);
                            self.set_error(Connectivity::Connected, Error::SubscriptionFailed(
                                format!("broker rejected subscription (packet {})", ack.pkid),
                            ));
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if self.publish_tx.send(publish).await.is_err() {
                            tracing::debug!("Publish receiver dropped, stopping connection");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("MQTT connection to {} failed: {}", self.broker, e);
                        self.set_error(Connectivity::Error, Error::ConnectionLost(e.to_string()));

                        tokio::select! {
                            _ = tokio::time::sleep(self.reconnect_delay) => {}
                            _ = self.stop_rx.changed() => break,
                        }
                        self.link_tx
                            .send_modify(|state| state.connectivity = Connectivity::Connecting);
                    }
                },
            }
        }

        self.shutdown().await;
    }

    fn on_connected(&mut self) {
        tracing::info!("Connected to MQTT broker at {}", self.broker);
        self.link_tx.send_replace(LinkState {
            connectivity: Connectivity::Connected,
            error: None,
        });

        for topic in &self.topics {
            match self.client.try_subscribe(topic, QoS::AtLeastOnce) {
                Ok(()) => tracing::info!("Subscribed to {}", topic),
                Err(e) => {
                    tracing::warn!("Failed to subscribe to {}: {}", topic, e);
                    self.set_error(
                        Connectivity::Connected,
                        Error::SubscriptionFailed(format!("{}: {}", topic, e)),
                    );
                }
            }
        }
    }

    fn set_error(&self, connectivity: Connectivity, error: Error) {
        self.link_tx.send_replace(LinkState {
            connectivity,
            error: Some(error),
        });
    }

    /// Send DISCONNECT and give the event loop a moment to flush it.
    async fn shutdown(&mut self) {
        if self.client.try_disconnect().is_ok() {
            let flush = async {
                loop {
                    match self.event_loop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            };
            let _ = tokio::time::timeout(DISCONNECT_GRACE, flush).await;
        }

        self.link_tx.send_modify(|state| {
            state.connectivity = Connectivity::Disconnected;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::test_broker::TestBroker;
    use std::collections::BTreeSet;

    const WAIT: Duration = Duration::from_secs(5);

    fn local_config(broker: &TestBroker) -> FeedConfig {
        FeedConfig {
            url: broker.url().to_string(),
            reconnect_delay: Duration::from_millis(300),
            ..FeedConfig::default()
        }
    }

    async fn subscribed_filters(broker: &mut TestBroker, count: usize) -> BTreeSet<String> {
        let mut filters = BTreeSet::new();
        while filters.len() < count {
            filters.insert(broker.next_subscription().await);
        }
        filters
    }

    #[test]
    fn test_parse_broker_url_forms() {
        assert_eq!(
            parse_broker_url("mqtt://localhost:1883").unwrap(),
            ("localhost".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_url("tcp://10.0.0.5:8883").unwrap(),
            ("10.0.0.5".to_string(), 8883)
        );
        assert_eq!(
            parse_broker_url("raspberrypi.local").unwrap(),
            ("raspberrypi.local".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_url("mqtt://broker/").unwrap(),
            ("broker".to_string(), 1883)
        );
    }

    #[test]
    fn test_parse_broker_url_rejects_garbage() {
        for url in ["", "mqtt://", "mqtt://host:port", "ws://host:9001", "mqtt://:1883", "mqtt://a/b"] {
            let err = parse_broker_url(url).unwrap_err();
            assert!(
                matches!(err, Error::TransportUnavailable(_)),
                "{} gave {:?}",
                url,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_open_with_bad_url_is_transport_unavailable() {
        let config = FeedConfig {
            url: "mqtt://host:notaport".to_string(),
            ..FeedConfig::default()
        };
        let err = MqttConnection::open(&config, "test", &["sensors/+/status"]).unwrap_err();
        assert!(matches!(err, Error::TransportUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_broker_times_out_then_closes() {
        let config = FeedConfig {
            url: "mqtt://127.0.0.1:1".to_string(),
            reconnect_delay: Duration::from_millis(50),
            ..FeedConfig::default()
        };
        let (mut connection, _publishes) =
            MqttConnection::open(&config, "test-timeout", &["sensors/+/status"]).unwrap();

        let err = connection
            .wait_connected(Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, Error::ConnectionTimeout(Duration::from_millis(200)));

        connection.close().await;
        assert_eq!(connection.state().connectivity, Connectivity::Disconnected);
    }

    #[tokio::test]
    async fn test_connack_moves_link_to_connected() {
        let mut broker = TestBroker::start().await;
        let (mut connection, mut publishes) =
            MqttConnection::open(&local_config(&broker), "test-connack", &["sensors/+/status"])
                .unwrap();

        connection.wait_connected(WAIT).await.unwrap();
        assert_eq!(
            connection.state(),
            LinkState {
                connectivity: Connectivity::Connected,
                error: None,
            }
        );
        assert_eq!(broker.next_subscription().await, "sensors/+/status");

        broker.publish("sensors/attic/status", b"online");
        let publish = tokio::time::timeout(WAIT, publishes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(publish.topic, "sensors/attic/status");
        assert_eq!(&publish.payload[..], b"online");

        connection.close().await;
        assert_eq!(connection.state().connectivity, Connectivity::Disconnected);
    }

    #[tokio::test]
    async fn test_resubscribes_after_reconnect() {
        let mut broker = TestBroker::start().await;
        let topics = ["sensors/+/temperature", "sensors/+/humidity"];
        let (mut connection, _publishes) =
            MqttConnection::open(&local_config(&broker), "test-reconnect", &topics).unwrap();
        let mut link = connection.link();

        connection.wait_connected(WAIT).await.unwrap();
        let expected: BTreeSet<String> = topics.iter().map(|t| t.to_string()).collect();
        assert_eq!(subscribed_filters(&mut broker, 2).await, expected);

        broker.drop_connection();
        let lost = tokio::time::timeout(
            WAIT,
            link.wait_for(|state| state.connectivity == Connectivity::Error),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert!(matches!(lost.error, Some(Error::ConnectionLost(_))), "got {:?}", lost);

        assert_eq!(subscribed_filters(&mut broker, 2).await, expected);
        connection.wait_connected(WAIT).await.unwrap();
        assert_eq!(connection.state().error, None);

        connection.close().await;
    }

    #[tokio::test]
    async fn test_rejected_subscription_is_reported() {
        let broker = TestBroker::rejecting().await;
        let (mut connection, _publishes) =
            MqttConnection::open(&local_config(&broker), "test-suback", &["sensors/+/status"])
                .unwrap();
        let mut link = connection.link();

        let state = tokio::time::timeout(WAIT, link.wait_for(|state| state.error.is_some()))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(state.connectivity, Connectivity::Connected);
        assert!(
            matches!(state.error, Some(Error::SubscriptionFailed(_))),
            "got {:?}",
            state
        );

        connection.close().await;
    }
}
