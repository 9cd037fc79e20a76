//! MQTT status feed.
//!
//! - [`connection`]: the reconnecting broker connection ([`MqttConnection`])
//! - [`client`]: the status subscription ([`StatusFeed`]) and the map it
//!   maintains ([`StatusTracker`])
//! - [`topic`]: topic filters and parsing

pub mod client;
pub mod connection;
pub mod topic;

#[cfg(test)]
pub(crate) mod test_broker;

pub use client::{StatusFeed, StatusTracker};
pub use connection::{parse_broker_url, Connectivity, FeedConfig, LinkState, MqttConnection};
pub use topic::{SensorTopic, READING_TOPIC_FILTERS, STATUS_TOPIC_FILTER};
