//! Settings: built-in defaults, an optional TOML file, then environment
//! variables.
//!
//! Environment variables use the `SENSORWATCH_` prefix and `__` between
//! section and key, e.g. `SENSORWATCH_FEED__URL=mqtt://broker:1883` or
//! `SENSORWATCH_QUERY__WINDOW_HOURS=48`.
//!
//! ```toml
//! [feed]
//! url = "mqtt://raspberrypi.local:1883"
//!
//! [store]
//! path = "/var/lib/sensorwatch/sensor_data.db"
//!
//! [query]
//! last_update = "latest"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::data::{LastUpdatePolicy, QueryOptions};
use crate::error::{Error, Result};
use crate::feed::FeedConfig;

const ENV_PREFIX: &str = "SENSORWATCH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: "mqtt://localhost:1883".to_string(),
            username: None,
            password: None,
            client_id: "sensorwatch".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_ms: 2000,
            connect_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sensor_data.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub interval_ms: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub window_hours: u64,
    pub history_cap: usize,
    pub merge_tolerance_ms: u64,
    pub last_update: LastUpdatePolicy,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            window_hours: 24,
            history_cap: 120,
            merge_tolerance_ms: 2000,
            last_update: LastUpdatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub summary_interval_secs: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            summary_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// All settings, one section per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub feed: FeedSettings,
    pub store: StoreSettings,
    pub poller: PollerSettings,
    pub query: QuerySettings,
    pub server: ServerSettings,
    pub ingest: IngestSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings, layering `path` (if given) and the environment over the
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.feed.url.trim().is_empty(), "feed.url must not be empty"),
            (self.poller.interval_ms == 0, "poller.interval_ms must be positive"),
            (self.query.window_hours == 0, "query.window_hours must be positive"),
            (self.query.history_cap == 0, "query.history_cap must be positive"),
            (
                self.ingest.summary_interval_secs == 0,
                "ingest.summary_interval_secs must be positive",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(Error::Config(message.to_string())),
            None => Ok(()),
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            url: self.feed.url.clone(),
            username: self.feed.username.clone(),
            password: self.feed.password.clone(),
            client_id: self.feed.client_id.clone(),
            keep_alive: Duration::from_secs(self.feed.keep_alive_secs),
            reconnect_delay: Duration::from_millis(self.feed.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.feed.connect_timeout_ms),
        }
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            window: Duration::from_secs(self.query.window_hours.saturating_mul(3600)),
            history_cap: self.query.history_cap,
            merge_tolerance: Duration::from_millis(self.query.merge_tolerance_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poller.interval_ms)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.ingest.summary_interval_secs)
    }

    /// Log the effective settings. Credentials are not printed.
    pub fn log_summary(&self) {
        tracing::info!("Broker: {} (client id {})", self.feed.url, self.feed.client_id);
        if let Some(username) = &self.feed.username {
            tracing::info!("Broker user: {}", username);
        }
        tracing::info!("Store: {}", self.store.path.display());
        tracing::info!(
            "Query: window {}h, history cap {}, merge tolerance {}ms, last update {:?}",
            self.query.window_hours,
            self.query.history_cap,
            self.query.merge_tolerance_ms,
            self.query.last_update
        );
        tracing::info!("Poll interval: {}ms", self.poller.interval_ms);
    }
}
