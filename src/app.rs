//! Application state: the live sources and the reconciled view over them.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sensorwatch_types::{ReconciledSensorView, StatusMap};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::data::{reconcile, LastUpdatePolicy};
use crate::error::{Error, Result};
use crate::feed::{Connectivity, LinkState, StatusFeed};
use crate::poller::{PollState, PollerHandle};

/// Everything a dashboard renders, taken from one read of each source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    /// True until the first poll completes.
    pub loading: bool,
    pub as_of: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
    /// Error from the most recent poll.
    pub error: Option<String>,
    pub connectivity: Connectivity,
    /// Most recent status feed fault.
    pub feed_error: Option<String>,
    pub sensors: BTreeMap<String, ReconciledSensorView>,
}

/// Owns the poller and the status feed and reconciles their outputs on demand.
#[derive(Debug)]
pub struct App {
    statuses: watch::Receiver<Arc<StatusMap>>,
    link: watch::Receiver<LinkState>,
    polls: watch::Receiver<PollState>,
    policy: LastUpdatePolicy,

    feed: Mutex<Option<StatusFeed>>,
    poller: Mutex<Option<PollerHandle>>,
}

impl App {
    /// Take ownership of a running poller and the outcome of connecting the
    /// status feed.
    ///
    /// A feed that failed to connect leaves the view permanently
    /// `disconnected` with the failure as `feed_error`; every sensor then
    /// reads as offline.
    pub fn new(feed: Result<StatusFeed>, poller: PollerHandle, policy: LastUpdatePolicy) -> Self {
        let polls = poller.subscribe();

        let (statuses, link, feed) = match feed {
            Ok(feed) => (feed.statuses(), feed.link(), Some(feed)),
            Err(e) => {
                tracing::warn!("Status feed unavailable: {}", e);
                let (_, statuses) = watch::channel(Arc::new(StatusMap::new()));
                let (_, link) = watch::channel(LinkState::disconnected(Some(e)));
                (statuses, link, None)
            }
        };

        Self {
            statuses,
            link,
            polls,
            policy,
            feed: Mutex::new(feed),
            poller: Mutex::new(Some(poller)),
        }
    }

    /// Build a view over bare channels, with nothing to shut down.
    pub fn from_channels(
        statuses: watch::Receiver<Arc<StatusMap>>,
        link: watch::Receiver<LinkState>,
        polls: watch::Receiver<PollState>,
        policy: LastUpdatePolicy,
    ) -> Self {
        Self {
            statuses,
            link,
            polls,
            policy,
            feed: Mutex::new(None),
            poller: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> LastUpdatePolicy {
        self.policy
    }

    /// Reconcile the current status map with the latest poll.
    pub fn view(&self) -> DashboardView {
        let statuses = self.statuses.borrow().clone();
        let link = self.link.borrow().clone();
        let poll = self.polls.borrow().clone();

        DashboardView {
            loading: poll.loading,
            as_of: poll.as_of,
            latency_ms: poll.latency_ms,
            error: poll.error.as_ref().map(Error::to_string),
            connectivity: link.connectivity,
            feed_error: link.error.as_ref().map(Error::to_string),
            sensors: reconcile(&statuses, &poll.sensors, self.policy),
        }
    }

    /// Stop the poller and close the feed. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(mut poller) = self.poller.lock().await.take() {
            poller.stop().await;
            tracing::info!("Poller stopped");
        }
        if let Some(mut feed) = self.feed.lock().await.take() {
            feed.close().await;
            tracing::info!("Status feed closed");
        }
    }
}
