//! Periodic polling of the query service.
//!
//! The poller runs one query per tick and publishes the outcome as a
//! [`PollState`] on a watch channel. Queries never overlap: the next tick is
//! only awaited once the current query finishes, and ticks missed meanwhile are
//! skipped rather than bursted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sensorwatch_types::{SensorsResponse, SnapshotMap};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::data::QueryService;
use crate::error::{Error, Result};

/// Default polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// What consumers see of the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    /// True until the first query completes, successfully or not.
    pub loading: bool,
    /// Snapshots from the last successful query.
    pub sensors: Arc<SnapshotMap>,
    /// When the last successful query was evaluated.
    pub as_of: Option<DateTime<Utc>>,
    /// Round-trip time of the most recent query.
    pub latency_ms: Option<u64>,
    /// Error from the most recent query, cleared by the next success.
    pub error: Option<Error>,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            loading: true,
            sensors: Arc::new(SnapshotMap::new()),
            as_of: None,
            latency_ms: None,
            error: None,
        }
    }
}

impl PollState {
    /// Fold one query outcome into the state.
    fn apply(&mut self, result: Result<SensorsResponse>, latency: Duration) {
        self.loading = false;
        self.latency_ms = Some(latency.as_millis() as u64);

        match result {
            Ok(response) => {
                self.sensors = Arc::new(response.sensors);
                self.as_of = Some(response.timestamp);
                self.error = None;
            }
            Err(e) => self.error = Some(e),
        }
    }
}

/// Runs a [`QueryService`] on a fixed interval.
#[derive(Debug)]
pub struct Poller {
    service: QueryService,
    interval: Duration,
}

impl Poller {
    pub fn new(service: QueryService, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Spawn the polling task. The first query runs immediately.
    pub fn start(self) -> PollerHandle {
        let (state_tx, state_rx) = watch::channel(PollState::default());
        let (stop_tx, stop_rx) = watch::channel(false);

        tracing::info!(
            "Polling {} every {}ms",
            self.service.description(),
            self.interval.as_millis()
        );
        let task = tokio::spawn(self.run(state_tx, stop_rx));

        PollerHandle {
            state: state_rx,
            stop_tx,
            task: Some(task),
        }
    }

    async fn run(self, state_tx: watch::Sender<PollState>, mut stop_rx: watch::Receiver<bool>) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = timer.tick() => {}
            }

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                // An in-flight query is dropped here and never published
                _ = stop_rx.changed() => break,
                result = self.service.query() => result,
            };
            let latency = started.elapsed();

            if let Err(e) = &result {
                tracing::warn!("Poll failed after {}ms: {}", latency.as_millis(), e);
            }
            state_tx.send_modify(|state| state.apply(result, latency));
        }

        tracing::debug!("Poller stopped");
    }
}

/// Handle to a running poller.
///
/// Dropping the handle aborts the task; [`PollerHandle::stop`] also waits for
/// it to finish.
#[derive(Debug)]
pub struct PollerHandle {
    state: watch::Receiver<PollState>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Observe state updates.
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    /// The most recently published state.
    pub fn current(&self) -> PollState {
        self.state.borrow().clone()
    }

    /// Stop polling. After this returns no further state is published.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = self.stop_tx.send(true);
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                tracing::error!("Poller task failed: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
