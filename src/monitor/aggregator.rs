use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::fetcher::HistoryFetcher;
use super::state::{MonitorState, Snapshot};
use crate::error::{MonitorError, Result};
use crate::gocd::GoCdClient;
use crate::settings::SettingsStore;
use crate::subscribers::{Broadcaster, Event};

/// Polls every enabled pipeline on a fixed interval and publishes a new
/// snapshot once all fetches of a cycle have resolved.
///
/// Cycles are not serialized: a slow cycle may still be running when the
/// next tick fires, and whichever cycle finishes last writes the snapshot.
pub struct PollingAggregator {
    client: Arc<GoCdClient>,
    fetcher: HistoryFetcher,
    settings: Arc<SettingsStore>,
    state: Arc<MonitorState>,
    broadcaster: Arc<dyn Broadcaster>,
    /// Pipelines dispatched by the most recently started cycle.
    polled: Mutex<HashSet<String>>,
    cycles: AtomicU64,
}

/// Stops a running aggregator. In-flight cycles are left to finish.
pub struct AggregatorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AggregatorHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Polling task ended abnormally: {e}");
        }
    }
}

impl PollingAggregator {
    pub fn new(
        client: Arc<GoCdClient>,
        settings: Arc<SettingsStore>,
        state: Arc<MonitorState>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        let fetcher = HistoryFetcher::new(Arc::clone(&client), Arc::clone(&state));

        Self {
            client,
            fetcher,
            settings,
            state,
            broadcaster,
            polled: Mutex::new(HashSet::new()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Loads the pipeline list that every cycle polls.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be fetched; there is nothing to
    /// poll without it.
    pub async fn bootstrap(&self) -> Result<Arc<Vec<String>>> {
        let names = self.client.fetch_pipeline_names().await?;
        info!("Found {} pipelines on {}", names.len(), self.client.base_url());

        self.state.set_pipeline_names(names);
        let names = self.state.pipeline_names();
        self.broadcaster.publish(Event::PipelinesNames(names.to_vec()));

        Ok(names)
    }

    /// Bootstraps, refreshes once, then refreshes every `poll_interval`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is zero or bootstrapping fails.
    pub async fn start(self: Arc<Self>, poll_interval: Duration) -> Result<AggregatorHandle> {
        if poll_interval.is_zero() {
            return Err(MonitorError::Config(
                "Poll interval must be at least one second".into(),
            ));
        }

        self.bootstrap().await?;
        self.refresh().await;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + poll_interval, poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let aggregator = Arc::clone(&self);
                        tokio::spawn(async move {
                            aggregator.refresh().await;
                        });
                    }
                    _ = stop_rx.changed() => break,
                }
            }

            info!("Stopped scheduling refresh cycles");
        });

        info!("Polling every {}s", poll_interval.as_secs());
        Ok(AggregatorHandle { stop_tx, task })
    }

    /// Runs one full cycle and publishes its snapshot.
    ///
    /// Pipelines disabled since the previous cycle are not fetched, but
    /// their last status is carried into this cycle's snapshot once.
    pub async fn refresh(&self) -> Arc<Snapshot> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let settings = self.settings.load_or_default();
        let names = self.state.pipeline_names();

        let targets: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|name| !settings.is_disabled(name))
            .collect();

        let newly_disabled: HashSet<String> = {
            let mut polled = self.polled.lock().unwrap_or_else(PoisonError::into_inner);
            let carried = polled
                .iter()
                .filter(|name| settings.is_disabled(name))
                .cloned()
                .collect();
            *polled = targets.iter().map(ToString::to_string).collect();
            carried
        };

        info!(
            "Cycle {cycle}: refreshing {} pipelines ({} disabled)",
            targets.len(),
            names.len() - targets.len()
        );

        let results =
            futures::future::join_all(targets.iter().map(|name| self.fetcher.fetch(name))).await;

        let mut fetched: HashMap<&str, _> = targets
            .iter()
            .copied()
            .zip(results)
            .filter_map(|(name, status)| status.map(|status| (name, status)))
            .collect();

        let previous = self.state.snapshot();
        let mut snapshot = Snapshot::with_capacity(names.len());
        for name in names.iter() {
            if let Some(status) = fetched.remove(name.as_str()) {
                snapshot.insert(name.clone(), status);
            } else if newly_disabled.contains(name) {
                if let Some(stale) = previous.get(name) {
                    snapshot.insert(name.clone(), stale.clone());
                }
            }
        }

        let snapshot = self.state.replace_snapshot(snapshot);
        debug!("Cycle {cycle}: published {} pipelines", snapshot.len());

        self.broadcaster.publish(Event::pipelines_updated(&snapshot));
        snapshot
    }
}
