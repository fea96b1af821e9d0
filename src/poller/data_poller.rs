//! Fixed-interval poller publishing the latest good value

use super::fetcher::{FetchError, ValueFetcher};
use super::value::{PolledValue, ScalarValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Interval between fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Fetch outcome counters
#[derive(Debug, Default)]
pub struct PollerStats {
    successes: AtomicU64,
    failures: AtomicU64,
}

impl PollerStats {
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Polls a [`ValueFetcher`] and publishes the latest good value.
///
/// Subscribers get a `watch` receiver, so readers always see the most
/// recently published value without blocking the poller.
pub struct DataPoller {
    fetcher: Arc<dyn ValueFetcher>,
    interval: Duration,
    value_tx: Arc<watch::Sender<PolledValue>>,
    stats: Arc<PollerStats>,
    task: Option<PollTask>,
}

impl DataPoller {
    /// Create a stopped poller
    pub fn new(fetcher: Arc<dyn ValueFetcher>, interval: Duration) -> Self {
        let (value_tx, _) = watch::channel(PolledValue::default());
        Self {
            fetcher,
            interval,
            value_tx: Arc::new(value_tx),
            stats: Arc::new(PollerStats::default()),
            task: None,
        }
    }

    /// Subscribe to published values
    pub fn subscribe(&self) -> watch::Receiver<PolledValue> {
        self.value_tx.subscribe()
    }

    /// Snapshot of the latest published value
    pub fn latest(&self) -> PolledValue {
        self.value_tx.borrow().clone()
    }

    pub fn stats(&self) -> &PollerStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Run a single fetch and publish step. Returns whether the fetch succeeded.
    pub async fn poll_once(&self) -> bool {
        let result = self.fetcher.fetch().await;
        publish(result, self.fetcher.as_ref(), &self.value_tx, &self.stats)
    }

    /// Start polling: one fetch right away, then one per interval.
    ///
    /// Must be called from within a tokio runtime. Calling it while already
    /// running does nothing.
    pub fn start(&mut self) {
        if self.task.is_some() {
            tracing::debug!("Poller already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_schedule(
            self.fetcher.clone(),
            self.value_tx.clone(),
            self.stats.clone(),
            self.interval,
            cancel.clone(),
        ));

        tracing::info!(
            "Polling {} every {}ms",
            self.fetcher.describe(),
            self.interval.as_millis()
        );
        self.task = Some(PollTask { cancel, handle });
    }

    /// Stop polling.
    ///
    /// Once this returns no further fetch is issued and nothing more is
    /// published. A fetch in flight is abandoned.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            if !e.is_cancelled() {
                tracing::warn!("Poll task ended abnormally: {}", e);
            }
        }

        tracing::info!(
            "Polling stopped ({} ok, {} failed)",
            self.stats.successes(),
            self.stats.failures()
        );
    }
}

impl Drop for DataPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel.cancel();
        }
    }
}

async fn run_schedule(
    fetcher: Arc<dyn ValueFetcher>,
    value_tx: Arc<watch::Sender<PolledValue>>,
    stats: Arc<PollerStats>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = fetcher.fetch() => {
                publish(result, fetcher.as_ref(), &value_tx, &stats);
            }
        }
    }
}

fn publish(
    result: Result<ScalarValue, FetchError>,
    fetcher: &dyn ValueFetcher,
    value_tx: &watch::Sender<PolledValue>,
    stats: &PollerStats,
) -> bool {
    match result {
        Ok(value) => {
            stats.successes.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Fetched {} from {}", value, fetcher.describe());
            value_tx.send_modify(|current| *current = current.advanced(value));
            true
        }
        Err(e) => {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Error fetching {}: {}", fetcher.describe(), e);
            false
        }
    }
}
