//! Background expiry sweep for [`InMemoryCache`].

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::in_memory::InMemoryCache;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Owns the sweep task. Dropping the handle cancels the sweep;
/// [`SweepHandle::shutdown`] also waits for the task to finish.
#[derive(Debug)]
pub struct SweepHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    pub(crate) fn spawn<V>(cache: Weak<InMemoryCache<V>>, interval: Duration) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sweep(cache, interval, cancel.clone()));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Signals the sweep to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the task has exited, either by cancellation or because the
    /// cache was dropped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stops the sweep and waits for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "cache sweep task ended abnormally");
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_sweep<V>(cache: Weak<InMemoryCache<V>>, period: Duration, cancel: CancellationToken)
where
    V: Clone + Send + Sync + 'static,
{
    let period = period.max(MIN_SWEEP_INTERVAL);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("cache sweep cancelled");
                break;
            }
            _ = ticker.tick() => {
                let Some(cache) = cache.upgrade() else {
                    debug!("cache dropped, stopping sweep");
                    break;
                };
                cache.sweep_expired();
            }
        }
    }
}
