use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::registry::JobRegistry;

/// Evicts completed jobs past the retention window on a fixed period.
pub struct Sweeper {
    registry: Arc<JobRegistry>,
    initial_delay: Duration,
    interval: Duration,
    retention: RwLock<Duration>,
}

impl Sweeper {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            initial_delay: Duration::from_secs(60),
            interval: Duration::from_secs(300),
            retention: RwLock::new(Duration::from_secs(3600)),
        }
    }

    pub fn with_schedule(mut self, initial_delay: Duration, interval: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_retention(self, retention: Duration) -> Self {
        self.set_retention(retention);
        self
    }

    /// Change the retention window; takes effect on the next sweep.
    pub fn set_retention(&self, retention: Duration) {
        *self.retention.write().unwrap_or_else(|e| e.into_inner()) = retention;
    }

    pub fn retention(&self) -> Duration {
        *self.retention.read().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention().as_secs(),
            "Job sweeper started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.initial_delay, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Job sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
    }

    /// One eviction pass. Failures are logged and the timer keeps going.
    pub fn sweep(&self) -> usize {
        info!("Cleaning up old jobs");
        match self.registry.evict_older_than(self.retention()) {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "Evicted completed jobs");
                }
                removed
            }
            Err(e) => {
                error!(error = %e, "Error cleaning up old jobs");
                0
            }
        }
    }
}
