use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the worker loop and the retention sweep. All fields are
/// in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How often the worker scans queues for claimable jobs.
    pub tick_interval_ms: u64,
    /// Delay before the first retention sweep.
    pub cleanup_initial_delay_ms: u64,
    /// Period of the retention sweep.
    pub cleanup_interval_ms: u64,
    /// Completed jobs older than this are evicted.
    pub retention_ms: u64,
    /// Window the dashboard uses for recently completed jobs.
    pub recent_window_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            cleanup_initial_delay_ms: 60_000,
            cleanup_interval_ms: 300_000,
            retention_ms: 3_600_000,
            recent_window_ms: 3_600_000,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl QueueConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = millis(interval);
        self
    }

    pub fn with_cleanup(mut self, initial_delay: Duration, interval: Duration) -> Self {
        self.cleanup_initial_delay_ms = millis(initial_delay);
        self.cleanup_interval_ms = millis(interval);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_ms = millis(retention);
        self
    }

    pub fn with_recent_window(mut self, window: Duration) -> Self {
        self.recent_window_ms = millis(window);
        self
    }

    // Zero periods would make tokio's interval panic, so clamp them.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn cleanup_initial_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_initial_delay_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(1))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn recent_window(&self) -> Duration {
        Duration::from_millis(self.recent_window_ms)
    }
}
