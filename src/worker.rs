use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::handler::{run_contained, JobAction, JobResult};
use crate::job::ClaimedJob;
use crate::registry::JobRegistry;
use crate::services::{ServiceResolver, ServiceType};

/// Periodically claims the head job of every idle queue and launches it.
///
/// A tick never waits for the jobs it starts; each runs on its own task and
/// reports back through [`JobRegistry::complete`].
pub struct QueueWorker {
    registry: Arc<JobRegistry>,
    resolver: Arc<dyn ServiceResolver>,
    tick_interval: Duration,
    scanning: AtomicBool,
    jobs: TaskTracker,
}

impl QueueWorker {
    pub fn new(registry: Arc<JobRegistry>, resolver: Arc<dyn ServiceResolver>) -> Self {
        Self {
            registry,
            resolver,
            tick_interval: Duration::from_millis(100),
            scanning: AtomicBool::new(false),
            jobs: TaskTracker::new(),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Launch jobs on `tracker`, so their count outlives this worker.
    pub fn with_tracker(mut self, tracker: TaskTracker) -> Self {
        self.jobs = tracker;
        self
    }

    /// Tick until shutdown is signaled. Running jobs are left to finish on their own.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(tick_ms = self.tick_interval.as_millis() as u64, "Queue worker started");

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(in_flight = self.jobs.len(), "Queue worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }

    /// Scan every queue with queued entries once. Returns how many jobs were
    /// launched; a tick that overlaps a running scan launches none.
    pub fn tick(&self) -> usize {
        let Some(_guard) = ScanGuard::acquire(&self.scanning) else {
            debug!("Previous scan still running, skipping tick");
            return 0;
        };

        let mut launched = 0;
        for queue in self.registry.queues_with_pending() {
            if let Some(job) = self.registry.try_claim_next(&queue) {
                self.launch(job);
                launched += 1;
            }
        }
        launched
    }

    /// Number of launched jobs that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }

    fn launch(&self, job: ClaimedJob) {
        let registry = Arc::clone(&self.registry);
        let resolver = Arc::clone(&self.resolver);
        self.jobs.spawn(execute(registry, resolver, job));
    }
}

/// Run one claimed job and record its outcome. Never panics outward: the
/// resolution and the action both run inside `run_contained`.
async fn execute(registry: Arc<JobRegistry>, resolver: Arc<dyn ServiceResolver>, job: ClaimedJob) {
    let ClaimedJob {
        info: job,
        service_type,
        action,
    } = job;

    info!(job_id = %job.id, job_name = %job.name, queue = %job.queue, "Processing job");

    match run_contained(run_in_scope(resolver, service_type, action)).await {
        Ok(()) => {
            registry.complete(&job.id, Ok(()));
            info!(job_id = %job.id, job_name = %job.name, "Job completed successfully");
        }
        Err(e) => {
            warn!(job_id = %job.id, job_name = %job.name, error = %e, "Job failed");
            registry.complete(&job.id, Err(e.to_string()));
        }
    }
}

async fn run_in_scope(
    resolver: Arc<dyn ServiceResolver>,
    service_type: ServiceType,
    action: JobAction,
) -> JobResult {
    let mut scope = resolver.create_scope();
    let service = scope.resolve(&service_type).await?;
    let result = action(service).await;
    drop(scope);
    result
}

/// Non-blocking check-and-set on the scan flag, released on drop.
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
