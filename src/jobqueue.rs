use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use crate::config::QueueConfig;
use crate::handler::BoxError;
use crate::job::{JobId, JobInfo};
use crate::registry::{JobRegistry, QueueError};
use crate::services::ServiceResolver;
use crate::sweeper::Sweeper;
use crate::worker::QueueWorker;

/// Owns the job registry together with the worker loop and retention sweep
/// that drive it.
pub struct JobQueue {
    registry: Arc<JobRegistry>,
    resolver: Arc<dyn ServiceResolver>,
    config: QueueConfig,
    shutdown: CancellationToken,
    jobs: TaskTracker,
    handles: Vec<JoinHandle<()>>,
}

impl JobQueue {
    /// Create a job queue with default timings.
    ///
    /// Nothing runs until [`JobQueue::start`] is called; jobs submitted before
    /// that simply wait.
    ///
    /// # Example
    /// ```ignore
    /// let services = ServiceRegistry::new();
    /// services.register_singleton(Arc::new(Mailer::default()));
    ///
    /// let mut queue = JobQueue::new(Arc::new(services));
    /// queue.start()?;
    ///
    /// queue.submit("emails", "welcome", |mailer: Arc<Mailer>| async move {
    ///     mailer.send("user@example.com").await
    /// });
    /// ```
    pub fn new(resolver: Arc<dyn ServiceResolver>) -> Self {
        Self::with_config(resolver, QueueConfig::default())
    }

    pub fn with_config(resolver: Arc<dyn ServiceResolver>, config: QueueConfig) -> Self {
        Self {
            registry: Arc::new(JobRegistry::new()),
            resolver,
            config,
            shutdown: CancellationToken::new(),
            jobs: TaskTracker::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn the worker loop and the retention sweep on the current runtime.
    pub fn start(&mut self) -> Result<(), QueueError> {
        if !self.handles.is_empty() {
            return Err(QueueError::AlreadyStarted);
        }

        let worker = QueueWorker::new(Arc::clone(&self.registry), Arc::clone(&self.resolver))
            .with_tick_interval(self.config.tick_interval())
            .with_tracker(self.jobs.clone());
        let shutdown = self.shutdown.clone();
        self.handles
            .push(tokio::spawn(async move { worker.run(shutdown).await }));

        let sweeper = Sweeper::new(Arc::clone(&self.registry))
            .with_schedule(self.config.cleanup_initial_delay(), self.config.cleanup_interval())
            .with_retention(self.config.retention());
        let shutdown = self.shutdown.clone();
        self.handles
            .push(tokio::spawn(async move { sweeper.run(shutdown).await }));

        info!("Job queue started");
        Ok(())
    }

    /// Stop both timers. Jobs already running keep going; pending jobs stay
    /// queued and resume if the queue is started again.
    pub async fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }

        info!("Job queue stopping");
        self.shutdown.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Job queue task ended abnormally");
            }
        }
        self.shutdown = CancellationToken::new();
        info!("Job queue stopped");
    }

    /// Block until Ctrl+C, then shut down.
    pub async fn wait_for_shutdown(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
        self.shutdown().await;
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Launched jobs that have not finished yet, including ones started
    /// before the last restart.
    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }

    /// Shared registry, for layers that only submit or observe jobs.
    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn submit<S, F, Fut, E>(
        &self,
        queue: impl Into<String>,
        name: impl Into<String>,
        action: F,
    ) -> JobId
    where
        S: Send + Sync + 'static,
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.registry.submit(queue, name, action)
    }

    /// See [`JobRegistry::submit_for_service`].
    pub fn submit_for_service<S, F, Fut, E>(&self, name: impl Into<String>, action: F) -> JobId
    where
        S: Send + Sync + 'static,
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.registry.submit_for_service(name, action)
    }

    pub fn cancel(&self, id: &JobId) -> bool {
        self.registry.cancel(id)
    }

    pub fn get_job(&self, id: &JobId) -> Option<JobInfo> {
        self.registry.get_job(id)
    }

    pub fn all_jobs(&self) -> Vec<JobInfo> {
        self.registry.all_jobs()
    }

    pub fn pending_jobs(&self) -> Vec<JobInfo> {
        self.registry.pending_jobs()
    }

    pub fn processing_jobs(&self) -> Vec<JobInfo> {
        self.registry.processing_jobs()
    }

    pub fn recent_completed_jobs(&self, window: Duration) -> Vec<JobInfo> {
        self.registry.recent_completed_jobs(window)
    }

    pub fn evict_older_than(&self, retention: Duration) -> Result<usize, QueueError> {
        self.registry.evict_older_than(retention)
    }

    /// Admin routes over this queue's registry.
    pub fn dashboard(&self) -> axum::Router {
        crate::dashboard::router(Arc::clone(&self.registry), self.config.recent_window())
    }

    /// Admin routes for mounting with `Router::nest(base, ..)`.
    pub fn dashboard_at(&self, base: &str) -> axum::Router {
        crate::dashboard::router_at(Arc::clone(&self.registry), self.config.recent_window(), base)
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
