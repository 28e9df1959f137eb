use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tracing::{debug, warn};

use crate::handler::{typed_action, BoxError, JobAction};
use crate::job::{ClaimedJob, JobId, JobInfo, JobRecord, JobStatus};
use crate::services::ServiceType;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Duration {0:?} is out of range")]
    InvalidDuration(Duration),
    #[error("Job queue is already running")]
    AlreadyStarted,
}

/// FIFO of job ids plus the busy flag for one named queue.
#[derive(Default)]
struct Lane {
    pending: VecDeque<JobId>,
    processing: bool,
}

/// Owns every job and the per-queue ordering.
///
/// Each queue has its own lock, so claiming on one queue never waits on
/// another. The job table lock is never held while a queue lock is being
/// acquired.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    lanes: RwLock<HashMap<String, Arc<Mutex<Lane>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job whose action needs a service of type `S`.
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
        self.submit_erased(queue, name, ServiceType::of::<S>(), typed_action(action))
    }

    /// Queue a job on the queue named after its service type.
    ///
    /// Every caller that needs the same service lands on the same queue, so
    /// unrelated work sharing a dependency runs one job at a time. Use
    /// [`JobRegistry::submit`] with an explicit queue when that is unwanted.
    pub fn submit_for_service<S, F, Fut, E>(&self, name: impl Into<String>, action: F) -> JobId
    where
        S: Send + Sync + 'static,
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let service_type = ServiceType::of::<S>();
        self.submit_erased(service_type.short_name(), name, service_type, typed_action(action))
    }

    /// Queue a job with an already type-erased action.
    pub fn submit_erased(
        &self,
        queue: impl Into<String>,
        name: impl Into<String>,
        service_type: ServiceType,
        action: JobAction,
    ) -> JobId {
        let record = JobRecord::new(queue.into(), name.into(), service_type, action);
        let id = record.id;
        let queue = record.queue.clone();

        {
            let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
            jobs.insert(id, record);
        }

        let lane = self.lane_or_insert(&queue);
        lane.lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .push_back(id);

        debug!(job_id = %id, queue = %queue, "Job queued");
        id
    }

    /// Claim the next pending job of `queue`, skipping cancelled or evicted
    /// entries. Returns `None` while the queue already has a job running.
    pub fn try_claim_next(&self, queue: &str) -> Option<ClaimedJob> {
        let lane = self.lane(queue)?;
        let mut lane = lane.lock().unwrap_or_else(|e| e.into_inner());

        if lane.processing {
            return None;
        }

        while let Some(id) = lane.pending.pop_front() {
            let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());

            let Some(job) = jobs.get_mut(&id) else {
                debug!(job_id = %id, queue = %queue, "Skipping evicted job");
                continue;
            };

            if job.status != JobStatus::Pending {
                debug!(job_id = %id, queue = %queue, status = %job.status, "Skipping job");
                continue;
            }

            let Some(action) = job.take_action() else {
                continue;
            };

            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
            lane.processing = true;

            return Some(ClaimedJob {
                info: job.info(),
                service_type: job.service_type,
                action,
            });
        }

        None
    }

    /// Record the outcome of a claimed job and free its queue.
    ///
    /// Returns false when the job is unknown. The queue is released even if
    /// the job was not `Processing`.
    pub fn complete(&self, id: &JobId, outcome: Result<(), String>) -> bool {
        let queue = {
            let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
            let Some(job) = jobs.get_mut(id) else {
                return false;
            };

            if job.status == JobStatus::Processing {
                job.completed_at = Some(Utc::now());
                match outcome {
                    Ok(()) => job.status = JobStatus::Success,
                    Err(error) => {
                        job.status = JobStatus::Failed;
                        job.error = Some(error);
                    }
                }
            } else {
                warn!(job_id = %id, status = %job.status, "Completing a job that was not processing");
            }

            job.queue.clone()
        };

        if let Some(lane) = self.lane(&queue) {
            lane.lock().unwrap_or_else(|e| e.into_inner()).processing = false;
        }

        true
    }

    /// Cancel a job that has not started yet.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                job.take_action();
                true
            }
            _ => false,
        }
    }

    pub fn get_job(&self, id: &JobId) -> Option<JobInfo> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(id).map(JobRecord::info)
    }

    /// Every known job, newest first.
    pub fn all_jobs(&self) -> Vec<JobInfo> {
        let mut all = self.collect(|_| true);
        all.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        all
    }

    /// Pending jobs, oldest first.
    pub fn pending_jobs(&self) -> Vec<JobInfo> {
        let mut pending = self.collect(|job| job.status == JobStatus::Pending);
        pending.sort_by(|a, b| a.queued_at.cmp(&b.queued_at));
        pending
    }

    /// Running jobs, earliest start first.
    pub fn processing_jobs(&self) -> Vec<JobInfo> {
        let mut processing = self.collect(|job| job.status == JobStatus::Processing);
        processing.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        processing
    }

    /// Jobs that finished (any terminal status) within `window`, most recent first.
    pub fn recent_completed_jobs(&self, window: Duration) -> Vec<JobInfo> {
        let cutoff = TimeDelta::from_std(window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window));

        let mut recent = self.collect(|job| match (job.completed_at, cutoff) {
            (Some(completed), Some(cutoff)) => completed >= cutoff,
            (Some(_), None) => true,
            (None, _) => false,
        });
        recent.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        recent
    }

    /// Names of queues that still hold at least one entry, cancelled ones included.
    pub fn queues_with_pending(&self) -> Vec<String> {
        let lanes = self.lanes.read().unwrap_or_else(|e| e.into_inner());
        lanes
            .iter()
            .filter(|(_, lane)| {
                !lane
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .pending
                    .is_empty()
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Drop completed jobs whose completion predates `now - retention`.
    /// Queue entries are left alone; the claim path skips missing ids.
    pub fn evict_older_than(&self, retention: Duration) -> Result<usize, QueueError> {
        let cutoff = TimeDelta::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .ok_or(QueueError::InvalidDuration(retention))?;

        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, job| !matches!(job.completed_at, Some(completed) if completed < cutoff));
        Ok(before - jobs.len())
    }

    fn collect(&self, keep: impl Fn(&JobRecord) -> bool) -> Vec<JobInfo> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.values().filter(|job| keep(*job)).map(JobRecord::info).collect()
    }

    fn lane(&self, queue: &str) -> Option<Arc<Mutex<Lane>>> {
        let lanes = self.lanes.read().unwrap_or_else(|e| e.into_inner());
        lanes.get(queue).cloned()
    }

    fn lane_or_insert(&self, queue: &str) -> Arc<Mutex<Lane>> {
        if let Some(lane) = self.lane(queue) {
            return lane;
        }
        let mut lanes = self.lanes.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(lanes.entry(queue.to_string()).or_default())
    }
}
