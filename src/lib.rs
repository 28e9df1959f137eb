//! In-process background job queues.
//!
//! Jobs are grouped into named queues. Each queue runs its jobs one at a time
//! in submission order, while different queues run in parallel. Every job
//! declares the service it depends on; a fresh dependency scope resolves that
//! service right before the job runs.

mod config;
mod dashboard;
mod handler;
mod job;
mod jobqueue;
mod registry;
mod services;
mod sweeper;
mod worker;

pub use config::QueueConfig;
pub use dashboard::{router as dashboard_router, router_at as dashboard_router_at};
pub use handler::{typed_action, BoxError, JobAction, JobError, JobFuture, JobResult};
pub use job::{ClaimedJob, JobId, JobInfo, JobStatus};
pub use jobqueue::JobQueue;
pub use registry::{JobRegistry, QueueError};
pub use services::{ResolveError, Service, ServiceRegistry, ServiceResolver, ServiceScope, ServiceType};
pub use sweeper::Sweeper;
pub use worker::QueueWorker;
