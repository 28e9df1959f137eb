use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinError;

use crate::services::{ResolveError, Service};

/// Ways a job can end other than success. The display text is what gets
/// recorded as the job's error message.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Dependency resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Resolved service is not a {expected}")]
    ServiceMismatch { expected: String },
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Job panicked: {0}")]
    Panicked(String),
    #[error("Job task was cancelled")]
    Cancelled,
}

pub type JobResult = Result<(), JobError>;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type JobFuture = Pin<Box<dyn Future<Output = JobResult> + Send>>;

/// Type-erased job body: takes the resolved service, runs to completion once.
pub type JobAction = Box<dyn FnOnce(Service) -> JobFuture + Send>;

/// Wrap a typed action so it can be stored next to jobs needing other services.
pub fn typed_action<S, F, Fut, E>(action: F) -> JobAction
where
    S: Send + Sync + 'static,
    F: FnOnce(Arc<S>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    Box::new(move |service: Service| -> JobFuture {
        Box::pin(async move {
            let service = service
                .downcast::<S>()
                .map_err(|_| JobError::ServiceMismatch {
                    expected: std::any::type_name::<S>().to_string(),
                })?;
            action(service).await.map_err(|e| {
                let e: BoxError = e.into();
                JobError::Execution(e.to_string())
            })
        })
    })
}

/// Drive a job future on its own task so that a panic anywhere inside it
/// surfaces as a `JobError` instead of tearing down the caller.
pub(crate) async fn run_contained<F>(future: F) -> JobResult
where
    F: Future<Output = JobResult> + Send + 'static,
{
    let handle = tokio::spawn(future);

    let join_to_error = |e: JoinError| {
        if e.is_panic() {
            JobError::Panicked(panic_message(e.into_panic()))
        } else {
            JobError::Cancelled
        }
    };

    handle.await.map_err(join_to_error)?
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter {
        greeting: &'static str,
    }

    #[tokio::test]
    async fn typed_action_receives_the_service() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let action = typed_action(move |greeter: Arc<Greeter>| async move {
            let _ = tx.send(greeter.greeting);
            Ok::<_, String>(())
        });

        let service: Service = Arc::new(Greeter { greeting: "hello" });
        run_contained(action(service)).await.unwrap();
        assert_eq!(rx.await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn returned_error_becomes_execution_error() {
        let action = typed_action(|_: Arc<Greeter>| async { Err::<(), _>("boom") });

        let service: Service = Arc::new(Greeter { greeting: "hi" });
        let err = run_contained(action(service)).await.unwrap_err();
        assert!(matches!(err, JobError::Execution(ref msg) if msg == "boom"));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn wrong_service_is_a_mismatch() {
        let action = typed_action(|_: Arc<Greeter>| async { Ok::<_, String>(()) });

        let service: Service = Arc::new(42u32);
        let err = run_contained(action(service)).await.unwrap_err();
        assert!(matches!(err, JobError::ServiceMismatch { .. }));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let action = typed_action(|_: Arc<Greeter>| async {
            if true {
                panic!("kaboom");
            }
            Ok::<_, String>(())
        });

        let service: Service = Arc::new(Greeter { greeting: "hi" });
        let err = run_contained(action(service)).await.unwrap_err();
        assert!(matches!(err, JobError::Panicked(ref msg) if msg.contains("kaboom")));
    }
}
