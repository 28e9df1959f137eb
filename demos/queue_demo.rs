use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lane_jobs::{JobQueue, QueueConfig, ServiceRegistry};
use tracing_subscriber::EnvFilter;

/// Stand-in for whatever a real job would need: a mailer, a database pool...
struct AuditLog {
    entries: AtomicUsize,
}

impl AuditLog {
    fn write(&self, message: &str) {
        let n = self.entries.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(entry = n, "{message}");
    }
}

/// Per-scope start time, created fresh for every job run.
struct RunContext {
    started: std::time::Instant,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let services = ServiceRegistry::new();
    services.register_singleton(Arc::new(AuditLog {
        entries: AtomicUsize::new(0),
    }));
    services.register_scoped(|| {
        Ok::<_, String>(RunContext {
            started: std::time::Instant::now(),
        })
    });

    let config = QueueConfig::default().with_retention(Duration::from_secs(600));
    let mut queue = JobQueue::with_config(Arc::new(services), config);
    queue.start()?;

    // Two queues side by side; jobs within each run one after another.
    for (queue_name, prefix) in [("Queue A", "Job A"), ("Queue B", "Job B")] {
        for i in 1..=3u64 {
            let job_name = format!("{prefix} {i}");
            let label = job_name.clone();
            queue.submit(queue_name, job_name, move |log: Arc<AuditLog>| async move {
                log.write(&format!("{label} started"));
                tokio::time::sleep(Duration::from_secs(2 + i)).await;
                if i == 2 && label.starts_with("Job B") {
                    return Err(format!("{label} failed on purpose"));
                }
                log.write(&format!("{label} finished"));
                Ok(())
            });
        }
    }

    // No explicit queue: lands on the "RunContext" queue.
    queue.submit_for_service("timed", |ctx: Arc<RunContext>| async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        tracing::info!(elapsed_ms = ctx.started.elapsed().as_millis() as u64, "Timed job done");
        Ok::<_, String>(())
    });

    let cancelled = queue.submit("Queue A", "Never runs", |_: Arc<AuditLog>| async {
        Ok::<_, String>(())
    });
    queue.cancel(&cancelled);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    let app = queue.dashboard();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Dashboard server stopped");
        }
    });

    println!("Dashboard on http://127.0.0.1:3000. Press Ctrl+C to stop.");
    queue.wait_for_shutdown().await;

    Ok(())
}
