//! End-to-end behaviour of the job queue: ordering within a queue,
//! parallelism across queues, cancellation, failure isolation and eviction.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lane_jobs::{JobId, JobInfo, JobQueue, JobStatus, QueueConfig, ServiceRegistry};

#[derive(Default)]
struct Recorder {
    started: Mutex<Vec<String>>,
}

impl Recorder {
    fn record(&self, name: &str) {
        self.started.lock().unwrap().push(name.to_string());
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

fn setup() -> (JobQueue, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let services = ServiceRegistry::new();
    services.register_singleton(Arc::clone(&recorder));
    let queue = JobQueue::with_config(
        Arc::new(services),
        QueueConfig::default().with_tick_interval(Duration::from_millis(100)),
    );
    (queue, recorder)
}

fn sleeper(queue: &JobQueue, queue_name: &str, job_name: &str, ms: u64) -> JobId {
    let name = job_name.to_string();
    queue.submit(queue_name, job_name, move |recorder: Arc<Recorder>| async move {
        recorder.record(&name);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok::<_, String>(())
    })
}

async fn wait_terminal(queue: &JobQueue, id: &JobId, timeout: Duration) -> JobInfo {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = queue.get_job(id).expect("job should exist");
        if job.status.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} still {:?}",
            job.name,
            job.status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_queues_run_in_parallel() {
    let (mut queue, _) = setup();
    queue.start().unwrap();

    let a = sleeper(&queue, "Queue A", "Job A1", 500);
    let b = sleeper(&queue, "Queue B", "Job B1", 500);

    let a = wait_terminal(&queue, &a, Duration::from_secs(3)).await;
    let b = wait_terminal(&queue, &b, Duration::from_secs(3)).await;
    assert_eq!(a.status, JobStatus::Success);
    assert_eq!(b.status, JobStatus::Success);

    let delta = (a.started_at.unwrap() - b.started_at.unwrap()).num_milliseconds().abs();
    assert!(delta < 200, "queues should start together, delta was {delta}ms");

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_queue_runs_sequentially() {
    let (mut queue, _) = setup();
    queue.start().unwrap();

    let first = sleeper(&queue, "Seq", "Job1", 500);
    let second = sleeper(&queue, "Seq", "Job2", 100);

    let first = wait_terminal(&queue, &first, Duration::from_secs(3)).await;
    let second = wait_terminal(&queue, &second, Duration::from_secs(3)).await;

    assert!(second.started_at.unwrap() >= first.completed_at.unwrap());
    let gap = (second.started_at.unwrap() - first.started_at.unwrap()).num_milliseconds();
    assert!(gap >= 400, "second job started only {gap}ms after the first");

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifo_order_skips_cancelled_jobs() {
    let (mut queue, recorder) = setup();

    let ids: Vec<JobId> = (0..5)
        .map(|i| sleeper(&queue, "fifo", &format!("job-{i}"), 20))
        .collect();
    assert!(queue.cancel(&ids[2]));

    queue.start().unwrap();
    for id in &ids {
        wait_terminal(&queue, id, Duration::from_secs(5)).await;
    }

    assert_eq!(recorder.started(), vec!["job-0", "job-1", "job-3", "job-4"]);
    let cancelled = queue.get_job(&ids[2]).unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.started_at.is_none());

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_processing_job_per_queue() {
    let (mut queue, _) = setup();
    queue.start().unwrap();

    let ids: Vec<JobId> = (0..3)
        .map(|i| sleeper(&queue, "busy", &format!("busy-{i}"), 150))
        .chain((0..3).map(|i| sleeper(&queue, "other", &format!("other-{i}"), 150)))
        .collect();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while ids
        .iter()
        .any(|id| !queue.get_job(id).unwrap().status.is_terminal())
    {
        let processing = queue.processing_jobs();
        for name in ["busy", "other"] {
            let running = processing.iter().filter(|job| job.queue == name).count();
            assert!(running <= 1, "{running} jobs processing on {name}");
        }
        assert!(tokio::time::Instant::now() < deadline, "jobs did not drain");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_before_start_and_after() {
    let (mut queue, recorder) = setup();

    let early = sleeper(&queue, "cancel", "early", 10);
    assert!(queue.cancel(&early));

    queue.start().unwrap();
    let blocker = sleeper(&queue, "cancel", "blocker", 600);
    let waiting = sleeper(&queue, "cancel", "waiting", 10);

    // Let the blocker get claimed.
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(queue.get_job(&blocker).unwrap().status, JobStatus::Processing);
    assert!(!queue.cancel(&blocker));
    assert!(queue.cancel(&waiting));

    wait_terminal(&queue, &blocker, Duration::from_secs(3)).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(queue.get_job(&early).unwrap().status, JobStatus::Cancelled);
    assert_eq!(queue.get_job(&waiting).unwrap().status, JobStatus::Cancelled);
    assert_eq!(queue.get_job(&blocker).unwrap().status, JobStatus::Success);
    assert!(!queue.cancel(&blocker));
    assert!(!queue.cancel(&JobId::new()));
    assert_eq!(recorder.started(), vec!["blocker"]);

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_is_isolated_to_its_job() {
    let (mut queue, _) = setup();
    queue.start().unwrap();

    let failing = queue.submit("fragile", "explodes", |_: Arc<Recorder>| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Err::<(), _>("boom")
    });
    let after = sleeper(&queue, "fragile", "after", 10);
    let sibling = sleeper(&queue, "sturdy", "sibling", 100);

    let failed = wait_terminal(&queue, &failing, Duration::from_secs(3)).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.as_deref().unwrap_or_default().contains("boom"));

    assert_eq!(wait_terminal(&queue, &after, Duration::from_secs(3)).await.status, JobStatus::Success);
    let sibling = wait_terminal(&queue, &sibling, Duration::from_secs(3)).await;
    assert_eq!(sibling.status, JobStatus::Success);
    assert!(sibling.error.is_none());

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_eviction_honours_retention() {
    let (mut queue, _) = setup();
    queue.start().unwrap();

    let id = sleeper(&queue, "evict", "short", 10);
    wait_terminal(&queue, &id, Duration::from_secs(3)).await;

    let retention = Duration::from_millis(400);
    assert_eq!(queue.evict_older_than(retention).unwrap(), 0);
    assert!(queue.all_jobs().iter().any(|job| job.id == id));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(queue.evict_older_than(retention).unwrap(), 1);
    assert!(queue.all_jobs().iter().all(|job| job.id != id));

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_service_queue_serializes_by_dependency() {
    let (mut queue, recorder) = setup();
    queue.start().unwrap();

    let first = queue.submit_for_service("first", |recorder: Arc<Recorder>| async move {
        recorder.record("first");
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, String>(())
    });
    let second = queue.submit_for_service("second", |recorder: Arc<Recorder>| async move {
        recorder.record("second");
        Ok::<_, String>(())
    });

    let first = wait_terminal(&queue, &first, Duration::from_secs(3)).await;
    let second = wait_terminal(&queue, &second, Duration::from_secs(3)).await;
    assert_eq!(first.queue, "Recorder");
    assert_eq!(second.queue, "Recorder");
    assert!(second.started_at.unwrap() >= first.completed_at.unwrap());
    assert_eq!(recorder.started(), vec!["first", "second"]);

    queue.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listings_track_lifecycle() {
    let (mut queue, _) = setup();
    assert!(queue.pending_jobs().is_empty());
    assert!(queue.processing_jobs().is_empty());

    let id = sleeper(&queue, "Test Queue", "Test Job 1", 300);
    let pending = queue.pending_jobs();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].queue, "Test Queue");
    assert_eq!(pending[0].name, "Test Job 1");

    queue.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(queue.processing_jobs().len(), 1);
    assert!(queue.pending_jobs().is_empty());

    wait_terminal(&queue, &id, Duration::from_secs(3)).await;
    let recent = queue.recent_completed_jobs(Duration::from_secs(60));
    assert!(recent.iter().any(|job| job.name == "Test Job 1"));

    queue.shutdown().await;
}
