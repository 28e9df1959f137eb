mod templates;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::job::{JobId, JobInfo};
use crate::registry::JobRegistry;

#[derive(Clone)]
struct DashboardState {
    registry: Arc<JobRegistry>,
    recent_window: Duration,
    base: Arc<str>,
}

/// Admin routes: an HTML overview, the same list as JSON, and cancellation.
pub fn router(registry: Arc<JobRegistry>, recent_window: Duration) -> Router {
    router_at(registry, recent_window, "")
}

/// Same routes, for a router nested under `base` (e.g. `/admin/jobs`). Links
/// and redirects in the pages carry the prefix.
pub fn router_at(registry: Arc<JobRegistry>, recent_window: Duration, base: &str) -> Router {
    let state = DashboardState {
        registry,
        recent_window,
        base: base.trim_end_matches('/').into(),
    };

    Router::new()
        .route("/", get(overview))
        .route("/api/jobs", get(jobs_json))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .with_state(state)
}

/// Pending, running, and recently finished jobs, newest submission first.
fn visible_jobs(state: &DashboardState) -> Vec<JobInfo> {
    let mut jobs = state.registry.pending_jobs();
    jobs.extend(state.registry.processing_jobs());
    jobs.extend(state.registry.recent_completed_jobs(state.recent_window));
    jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
    jobs
}

async fn overview(State(state): State<DashboardState>) -> Html<String> {
    Html(templates::render_jobs(&visible_jobs(&state), &state.base))
}

async fn jobs_json(State(state): State<DashboardState>) -> Json<Vec<JobInfo>> {
    Json(visible_jobs(&state))
}

async fn cancel_job(State(state): State<DashboardState>, Path(id): Path<String>) -> Redirect {
    if let Ok(id) = id.parse::<JobId>() {
        let cancelled = state.registry.cancel(&id);
        info!(job_id = %id, cancelled, "Cancel requested from dashboard");
    }
    Redirect::to(&templates::home(&state.base))
}
