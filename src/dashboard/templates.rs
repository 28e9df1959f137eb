use chrono::{DateTime, Utc};

use crate::job::{JobInfo, JobStatus};

/// Overview URL for a dashboard mounted at `base` (`""` for the root).
pub fn home(base: &str) -> String {
    if base.is_empty() {
        "/".to_string()
    } else {
        base.to_string()
    }
}

fn layout(title: &str, base: &str, content: &str) -> String {
    let home_url = home(base);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - Job Queues</title>
    <style>
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #f5f5f5; color: #333; line-height: 1.6; }}
        .container {{ max-width: 1200px; margin: 0 auto; padding: 20px; }}
        header {{ background: #2563eb; color: white; padding: 20px; margin-bottom: 20px; }}
        header h1 {{ font-size: 1.5rem; }}
        nav {{ background: white; padding: 10px 20px; margin-bottom: 20px; border-radius: 8px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }}
        nav a {{ color: #2563eb; text-decoration: none; margin-right: 20px; padding: 8px 16px; border-radius: 4px; }}
        nav a:hover {{ background: #eff6ff; }}
        .stats {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(150px, 1fr)); gap: 20px; margin-bottom: 30px; }}
        .stat-card {{ background: white; padding: 20px; border-radius: 8px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); text-align: center; }}
        .stat-card h3 {{ font-size: 2rem; color: #2563eb; }}
        .stat-card p {{ color: #666; text-transform: uppercase; font-size: 0.8rem; }}
        .card {{ background: white; border-radius: 8px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); overflow: hidden; }}
        .card-header {{ background: #f8fafc; padding: 15px 20px; border-bottom: 1px solid #e5e7eb; font-weight: 600; }}
        table {{ width: 100%; border-collapse: collapse; }}
        th, td {{ padding: 12px 20px; text-align: left; border-bottom: 1px solid #e5e7eb; }}
        th {{ background: #f8fafc; font-weight: 600; color: #666; font-size: 0.85rem; text-transform: uppercase; }}
        tr:hover {{ background: #f8fafc; }}
        .badge {{ display: inline-block; padding: 4px 12px; border-radius: 20px; font-size: 0.75rem; font-weight: 600; }}
        .badge-pending {{ background: #dbeafe; color: #1d4ed8; }}
        .badge-processing {{ background: #fef3c7; color: #d97706; }}
        .badge-success {{ background: #d1fae5; color: #059669; }}
        .badge-failed {{ background: #fee2e2; color: #dc2626; }}
        .badge-cancelled {{ background: #e5e7eb; color: #4b5563; }}
        .btn {{ display: inline-block; padding: 6px 12px; border: none; border-radius: 4px; font-size: 0.85rem; cursor: pointer; }}
        .btn-danger {{ background: #dc2626; color: white; }}
        .btn-sm {{ padding: 4px 8px; font-size: 0.75rem; }}
        .error-text {{ color: #dc2626; font-size: 0.85rem; }}
        .mono {{ font-family: monospace; font-size: 0.85rem; }}
        .empty-state {{ text-align: center; padding: 40px; color: #666; }}
    </style>
</head>
<body>
    <header><div class="container"><h1>Job Queues</h1></div></header>
    <div class="container">
        <nav>
            <a href="{home_url}">Jobs</a>
            <a href="{base}/api/jobs">JSON</a>
        </nav>
        {content}
    </div>
</body>
</html>"#
    )
}

fn status_badge(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "badge-pending",
        JobStatus::Processing => "badge-processing",
        JobStatus::Success => "badge-success",
        JobStatus::Failed => "badge-failed",
        JobStatus::Cancelled => "badge-cancelled",
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn render_stats(jobs: &[JobInfo]) -> String {
    let count = |status: JobStatus| jobs.iter().filter(|job| job.status == status).count();
    format!(
        r#"<div class="stats">
            <div class="stat-card"><h3>{}</h3><p>Pending</p></div>
            <div class="stat-card"><h3>{}</h3><p>Processing</p></div>
            <div class="stat-card"><h3>{}</h3><p>Success</p></div>
            <div class="stat-card"><h3>{}</h3><p>Failed</p></div>
            <div class="stat-card"><h3>{}</h3><p>Cancelled</p></div>
        </div>"#,
        count(JobStatus::Pending),
        count(JobStatus::Processing),
        count(JobStatus::Success),
        count(JobStatus::Failed),
        count(JobStatus::Cancelled),
    )
}

pub fn render_jobs(jobs: &[JobInfo], base: &str) -> String {
    let rows = if jobs.is_empty() {
        r#"<tr><td colspan="8" class="empty-state">No recent jobs</td></tr>"#.to_string()
    } else {
        jobs.iter()
            .map(|job| {
                let error_display = match &job.error {
                    Some(error) => format!(r#"<br><span class="error-text">{}</span>"#, html_escape(error)),
                    None => String::new(),
                };
                let actions = if job.status == JobStatus::Pending {
                    format!(
                        r#"<form style="display:inline" method="post" action="{}/jobs/{}/cancel"><button class="btn btn-danger btn-sm">Cancel</button></form>"#,
                        base, job.id
                    )
                } else {
                    String::new()
                };
                let id = job.id.to_string();
                format!(
                    r#"<tr><td class="mono">{}</td><td>{}</td><td>{}</td><td><span class="badge {}">{}</span>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
                    &id[..8],
                    html_escape(&job.name),
                    html_escape(&job.queue),
                    status_badge(job.status),
                    job.status,
                    error_display,
                    job.queued_at.format("%Y-%m-%d %H:%M:%S"),
                    timestamp(job.started_at),
                    timestamp(job.completed_at),
                    actions
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let content = format!(
        r#"{}<div class="card"><div class="card-header">Recent Jobs</div>
        <table><thead><tr><th>ID</th><th>Name</th><th>Queue</th><th>Status</th><th>Queued</th><th>Started</th><th>Completed</th><th>Actions</th></tr></thead>
        <tbody>{}</tbody></table></div>"#,
        render_stats(jobs),
        rows
    );
    layout("Jobs", base, &content)
}
