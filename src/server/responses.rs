//! Response bodies for the status endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::html::escape_html;
use crate::core::StatusSnapshot;
use crate::domain::stage::title_from_id;
use crate::domain::{Phase, SchedulerState, Stage};

/// One stage in the aggregate status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStatusResponse {
    pub id: String,
    pub title: String,
    pub route: Option<String>,
    pub phase: Phase,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// Scheduler part of the aggregate status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatusResponse {
    pub state: SchedulerState,
    pub next_tick_at: Option<DateTime<Utc>>,
    pub failed_stage: Option<String>,
    pub halted_at: Option<DateTime<Utc>>,
    pub last_run_id: Option<Uuid>,
    pub last_run_started_at: Option<DateTime<Utc>>,
    pub last_run_finished_at: Option<DateTime<Utc>>,
    pub runs_started: u64,
}

/// `GET /api/status` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub stages: Vec<StageStatusResponse>,
    pub scheduler: SchedulerStatusResponse,
}

impl From<&StatusSnapshot> for StatusResponse {
    fn from(snapshot: &StatusSnapshot) -> Self {
        let stages = snapshot
            .stages
            .iter()
            .map(|stage| StageStatusResponse {
                id: stage.id.clone(),
                title: title_from_id(&stage.id),
                route: stage.route.clone(),
                phase: stage.state.phase,
                started_at: stage.state.started_at,
                finished_at: stage.state.finished_at,
                duration_ms: stage.state.duration_ms(),
                error_detail: stage.state.error_detail.clone(),
            })
            .collect();

        let pipeline = &snapshot.pipeline;
        let state = pipeline.scheduler_state();
        let scheduler = SchedulerStatusResponse {
            state,
            next_tick_at: match state {
                SchedulerState::Active => pipeline.next_scheduled_at,
                SchedulerState::Halted => None,
            },
            failed_stage: pipeline.failed_stage.clone(),
            halted_at: pipeline.halted_at,
            last_run_id: pipeline.last_run_id,
            last_run_started_at: pipeline.last_run_started_at,
            last_run_finished_at: pipeline.last_run_finished_at,
            runs_started: pipeline.runs_started,
        };

        Self { stages, scheduler }
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Navigation page for `GET /`
pub fn index_html(status: &StatusResponse) -> String {
    let mut html = String::from(
        "<html><head><meta charset=\"utf-8\"><title>Pipeline status</title></head><body><h1>Stages</h1><ul>",
    );

    for stage in &status.stages {
        let name = match stage.route {
            Some(ref route) => format!(
                "<a href=\"/{}\">{}</a>",
                escape_html(route),
                escape_html(&stage.title)
            ),
            None => escape_html(&stage.title),
        };
        html.push_str(&format!(
            "<li>{} - <strong>{}</strong> (started {}, finished {})",
            name,
            stage.phase.label(),
            format_time(stage.started_at),
            format_time(stage.finished_at),
        ));
        if let Some(ref detail) = stage.error_detail {
            html.push_str(&format!("<pre>{}</pre>", escape_html(detail)));
        }
        html.push_str("</li>");
    }
    html.push_str("</ul><h2>Scheduler Status</h2>");

    let scheduler = &status.scheduler;
    match scheduler.state {
        SchedulerState::Active => match scheduler.next_tick_at {
            Some(next) => html.push_str(&format!(
                "<p>The scheduler is running, next run scheduled to {}</p>",
                format_time(Some(next))
            )),
            None => html.push_str("<p>The scheduler is running</p>"),
        },
        SchedulerState::Halted => {
            html.push_str("<p>The scheduler is stopped, see error logs</p>");
            if let Some(ref stage) = scheduler.failed_stage {
                html.push_str(&format!(
                    "<p>Halted by failure of stage <strong>{}</strong> at {}</p>",
                    escape_html(stage),
                    format_time(scheduler.halted_at)
                ));
            }
        }
    }

    html.push_str("</body></html>");
    html
}

/// Placeholder page for a stage without a report
pub fn placeholder_html(stage: &Stage, message: &str, detail: Option<&str>) -> String {
    let mut html = format!(
        "<html><head><meta charset=\"utf-8\"><title>{title}</title></head><body><h1>{title}</h1><p>{message}</p>",
        title = escape_html(&stage.title()),
        message = escape_html(message),
    );
    if let Some(detail) = detail {
        html.push_str(&format!("<pre>{}</pre>", escape_html(detail)));
    }
    html.push_str("<p><a href=\"/\">Back to status</a></p></body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StageRegistry, StatusStore};

    fn snapshot() -> StatusSnapshot {
        let registry = StageRegistry::new(vec![
            Stage::new("load_data", "load"),
            Stage::unrouted("cleanup"),
        ])
        .unwrap();
        StatusStore::new(&registry).snapshot()
    }

    #[test]
    fn test_status_response_from_snapshot() {
        let response = StatusResponse::from(&snapshot());
        assert_eq!(response.stages.len(), 2);
        assert_eq!(response.stages[0].title, "Load Data");
        assert_eq!(response.stages[0].phase, Phase::Pending);
        assert_eq!(response.scheduler.state, SchedulerState::Active);
    }

    #[test]
    fn test_index_links_only_routed_stages() {
        let html = index_html(&StatusResponse::from(&snapshot()));
        assert!(html.contains("<a href=\"/load\">Load Data</a>"));
        assert!(html.contains("Cleanup"));
        assert!(!html.contains("href=\"/cleanup\""));
        assert!(html.contains("The scheduler is running"));
    }

    #[test]
    fn test_placeholder_escapes_detail() {
        let html = placeholder_html(&Stage::new("a", "r"), "errored", Some("<boom>"));
        assert!(html.contains("&lt;boom&gt;"));
    }
}
