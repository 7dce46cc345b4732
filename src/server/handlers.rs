//! HTTP handlers for the status surface.
//!
//! Handlers only read the status store; nothing here triggers execution.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::core::{StageRegistry, StatusStore};
use crate::domain::Phase;

use super::error::{ApiError, ApiResult};
use super::responses::{index_html, placeholder_html, StatusResponse};

/// Query parameters for the index page
#[derive(Debug, Default, Deserialize)]
pub struct IndexQuery {
    /// `json` to force a JSON body
    pub format: Option<String>,
}

/// State shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Stage list and route map
    pub registry: Arc<StageRegistry>,

    /// Read-only view of run state
    pub store: Arc<StatusStore>,
}

impl AppState {
    pub fn new(registry: Arc<StageRegistry>, store: Arc<StatusStore>) -> Self {
        Self { registry, store }
    }

    fn status(&self) -> StatusResponse {
        StatusResponse::from(&self.store.snapshot())
    }
}

fn wants_json(headers: &HeaderMap, query: &IndexQuery) -> bool {
    if let Some(ref format) = query.format {
        return format.eq_ignore_ascii_case("json");
    }

    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json") && !accept.contains("text/html"))
        .unwrap_or(false)
}

/// GET / - Navigation page with stage and scheduler status
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
    headers: HeaderMap,
) -> Response {
    let status = state.status();
    if wants_json(&headers, &query) {
        Json(status).into_response()
    } else {
        Html(index_html(&status)).into_response()
    }
}

/// GET /api/status - Aggregate status as JSON
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.status())
}

/// GET /api/health - Liveness check
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "stagepipe",
        "version": env!("CARGO_PKG_VERSION"),
        "stages": state.registry.len(),
    }))
}

/// GET /:route - Latest rendered report of the stage served under `route`
pub async fn stage_report(
    Path(route): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let stage = state
        .registry
        .stage_for_route(&route)
        .ok_or_else(|| ApiError::not_found(format!("/{}", route)))?;

    let snapshot = state.store.snapshot();
    let entry = snapshot
        .stage(&stage.id)
        .ok_or_else(|| ApiError::internal(format!("Stage '{}' missing from status", stage.id)))?;

    if let Some(ref path) = entry.rendered {
        return match tokio::fs::read(path).await {
            Ok(bytes) => {
                debug!(stage = %stage.id, path = %path.display(), "Serving report");
                Ok((
                    [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                    bytes,
                )
                    .into_response())
            }
            Err(e) => {
                warn!(stage = %stage.id, path = %path.display(), error = %e, "Report unreadable");
                Err(ApiError::artifact_missing(&stage.id))
            }
        };
    }

    let response = match entry.state.phase {
        Phase::Pending => (
            StatusCode::ACCEPTED,
            Html(placeholder_html(stage, "This stage has not yet run.", None)),
        )
            .into_response(),
        Phase::Running => (
            StatusCode::ACCEPTED,
            Html(placeholder_html(stage, "This stage is running.", None)),
        )
            .into_response(),
        Phase::Errored => (
            StatusCode::OK,
            Html(placeholder_html(
                stage,
                "This stage errored; see detail below.",
                entry.state.error_detail.as_deref(),
            )),
        )
            .into_response(),
        Phase::Complete => return Err(ApiError::artifact_missing(&stage.id)),
    };

    Ok(response)
}

/// Create router with all status endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/health", get(health_check))
        .route("/:route", get(stage_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wants_json_from_query() {
        let headers = HeaderMap::new();
        let query = IndexQuery {
            format: Some("JSON".to_string()),
        };
        assert!(wants_json(&headers, &query));
    }

    #[test]
    fn test_wants_json_from_accept() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(wants_json(&headers, &IndexQuery::default()));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/json;q=0.9"),
        );
        assert!(!wants_json(&headers, &IndexQuery::default()));
    }
}
