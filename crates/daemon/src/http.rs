//! HTTP surface of the daemon.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use tender_core::api::{
    CreateTaskRequest, HealthResponse, MessageResponse, StatsResponse,
    TaskResultResponse, TaskStatusResponse,
};
use tender_core::validation::validate_tender_url;

use crate::auth::require_api_key;
use crate::config::DaemonConfig;
use crate::db::Db;
use crate::manager::TaskManager;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Task lifecycle owner.
    pub manager: Arc<TaskManager>,
    /// Durable store, used directly by health checks.
    pub db: Db,
    /// Runtime configuration.
    pub config: Arc<DaemonConfig>,
    /// Process start, for uptime reporting.
    pub started: Instant,
}

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request was syntactically or semantically invalid.
    #[error("{0}")]
    BadRequest(String),
    /// No such resource.
    #[error("{0}")]
    NotFound(String),
    /// Credentials missing.
    #[error("{0}")]
    Unauthorized(String),
    /// Credentials present but wrong.
    #[error("{0}")]
    Forbidden(String),
    /// Anything unexpected.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(err) => {
                error!(error = %err, "internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the versioned router. Everything except health and ping sits
/// behind the API-key middleware.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/parse", post(create_task))
        .route("/task/{task_id}/status", get(task_status))
        .route("/task/{task_id}/result", get(task_result))
        .route("/task/{task_id}", delete(delete_task))
        .route("/task/{task_id}/fail", post(fail_task))
        .route("/cleanup", post(cleanup))
        .route("/stats", get(stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .route("/ping", get(ping));

    Router::new()
        .nest("/api/v1", protected.merge(public))
        .with_state(state)
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    validate_tender_url(&req.url).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let task_id = state.manager.submit(req.url.clone()).await?;
    info!(%task_id, url = %req.url, "accepted parse task");

    let status = state
        .manager
        .status(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not found")))?;
    Ok(Json(status))
}

async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let status = state
        .manager
        .status(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not found")))?;
    Ok(Json(status))
}

async fn task_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResultResponse>, ApiError> {
    let result = state
        .manager
        .result(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not found")))?;
    Ok(Json(result))
}

/// Drops a task from the in-memory active set. The durable record is
/// kept; an in-flight extraction still runs to completion.
async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if state.manager.remove_active(&task_id).await {
        return Ok(Json(MessageResponse {
            message: format!("task {task_id} removed from tracking"),
        }));
    }
    match state.manager.status(&task_id).await? {
        Some(_) => Ok(Json(MessageResponse {
            message: format!("task {task_id} already finished"),
        })),
        None => Err(ApiError::NotFound(format!("task {task_id} not found"))),
    }
}

/// Operator action for tasks stranded in `processing` by a crash.
async fn fail_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if state.manager.status(&task_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("task {task_id} not found")));
    }
    if state.manager.fail_orphaned(&task_id).await? {
        Ok(Json(MessageResponse {
            message: format!("task {task_id} marked failed"),
        }))
    } else {
        Err(ApiError::BadRequest(format!(
            "task {task_id} is live or already finished"
        )))
    }
}

#[derive(Debug, Deserialize)]
struct CleanupParams {
    hours: Option<u64>,
}

/// Ten years; anything above is a typo, not a retention policy.
const MAX_CLEANUP_HOURS: u64 = 24 * 365 * 10;

async fn cleanup(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> Result<Json<MessageResponse>, ApiError> {
    let hours = params.hours.unwrap_or(state.config.cleanup_hours);
    if hours == 0 || hours > MAX_CLEANUP_HOURS {
        return Err(ApiError::BadRequest(format!(
            "hours must be between 1 and {MAX_CLEANUP_HOURS}"
        )));
    }
    let removed = state.manager.cleanup(hours).await?;
    Ok(Json(MessageResponse {
        message: format!("removed {removed} finished tasks older than {hours}h"),
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    Ok(Json(state.manager.stats().await?))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let storage = match state.db.ping().await {
        Ok(()) => "connected".to_string(),
        Err(err) => {
            error!(error = %err, "storage ping failed");
            "unavailable".to_string()
        }
    };
    let status = if storage == "connected" {
        "healthy"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status: status.to_string(),
        storage,
        tasks_in_memory: state.manager.active_count().await,
        uptime_seconds: state.started.elapsed().as_secs_f64(),
    })
}

async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "pong".to_string(),
    })
}
