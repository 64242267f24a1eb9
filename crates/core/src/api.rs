//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};

use crate::model::{TaskStatus, TenderData};

/// Request body for `POST /parse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    /// Notice URL on the procurement portal; must carry `regNumber`.
    pub url: String,
}

/// Cheap summary persisted on the task when extraction succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Store id of the upserted tender record.
    pub tender_id: String,
    /// Registration number of the tender.
    pub tender_number: String,
    /// Number of extracted line items.
    pub items_count: usize,
    /// Number of extracted attachments.
    pub documents_count: usize,
}

/// Projection returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    /// Task identifier.
    pub task_id: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the last transition.
    pub updated_at: i64,
    /// The submitted notice URL.
    pub url: String,
    /// Failure message, for failed tasks.
    #[serde(default)]
    pub error: Option<String>,
    /// Whether a result query will return data.
    #[serde(default)]
    pub result_available: bool,
}

/// Full outcome returned by result queries.
///
/// For a task that has not reached a terminal state only `task_id`, `status`,
/// `created_at` and (if any) `error` are populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultResponse {
    /// Task identifier.
    pub task_id: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Result summary, for completed tasks.
    #[serde(default)]
    pub summary: Option<ResultSummary>,
    /// Extracted tender payload; present only for completed tasks.
    #[serde(default)]
    pub data: Option<TenderData>,
    /// Failure message, for failed tasks.
    #[serde(default)]
    pub error: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the terminal transition.
    #[serde(default)]
    pub completed_at: Option<i64>,
    /// Wall-clock extraction time in seconds.
    #[serde(default)]
    pub processing_time: Option<f64>,
}

/// Task counts for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Durable task counts keyed by status string.
    pub by_status: std::collections::BTreeMap<String, i64>,
    /// Size of the in-memory active-task tracking set.
    pub active_tasks: usize,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded".
    pub status: String,
    /// Storage probe outcome, "connected" or "unavailable".
    pub storage: String,
    /// Size of the active-task tracking set.
    pub tasks_in_memory: usize,
    /// Seconds since the daemon started.
    pub uptime_seconds: f64,
}

/// Generic message envelope for mutating endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}
