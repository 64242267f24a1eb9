//! Embedded document store for tasks and tenders.
//!
//! Status transitions are conditional updates keyed on the current
//! status, which makes every transition race-safe and monotonic.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use surrealdb::engine::local::{Mem, SurrealKv};
use surrealdb::Surreal;
use tender_core::api::ResultSummary;
use tender_core::model::{TaskStatus, TenderData};
use tender_core::now_ms;

/// Embedded SurrealDB connection type.
pub type SurrealConn = surrealdb::engine::local::Db;
/// Embedded SurrealDB handle.
pub type SurrealDb = Surreal<SurrealConn>;

/// Handle over the task and tender stores.
#[derive(Clone)]
pub struct Db {
    inner: SurrealDb,
}

/// Durable record of one parse task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    /// Public task identifier (UUIDv4).
    pub task_id: String,
    /// The submitted notice URL.
    pub url: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Creation time, epoch milliseconds.
    pub created_ms: i64,
    /// Last transition time, epoch milliseconds.
    pub updated_ms: i64,
    /// Set when the task enters `processing`.
    #[serde(default)]
    pub started_ms: Option<i64>,
    /// Set when the task reaches a terminal state.
    #[serde(default)]
    pub completed_ms: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<ResultSummary>,
    /// Extraction wall-clock time in seconds, set on the terminal transition.
    #[serde(default)]
    pub processing_secs: Option<f64>,
}

impl TaskRow {
    /// Fresh `pending` row for a newly submitted URL.
    pub fn new_pending(task_id: String, url: String) -> Self {
        let now = now_ms();
        Self {
            task_id,
            url,
            status: TaskStatus::Pending,
            created_ms: now,
            updated_ms: now,
            started_ms: None,
            completed_ms: None,
            error: None,
            result: None,
            processing_secs: None,
        }
    }
}

/// Durable record of the latest known state of one tender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderRow {
    /// Record key, also used as the surreal record id. A separate field
    /// because the engine's own `id` comes back as a Thing, not a string.
    pub store_id: String,
    /// Natural key: registration number on the portal.
    pub tender_number: String,
    /// Latest extracted payload.
    pub data: TenderData,
    /// When the payload was last written, epoch milliseconds.
    pub parsed_ms: i64,
}

#[derive(Debug, Deserialize)]
struct StatusCount {
    status: String,
    count: i64,
}

impl Db {
    /// Opens (creating if needed) the embedded SurrealKV store under `dir`.
    pub async fn connect(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating db dir {}", dir.display()))?;

        let path = dir
            .to_str()
            .context("db dir must be valid utf-8")?
            .to_string();

        let inner = Surreal::new::<SurrealKv>(path)
            .await
            .context("connecting to embedded SurrealKV")?;
        inner
            .use_ns("tender")
            .use_db("main")
            .await
            .context("selecting surreal namespace/db")?;

        Ok(Self { inner })
    }

    /// In-memory store for tests.
    pub async fn connect_memory() -> Result<Self> {
        let inner = Surreal::new::<Mem>(())
            .await
            .context("connecting to in-memory surreal engine")?;
        inner
            .use_ns("tender")
            .use_db("main")
            .await
            .context("selecting surreal namespace/db")?;
        Ok(Self { inner })
    }

    /// Applies table and index definitions.
    pub async fn apply_schema(&self) -> Result<()> {
        let schema = include_str!("../schema.surql");
        self.inner.query(schema).await.context("applying schema")?;
        Ok(())
    }

    /// Cheap liveness probe for health checks.
    pub async fn ping(&self) -> Result<()> {
        self.inner.query("RETURN 1;").await.context("pinging db")?;
        Ok(())
    }

    // ---- task store ----

    /// Writes a new task row. Durable before `submit` returns its id.
    pub async fn create_task(&self, row: &TaskRow) -> Result<()> {
        let _: Option<TaskRow> = self
            .inner
            .create(("task", row.task_id.clone()))
            .content(row.clone())
            .await
            .context("creating task row")?;
        Ok(())
    }

    /// Conditionally moves a task from `pending` to `processing`.
    ///
    /// Returns the updated row, or `None` when the task was not in `pending`
    /// (already claimed by another execution unit, finished, or unknown).
    /// This is the admission guard that keeps a double-scheduled task from
    /// running twice.
    pub async fn claim_task(&self, task_id: &str) -> Result<Option<TaskRow>> {
        let now = now_ms();
        let mut res = self
            .inner
            .query(
                "UPDATE task SET status = 'processing', started_ms = $now, updated_ms = $now \
                 WHERE task_id = $id AND status = 'pending' RETURN AFTER;",
            )
            .bind(("id", task_id.to_string()))
            .bind(("now", now))
            .await
            .context("claiming task")?;
        let rows: Vec<TaskRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Conditionally moves a task from `processing` to `completed`.
    pub async fn complete_task(
        &self,
        task_id: &str,
        summary: &ResultSummary,
        processing_secs: f64,
    ) -> Result<bool> {
        let now = now_ms();
        let mut res = self
            .inner
            .query(
                "UPDATE task SET status = 'completed', result = $result, \
                 completed_ms = $now, updated_ms = $now, processing_secs = $secs \
                 WHERE task_id = $id AND status = 'processing' RETURN AFTER;",
            )
            .bind(("id", task_id.to_string()))
            .bind(("result", summary.clone()))
            .bind(("now", now))
            .bind(("secs", processing_secs))
            .await
            .context("completing task")?;
        let rows: Vec<TaskRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    /// Conditionally moves a task from `processing` (or `pending`, for
    /// wreckage that never got claimed) to `failed`.
    pub async fn fail_task(
        &self,
        task_id: &str,
        error: &str,
        processing_secs: f64,
    ) -> Result<bool> {
        let now = now_ms();
        let mut res = self
            .inner
            .query(
                "UPDATE task SET status = 'failed', error = $error, \
                 completed_ms = $now, updated_ms = $now, processing_secs = $secs \
                 WHERE task_id = $id AND (status = 'processing' OR status = 'pending') \
                 RETURN AFTER;",
            )
            .bind(("id", task_id.to_string()))
            .bind(("error", error.to_string()))
            .bind(("now", now))
            .bind(("secs", processing_secs))
            .await
            .context("failing task")?;
        let rows: Vec<TaskRow> = res.take(0)?;
        Ok(!rows.is_empty())
    }

    /// Reads one task row by its public identifier.
    pub async fn find_task(&self, task_id: &str) -> Result<Option<TaskRow>> {
        let mut res = self
            .inner
            .query("SELECT * FROM task WHERE task_id = $id LIMIT 1;")
            .bind(("id", task_id.to_string()))
            .await
            .context("finding task")?;
        let row: Option<TaskRow> = res.take(0)?;
        Ok(row)
    }

    /// All rows not yet in a terminal state, oldest first.
    pub async fn find_active_tasks(&self) -> Result<Vec<TaskRow>> {
        let mut res = self
            .inner
            .query(
                "SELECT * FROM task WHERE status = 'pending' OR status = 'processing' \
                 ORDER BY created_ms ASC;",
            )
            .await
            .context("finding active tasks")?;
        let rows: Vec<TaskRow> = res.take(0)?;
        Ok(rows)
    }

    /// Deletes terminal tasks whose completion is older than `cutoff_ms`.
    /// Returns the number of rows removed. Tender rows are never touched.
    pub async fn delete_finished_before(&self, cutoff_ms: i64) -> Result<usize> {
        let mut res = self
            .inner
            .query(
                "DELETE task WHERE (status = 'completed' OR status = 'failed') \
                 AND completed_ms != NONE AND completed_ms < $cutoff RETURN BEFORE;",
            )
            .bind(("cutoff", cutoff_ms))
            .await
            .context("deleting old tasks")?;
        let rows: Vec<TaskRow> = res.take(0)?;
        Ok(rows.len())
    }

    /// Durable task counts keyed by status string.
    pub async fn task_stats(&self) -> Result<BTreeMap<String, i64>> {
        let mut res = self
            .inner
            .query("SELECT status, count() AS count FROM task GROUP BY status;")
            .await
            .context("aggregating task stats")?;
        let rows: Vec<StatusCount> = res.take(0)?;
        Ok(rows.into_iter().map(|r| (r.status, r.count)).collect())
    }

    // ---- tender store ----

    /// Creates or overwrites the tender keyed by its registration number.
    /// Returns the store id of the row.
    pub async fn upsert_tender(&self, data: &TenderData) -> Result<String> {
        let number = data.tender_info.tender_number.clone();
        let now = now_ms();

        let existing = self.find_tender_by_number(&number).await?;
        if let Some(row) = existing {
            self.inner
                .query(
                    "UPDATE tender SET data = $data, parsed_ms = $now \
                     WHERE tender_number = $number;",
                )
                .bind(("data", data.clone()))
                .bind(("now", now))
                .bind(("number", number.clone()))
                .await
                .context("updating tender")?;
            tracing::info!(tender_number = %number, "updated existing tender");
            return Ok(row.store_id);
        }

        let row = TenderRow {
            store_id: ulid::Ulid::new().to_string(),
            tender_number: number.clone(),
            data: data.clone(),
            parsed_ms: now,
        };
        let _: Option<TenderRow> = self
            .inner
            .create(("tender", row.store_id.clone()))
            .content(row.clone())
            .await
            .context("creating tender")?;
        tracing::info!(tender_number = %number, "created new tender");
        Ok(row.store_id)
    }

    /// Looks a tender up by its natural key.
    pub async fn find_tender_by_number(&self, number: &str) -> Result<Option<TenderRow>> {
        let mut res = self
            .inner
            .query("SELECT * FROM tender WHERE tender_number = $number LIMIT 1;")
            .bind(("number", number.to_string()))
            .await
            .context("finding tender")?;
        let row: Option<TenderRow> = res.take(0)?;
        Ok(row)
    }
}
