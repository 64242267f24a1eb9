//! Task manager: the state machine and concurrency core.
//!
//! Every submitted URL becomes one durable task driven through
//! `pending -> processing -> {completed | failed}` by a single spawned
//! execution unit. A process-wide semaphore bounds how many extractions run
//! at once; the durable task store stays authoritative for status while the
//! in-memory active set only tracks liveness.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use tender_core::api::{ResultSummary, StatsResponse, TaskResultResponse, TaskStatusResponse};
use tender_core::model::TaskStatus;
use tender_core::new_task_id;

use crate::db::{Db, TaskRow};
use crate::extract::Extractor;

/// Error text recorded when an operator fails an orphaned task.
const ORPHAN_ERROR: &str = "marked failed by operator after restart";

/// In-memory task tracking. Never authoritative for status.
///
/// `active` mirrors the non-terminal rows this process knows about,
/// including orphans found at recovery. `live` is the strict subset with
/// an execution unit spawned in this process.
#[derive(Default)]
struct Tracking {
    active: HashSet<String>,
    live: HashSet<String>,
}

/// Owns task lifecycle, admission control and recovery.
pub struct TaskManager {
    db: Db,
    extractor: Arc<dyn Extractor>,
    /// Concurrency gate: one permit per live browser session.
    gate: Arc<Semaphore>,
    tracking: Mutex<Tracking>,
}

impl TaskManager {
    /// Builds a manager with a gate of `max_concurrent` permits.
    pub fn new(db: Db, extractor: Arc<dyn Extractor>, max_concurrent: usize) -> Self {
        Self {
            db,
            extractor,
            gate: Arc::new(Semaphore::new(max_concurrent)),
            tracking: Mutex::new(Tracking::default()),
        }
    }

    /// Accepts a pre-validated URL, durably records a `pending` task and
    /// schedules its execution unit. Returns the task id without waiting for
    /// extraction; a status query issued right after always finds the row.
    pub async fn submit(self: &Arc<Self>, url: String) -> Result<String> {
        let task_id = new_task_id();
        let row = TaskRow::new_pending(task_id.clone(), url.clone());

        // Durable write first, then the in-memory insert, then the spawn.
        self.db.create_task(&row).await?;
        {
            let mut tracking = self.tracking.lock().await;
            tracking.active.insert(task_id.clone());
            tracking.live.insert(task_id.clone());
        }
        tokio::spawn(Arc::clone(self).run(task_id.clone()));

        info!(task_id = %task_id, url = %url, "task created");
        Ok(task_id)
    }

    /// Background execution unit for one task. Holds a gate permit for the
    /// duration of the extraction; the permit and the tracking entries are
    /// released on every exit path.
    async fn run(self: Arc<Self>, task_id: String) {
        let permit = match Arc::clone(&self.gate).acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                // Gate closed: process is shutting down.
                self.untrack(&task_id).await;
                return;
            }
        };

        self.execute(&task_id).await;

        drop(permit);
        self.untrack(&task_id).await;
    }

    async fn untrack(&self, task_id: &str) {
        let mut tracking = self.tracking.lock().await;
        tracking.active.remove(task_id);
        tracking.live.remove(task_id);
    }

    /// Error boundary around one extraction attempt. Nothing may escape
    /// here: an unhandled error would leave the task stuck in `processing`.
    async fn execute(&self, task_id: &str) {
        // Admission guard: only one execution unit moves a task out of
        // `pending`. The loser of a double schedule exits silently.
        let task = match self.db.claim_task(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!(task_id = %task_id, "task not claimable, skipping");
                return;
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "claiming task failed");
                return;
            }
        };

        info!(task_id = %task_id, url = %task.url, "extraction started");
        let started = Instant::now();

        match self.extractor.extract(&task.url).await {
            Ok(data) => {
                let secs = started.elapsed().as_secs_f64();
                match self.db.upsert_tender(&data).await {
                    Ok(tender_id) => {
                        let summary = ResultSummary {
                            tender_id,
                            tender_number: data.tender_info.tender_number.clone(),
                            items_count: data.items.len(),
                            documents_count: data.attachments.len(),
                        };
                        match self.db.complete_task(task_id, &summary, secs).await {
                            Ok(true) => {
                                info!(task_id = %task_id, secs, "task completed")
                            }
                            Ok(false) => {
                                warn!(task_id = %task_id, "task no longer in processing, completion dropped")
                            }
                            Err(e) => {
                                error!(task_id = %task_id, error = %e, "persisting completion failed")
                            }
                        }
                    }
                    Err(e) => {
                        // The extraction succeeded but the record is lost;
                        // surface that as a task failure, not a stuck task.
                        let msg = format!("storage error: {e}");
                        error!(task_id = %task_id, error = %e, "tender upsert failed");
                        if let Err(e2) = self.db.fail_task(task_id, &msg, secs).await {
                            error!(task_id = %task_id, error = %e2, "persisting failure failed");
                        }
                    }
                }
            }
            Err(e) => {
                let secs = started.elapsed().as_secs_f64();
                warn!(task_id = %task_id, error = %e, secs, "extraction failed");
                if let Err(e2) = self.db.fail_task(task_id, &e.to_string(), secs).await {
                    error!(task_id = %task_id, error = %e2, "persisting failure failed");
                }
            }
        }
    }

    /// Status projection read from the durable store only.
    pub async fn status(&self, task_id: &str) -> Result<Option<TaskStatusResponse>> {
        let Some(row) = self.db.find_task(task_id).await? else {
            return Ok(None);
        };
        Ok(Some(TaskStatusResponse {
            task_id: row.task_id,
            status: row.status,
            created_at: row.created_ms,
            updated_at: row.updated_ms,
            url: row.url,
            error: row.error,
            result_available: row.status == TaskStatus::Completed,
        }))
    }

    /// Full outcome for terminal tasks; a partial view while still running.
    pub async fn result(&self, task_id: &str) -> Result<Option<TaskResultResponse>> {
        let Some(row) = self.db.find_task(task_id).await? else {
            return Ok(None);
        };

        if !row.status.is_terminal() {
            return Ok(Some(TaskResultResponse {
                task_id: row.task_id,
                status: row.status,
                summary: None,
                data: None,
                error: row.error,
                created_at: row.created_ms,
                completed_at: None,
                processing_time: None,
            }));
        }

        let data = match &row.result {
            Some(summary) => self
                .db
                .find_tender_by_number(&summary.tender_number)
                .await?
                .map(|t| t.data),
            None => None,
        };

        Ok(Some(TaskResultResponse {
            task_id: row.task_id,
            status: row.status,
            summary: row.result,
            data,
            error: row.error,
            created_at: row.created_ms,
            completed_at: row.completed_ms,
            processing_time: row.processing_secs,
        }))
    }

    /// Drops the id from the active-task tracking set if present. Durable
    /// history is never deleted here; the eventual terminal record of a task
    /// mid-extraction is unaffected.
    pub async fn remove_active(&self, task_id: &str) -> bool {
        self.tracking.lock().await.active.remove(task_id)
    }

    /// Retention sweep: deletes terminal tasks older than `hours`.
    ///
    /// `hours` comes from operator input; the cutoff saturates rather than
    /// overflowing, so an absurd horizon deletes nothing instead of
    /// everything.
    pub async fn cleanup(&self, hours: u64) -> Result<usize> {
        let horizon_ms = i64::try_from(hours)
            .unwrap_or(i64::MAX)
            .saturating_mul(3_600_000);
        let cutoff = tender_core::now_ms().saturating_sub(horizon_ms);
        let deleted = self.db.delete_finished_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, hours, "retention sweep removed old tasks");
        }
        Ok(deleted)
    }

    /// Durable counts by status plus the live active-set size.
    pub async fn stats(&self) -> Result<StatsResponse> {
        let by_status = self.db.task_stats().await?;
        let active_tasks = self.tracking.lock().await.active.len();
        Ok(StatsResponse {
            by_status,
            active_tasks,
        })
    }

    /// Startup reconciliation, called before the listener binds.
    ///
    /// All non-terminal rows re-enter the active set. `pending` rows also
    /// get an execution unit rescheduled; `processing` orphans stay tracked
    /// but not live — the extraction may already have had side effects on
    /// the portal, so re-running is an operator decision (`fail_orphaned`).
    /// Idempotent: the claim guard makes a double reschedule harmless.
    pub async fn recover(self: &Arc<Self>) -> Result<()> {
        let rows = self.db.find_active_tasks().await?;
        if rows.is_empty() {
            return Ok(());
        }

        let mut rescheduled = 0usize;
        let mut orphaned = 0usize;
        for row in rows {
            match row.status {
                TaskStatus::Pending => {
                    rescheduled += 1;
                    {
                        let mut tracking = self.tracking.lock().await;
                        tracking.active.insert(row.task_id.clone());
                        tracking.live.insert(row.task_id.clone());
                    }
                    tokio::spawn(Arc::clone(self).run(row.task_id));
                }
                TaskStatus::Processing => {
                    orphaned += 1;
                    self.tracking.lock().await.active.insert(row.task_id.clone());
                    warn!(task_id = %row.task_id, "task was processing at shutdown; not auto-resumed");
                }
                _ => {}
            }
        }

        info!(rescheduled, orphaned, "startup recovery finished");
        Ok(())
    }

    /// Operator action: marks an orphaned non-terminal task as failed.
    ///
    /// Meant for rows stranded by a crash (visible as `processing` with no
    /// execution unit). A task with a live execution unit in this process
    /// is refused. Returns whether a row was transitioned.
    pub async fn fail_orphaned(&self, task_id: &str) -> Result<bool> {
        if self.tracking.lock().await.live.contains(task_id) {
            debug!(task_id = %task_id, "task is live, refusing operator fail");
            return Ok(false);
        }
        let failed = self.db.fail_task(task_id, ORPHAN_ERROR, 0.0).await?;
        if failed {
            self.tracking.lock().await.active.remove(task_id);
            warn!(task_id = %task_id, "orphaned task marked failed by operator");
        }
        Ok(failed)
    }

    /// Current free capacity of the concurrency gate.
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// Size of the active-task tracking set.
    pub async fn active_count(&self) -> usize {
        self.tracking.lock().await.active.len()
    }
}
