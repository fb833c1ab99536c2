use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{HarvestError, Result};
use crate::stats::{SPEED_WINDOW, estimate_remaining_seconds, speed_from_recent};
use crate::types::{Task, TaskCounters, TaskDownloadStats, TaskStatus, TaskStatusCounts};

/// Largest accepted `max_documents` for a single task.
pub const MAX_DOCUMENTS_LIMIT: i32 = 1000;

/// PostgreSQL-backed task lifecycle: creation, leasing, completion,
/// timeout recovery, and the per-item progress rows behind speed/ETA.
#[derive(Clone, Debug)]
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a new task in `pending`. Parameters are stored verbatim.
    pub async fn create(
        &self,
        search_params: serde_json::Value,
        start_page: i32,
        max_documents: i32,
    ) -> Result<Uuid> {
        if start_page < 1 {
            return Err(HarvestError::Validation(
                "start_page must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_DOCUMENTS_LIMIT).contains(&max_documents) {
            return Err(HarvestError::Validation(format!(
                "max_documents must be between 1 and {MAX_DOCUMENTS_LIMIT}"
            )));
        }

        let task_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO tasks (id, search_params, start_page, max_documents, status)
            VALUES ($1, $2, $3, $4, 'pending')
            "#,
        )
        .bind(task_id)
        .bind(&search_params)
        .bind(start_page)
        .bind(max_documents)
        .execute(self.pool())
        .await?;

        info!(
            "Created task {}: page {}, max {} docs",
            task_id, start_page, max_documents
        );
        Ok(task_id)
    }

    /// Atomically claim the oldest pending task for `worker_id`.
    ///
    /// `FOR UPDATE SKIP LOCKED` is the sole concurrency primitive here:
    /// competing leasers skip rows locked by each other instead of
    /// queueing, so a pending task is handed to at most one of them.
    /// Returns `None` when nothing is pending; callers treat that as a
    /// normal empty result.
    pub async fn lease(&self, worker_id: Uuid) -> Result<Option<Task>> {
        let mut tx = self.pool().begin().await?;

        let candidate: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM tasks
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some((task_id,)) = candidate else {
            return Ok(None);
        };

        let task: Task = sqlx::query_as(
            r#"
            UPDATE tasks
            SET worker_id = $1,
                status = 'assigned',
                assigned_at = NOW(),
                updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(task_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Task {} leased to worker {}", task.id, worker_id);
        Ok(Some(task))
    }

    /// Move an assigned task to `in_progress`. A second call is a no-op
    /// success; `started_at` keeps its first value.
    pub async fn start(&self, task_id: Uuid) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'in_progress',
                started_at = COALESCE(started_at, NOW()),
                updated_at = NOW()
            WHERE id = $1
              AND status IN ('assigned', 'in_progress')
            "#,
        )
        .bind(task_id)
        .execute(self.pool())
        .await?
        .rows_affected();

        if updated == 0 {
            return match self.get(task_id).await? {
                None => Err(HarvestError::NotFound(format!("Task {task_id} not found"))),
                Some(task) => Err(HarvestError::Validation(format!(
                    "Task {task_id} is {}, cannot start",
                    task.status
                ))),
            };
        }
        Ok(())
    }

    /// Record the worker's result report: `completed` without an error,
    /// `failed` with one. Updates the owning worker's lifetime counters in
    /// the same transaction. Terminal statuses are final: a repeated
    /// report (the retry path after a lost response) returns the stored
    /// task without re-running the transition or the counters.
    pub async fn complete(
        &self,
        task_id: Uuid,
        counters: TaskCounters,
        result_summary: Option<serde_json::Value>,
        error_message: Option<String>,
    ) -> Result<Task> {
        if counters.downloaded < 0 || counters.failed < 0 || counters.skipped < 0 {
            return Err(HarvestError::Validation(
                "document counters must be non-negative".to_string(),
            ));
        }

        let status = if error_message.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };

        let mut tx = self.pool().begin().await?;

        let task: Option<Task> = sqlx::query_as(
            r#"
            UPDATE tasks
            SET status = $1,
                completed_at = NOW(),
                documents_downloaded = $2,
                documents_failed = $3,
                documents_skipped = $4,
                result_summary = $5,
                error_message = $6,
                updated_at = NOW()
            WHERE id = $7
              AND status IN ('assigned', 'in_progress')
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(counters.downloaded)
        .bind(counters.failed)
        .bind(counters.skipped)
        .bind(&result_summary)
        .bind(&error_message)
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(task) = task else {
            tx.rollback().await?;
            return match self.get(task_id).await? {
                None => Err(HarvestError::NotFound(format!("Task {task_id} not found"))),
                Some(existing) if existing.status.is_terminal() => {
                    info!(
                        "Task {} already {}, ignoring repeated completion report",
                        task_id, existing.status
                    );
                    Ok(existing)
                }
                Some(existing) => Err(HarvestError::Validation(format!(
                    "Task {task_id} is {}, nothing to complete",
                    existing.status
                ))),
            };
        };

        if let Some(worker_id) = task.worker_id {
            sqlx::query(
                r#"
                UPDATE workers
                SET total_tasks_completed = total_tasks_completed + 1,
                    total_documents_downloaded = total_documents_downloaded + $1,
                    updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(i64::from(counters.downloaded))
            .bind(worker_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            "Task {} {}: {} downloaded, {} failed, {} skipped",
            task_id, task.status, counters.downloaded, counters.failed, counters.skipped
        );
        Ok(task)
    }

    pub async fn get(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(task)
    }

    pub async fn list_by_status(&self, status: TaskStatus, limit: i64) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as(
            r#"
            SELECT * FROM tasks
            WHERE status = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(status)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(tasks)
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as(
            r#"
            SELECT * FROM tasks
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(tasks)
    }

    /// Per-status totals over the whole table.
    pub async fn status_counts(&self) -> Result<TaskStatusCounts> {
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending'),
                COUNT(*) FILTER (WHERE status = 'assigned'),
                COUNT(*) FILTER (WHERE status = 'in_progress'),
                COUNT(*) FILTER (WHERE status = 'completed'),
                COUNT(*) FILTER (WHERE status = 'failed')
            FROM tasks
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        Ok(TaskStatusCounts {
            pending: row.0,
            assigned: row.1,
            in_progress: row.2,
            completed: row.3,
            failed: row.4,
        })
    }

    /// Reclaim tasks whose lease expired without a completion report.
    ///
    /// A single conditional UPDATE, naturally idempotent, so any number of
    /// replicas can run the sweep concurrently.
    pub async fn reset_stale(&self, timeout: Duration) -> Result<u64> {
        let cutoff = Utc::now() - timeout;

        let reset = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'pending',
                worker_id = NULL,
                assigned_at = NULL,
                started_at = NULL,
                updated_at = NOW()
            WHERE status = 'in_progress'
              AND started_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(self.pool())
        .await?
        .rows_affected();

        if reset > 0 {
            warn!("Reset {} stale tasks", reset);
        }
        Ok(reset)
    }

    /// Upsert the per-item progress row used for speed/ETA. Task-level
    /// status is untouched.
    pub async fn record_item_start(
        &self,
        task_id: Uuid,
        item_id: &str,
        reg_number: Option<&str>,
        worker_id: Option<Uuid>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_items (task_id, item_id, reg_number, worker_id, status, started_at)
            VALUES ($1, $2, $3, $4, 'in_progress', NOW())
            ON CONFLICT (task_id, item_id)
            DO UPDATE SET started_at = EXCLUDED.started_at, status = 'in_progress'
            "#,
        )
        .bind(task_id)
        .bind(item_id)
        .bind(reg_number)
        .bind(worker_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Close an item's progress row. Called when the item's document gets
    /// registered; a missing row (item never announced) is a no-op.
    pub async fn record_item_complete(&self, task_id: Uuid, item_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE task_items
            SET status = 'completed', completed_at = NOW()
            WHERE task_id = $1 AND item_id = $2
            "#,
        )
        .bind(task_id)
        .bind(item_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Throughput snapshot for one task. `None` when the task is unknown.
    /// Speed comes from the mean duration of the most recent completed
    /// items; ETA from remaining work over that speed. Both stay absent
    /// when there is nothing to derive them from.
    pub async fn download_statistics(&self, task_id: Uuid) -> Result<Option<TaskDownloadStats>> {
        let Some(task) = self.get(task_id).await? else {
            return Ok(None);
        };

        let (started_count, avg_secs): (i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                AVG(EXTRACT(EPOCH FROM (completed_at - started_at)))::float8
            FROM task_items
            WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_one(self.pool())
        .await?;

        let recent: Vec<(f64,)> = sqlx::query_as(
            r#"
            SELECT EXTRACT(EPOCH FROM (completed_at - started_at))::float8
            FROM task_items
            WHERE task_id = $1
              AND status = 'completed'
              AND completed_at IS NOT NULL
            ORDER BY completed_at DESC
            LIMIT $2
            "#,
        )
        .bind(task_id)
        .bind(SPEED_WINDOW as i64)
        .fetch_all(self.pool())
        .await?;

        let recent_secs: Vec<f64> = recent.into_iter().map(|(secs,)| secs).collect();
        let speed = speed_from_recent(&recent_secs);
        let eta = estimate_remaining_seconds(task.remaining_documents(), speed);

        Ok(Some(TaskDownloadStats {
            total_documents: task.max_documents,
            started_count,
            completed_count: task.documents_downloaded,
            failed_count: task.documents_failed,
            skipped_count: task.documents_skipped,
            avg_download_time_seconds: avg_secs,
            download_speed_docs_per_second: speed,
            estimated_time_remaining_seconds: eta,
        }))
    }
}
