use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::types::worker::{
    CurrentTaskActivity, LifetimeStats, RecentTaskError, SessionStats, Worker,
    WorkerActivity, WorkerDocumentStats, WorkerStatistics, WorkerTaskStats,
};

/// PostgreSQL-backed worker identity, liveness, and statistics.
#[derive(Clone, Debug)]
pub struct PostgresWorkerRepository {
    pool: PgPool,
}

impl PostgresWorkerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Register a worker, or recognize an existing one by its API key.
    /// Re-registration refreshes liveness and returns the same identifier.
    pub async fn register(
        &self,
        name: &str,
        host: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<Uuid> {
        if let Some(key) = api_key {
            let existing: Option<(Uuid,)> = sqlx::query_as(
                r#"
                UPDATE workers
                SET last_heartbeat = NOW(), status = 'active', updated_at = NOW()
                WHERE api_key = $1
                RETURNING id
                "#,
            )
            .bind(key)
            .fetch_optional(self.pool())
            .await?;

            if let Some((id,)) = existing {
                info!("Worker {} ({}) re-registered", name, id);
                return Ok(id);
            }
        }

        let worker_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO workers (id, name, host, api_key, status, last_heartbeat)
            VALUES ($1, $2, $3, $4, 'active', NOW())
            "#,
        )
        .bind(worker_id)
        .bind(name)
        .bind(host)
        .bind(api_key)
        .execute(self.pool())
        .await?;

        info!("Registered worker {} ({})", name, worker_id);
        Ok(worker_id)
    }

    /// Shared fallback identity for deployments running with auth
    /// disabled, so leased tasks still carry an owner.
    pub async fn anonymous(&self) -> Result<Uuid> {
        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM workers WHERE name = 'anonymous' AND api_key IS NULL LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?;

        match existing {
            Some((id,)) => Ok(id),
            None => self.register("anonymous", None, None).await,
        }
    }

    /// Refresh liveness. Returns false for an unknown worker.
    pub async fn heartbeat(&self, worker_id: Uuid) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE workers
            SET last_heartbeat = NOW(), status = 'active', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(worker_id)
        .execute(self.pool())
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    pub async fn get(&self, worker_id: Uuid) -> Result<Option<Worker>> {
        let worker = sqlx::query_as("SELECT * FROM workers WHERE id = $1")
            .bind(worker_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(worker)
    }

    pub async fn get_by_api_key(&self, api_key: &str) -> Result<Option<Worker>> {
        let worker = sqlx::query_as("SELECT * FROM workers WHERE api_key = $1")
            .bind(api_key)
            .fetch_optional(self.pool())
            .await?;
        Ok(worker)
    }

    pub async fn list_all(&self) -> Result<Vec<Worker>> {
        let workers = sqlx::query_as(
            "SELECT * FROM workers ORDER BY last_heartbeat DESC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(workers)
    }

    /// The cached aggregate view: lifetime counters plus task and document
    /// breakdowns. `None` for an unknown worker.
    pub async fn statistics(&self, worker_id: Uuid) -> Result<Option<WorkerStatistics>> {
        let Some(worker) = self.get(worker_id).await? else {
            return Ok(None);
        };

        let task_statistics: WorkerTaskStats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total_tasks,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed_tasks,
                COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress_tasks,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed_tasks,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending_tasks,
                COALESCE(SUM(documents_downloaded), 0)::bigint AS total_docs_from_tasks,
                COALESCE(SUM(documents_failed), 0)::bigint AS total_docs_failed,
                COALESCE(SUM(documents_skipped), 0)::bigint AS total_docs_skipped,
                MIN(created_at) AS first_task_date,
                MAX(completed_at) AS last_task_date
            FROM tasks
            WHERE worker_id = $1
            "#,
        )
        .bind(worker_id)
        .fetch_one(self.pool())
        .await?;

        let document_statistics: WorkerDocumentStats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total_documents,
                COUNT(DISTINCT court_region) AS unique_regions,
                COUNT(DISTINCT instance_type) AS unique_instance_types,
                COUNT(DISTINCT case_type) AS unique_case_types,
                COUNT(*) FILTER (WHERE classification_date IS NOT NULL) AS classified_documents,
                MIN(created_at) AS first_document_date,
                MAX(created_at) AS last_document_date
            FROM documents
            WHERE worker_id = $1
            "#,
        )
        .bind(worker_id)
        .fetch_one(self.pool())
        .await?;

        Ok(Some(WorkerStatistics {
            worker,
            task_statistics,
            document_statistics,
        }))
    }

    /// Near-real-time activity feed: current task with a docs/minute rate,
    /// rolling 24h session stats, lifetime stats, and recent errors.
    /// Deliberately uncached.
    pub async fn activity(&self, worker_id: Uuid) -> Result<Option<WorkerActivity>> {
        let Some(worker) = self.get(worker_id).await? else {
            return Ok(None);
        };

        let current: Option<(
            Uuid,
            serde_json::Value,
            i32,
            i32,
            crate::types::TaskStatus,
            Option<chrono::DateTime<Utc>>,
            i32,
            i32,
        )> = sqlx::query_as(
            r#"
            SELECT id, search_params, start_page, max_documents, status,
                   started_at, documents_downloaded, documents_failed
            FROM tasks
            WHERE worker_id = $1
              AND status IN ('in_progress', 'assigned')
            ORDER BY started_at DESC NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(worker_id)
        .fetch_optional(self.pool())
        .await?;

        let current_task = current.map(
            |(
                task_id,
                search_params,
                start_page,
                max_documents,
                status,
                started_at,
                downloaded,
                failed,
            )| {
                let speed = started_at
                    .map(|started| {
                        let elapsed_minutes =
                            (Utc::now() - started).num_seconds() as f64 / 60.0;
                        if elapsed_minutes > 0.0 {
                            f64::from(downloaded) / elapsed_minutes
                        } else {
                            0.0
                        }
                    })
                    .unwrap_or(0.0);

                CurrentTaskActivity {
                    task_id,
                    search_params,
                    start_page,
                    max_documents,
                    status,
                    started_at,
                    documents_downloaded: downloaded,
                    documents_failed: failed,
                    speed_docs_per_minute: speed,
                }
            },
        );

        let session_start = Utc::now() - Duration::hours(24);
        let (session_tasks, session_docs): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(documents_downloaded), 0)::bigint
            FROM tasks
            WHERE worker_id = $1
              AND started_at >= $2
            "#,
        )
        .bind(worker_id)
        .bind(session_start)
        .fetch_one(self.pool())
        .await?;

        let errors: Vec<(Uuid, String, Option<chrono::DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT id, error_message, completed_at
            FROM tasks
            WHERE worker_id = $1
              AND error_message IS NOT NULL
            ORDER BY completed_at DESC NULLS LAST
            LIMIT 10
            "#,
        )
        .bind(worker_id)
        .fetch_all(self.pool())
        .await?;

        Ok(Some(WorkerActivity {
            worker_id,
            current_task,
            session_stats: SessionStats {
                tasks_completed: session_tasks,
                documents_downloaded: session_docs,
                start_time: session_start,
            },
            lifetime_stats: LifetimeStats {
                total_tasks: worker.total_tasks_completed,
                total_documents: worker.total_documents_downloaded,
            },
            errors: errors
                .into_iter()
                .map(|(task_id, error_message, timestamp)| RecentTaskError {
                    task_id,
                    error_message,
                    timestamp,
                })
                .collect(),
        }))
    }
}
