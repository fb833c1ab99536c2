use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored worker status. Liveness is not a stored transition: a worker is
/// reported inactive whenever its last heartbeat is older than the
/// configured threshold, computed at read time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Inactive,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Active => f.write_str("active"),
            WorkerStatus::Inactive => f.write_str("inactive"),
        }
    }
}

/// A registered download worker.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Worker {
    pub id: Uuid,
    pub name: String,
    pub host: Option<String>,
    /// Absent when the deployment runs with auth disabled. Never leaves
    /// the server in serialized form.
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub total_tasks_completed: i64,
    pub total_documents_downloaded: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    /// Read-time liveness projection.
    pub fn is_live(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.status == WorkerStatus::Active && now - self.last_heartbeat <= threshold
    }

    pub fn effective_status(&self, threshold: Duration, now: DateTime<Utc>) -> WorkerStatus {
        if self.is_live(threshold, now) {
            WorkerStatus::Active
        } else {
            WorkerStatus::Inactive
        }
    }
}

/// Task totals for one worker, grouped by status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkerTaskStats {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub in_progress_tasks: i64,
    pub failed_tasks: i64,
    pub pending_tasks: i64,
    pub total_docs_from_tasks: i64,
    pub total_docs_failed: i64,
    pub total_docs_skipped: i64,
    pub first_task_date: Option<DateTime<Utc>>,
    pub last_task_date: Option<DateTime<Utc>>,
}

/// Document aggregates for one worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkerDocumentStats {
    pub total_documents: i64,
    pub unique_regions: i64,
    pub unique_instance_types: i64,
    pub unique_case_types: i64,
    pub classified_documents: i64,
    pub first_document_date: Option<DateTime<Utc>>,
    pub last_document_date: Option<DateTime<Utc>>,
}

/// The cached aggregate view served by the worker statistics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatistics {
    pub worker: Worker,
    pub task_statistics: WorkerTaskStats,
    pub document_statistics: WorkerDocumentStats,
}

/// Near-real-time view of what a worker is doing right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerActivity {
    pub worker_id: Uuid,
    pub current_task: Option<CurrentTaskActivity>,
    pub session_stats: SessionStats,
    pub lifetime_stats: LifetimeStats,
    pub errors: Vec<RecentTaskError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentTaskActivity {
    pub task_id: Uuid,
    pub search_params: serde_json::Value,
    pub start_page: i32,
    pub max_documents: i32,
    pub status: super::TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub documents_downloaded: i32,
    pub documents_failed: i32,
    pub speed_docs_per_minute: f64,
}

/// Rolling 24h window stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub tasks_completed: i64,
    pub documents_downloaded: i64,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifetimeStats {
    pub total_tasks: i64,
    pub total_documents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentTaskError {
    pub task_id: Uuid,
    pub error_message: String,
    pub timestamp: Option<DateTime<Utc>>,
}
