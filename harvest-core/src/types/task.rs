use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HarvestError;

/// Lifecycle state of a download task.
///
/// Transitions are monotone forward, with one exception: the stale-task
/// sweep moves `InProgress` back to `Pending` (clearing owner and
/// timestamps) so an abandoned task becomes leasable again.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "TEXT")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Assigned,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Whether a cached view of this task can go stale quickly.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "assigned" => Ok(TaskStatus::Assigned),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(HarvestError::Validation(format!(
                "unknown task status: {other}"
            ))),
        }
    }
}

/// A bounded unit of harvesting work.
///
/// `search_params` is an opaque map handed through to the scraper verbatim;
/// the server only peeks at two well-known keys for classification hints.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub worker_id: Option<Uuid>,
    pub search_params: serde_json::Value,
    pub start_page: i32,
    pub max_documents: i32,
    pub status: TaskStatus,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub documents_downloaded: i32,
    pub documents_failed: i32,
    pub documents_skipped: i32,
    pub error_message: Option<String>,
    pub result_summary: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Items not yet accounted for by any result counter.
    pub fn remaining_documents(&self) -> i32 {
        (self.max_documents
            - self.documents_downloaded
            - self.documents_failed
            - self.documents_skipped)
            .max(0)
    }
}

/// Result counters reported by a worker on completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskCounters {
    pub downloaded: i32,
    pub failed: i32,
    pub skipped: i32,
}

/// Per-status totals for the tasks summary view.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskStatusCounts {
    pub pending: i64,
    pub assigned: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
}

impl TaskStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.assigned + self.in_progress + self.completed + self.failed
    }
}

/// Throughput snapshot for a task, derived from per-item progress rows.
///
/// `download_speed_docs_per_second` and `estimated_time_remaining_seconds`
/// are absent (not zero) when no recent completions exist to derive them
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDownloadStats {
    pub total_documents: i32,
    pub started_count: i64,
    pub completed_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,
    pub avg_download_time_seconds: Option<f64>,
    pub download_speed_docs_per_second: Option<f64>,
    pub estimated_time_remaining_seconds: Option<f64>,
}
