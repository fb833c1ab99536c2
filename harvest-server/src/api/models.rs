//! Request/response payloads for the coordination API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use harvest_core::types::{
    Classification, DocumentMetadata, Task, TaskDownloadStats, WorkerStatus,
};

// --- workers -------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    pub name: String,
    pub host: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterWorkerResponse {
    pub worker_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

/// A worker as reported to operators: status is the derived liveness, not
/// the stored column.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerView {
    pub id: Uuid,
    pub name: String,
    pub host: Option<String>,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub total_tasks_completed: i64,
    pub total_documents_downloaded: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkersSummaryResponse {
    pub total_workers: usize,
    pub active_workers: usize,
    pub workers: Vec<WorkerView>,
}

// --- tasks ---------------------------------------------------------------

/// The leased task configuration handed to a worker.
#[derive(Debug, Serialize, Deserialize)]
pub struct LeasedTaskResponse {
    pub task_id: Uuid,
    pub search_params: serde_json::Value,
    pub start_page: i32,
    pub max_documents: i32,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskCreateRequest {
    pub search_params: serde_json::Value,
    #[serde(default = "default_start_page")]
    pub start_page: i32,
    pub max_documents: i32,
}

fn default_start_page() -> i32 {
    1
}

#[derive(Debug, Serialize)]
pub struct TaskCreateResponse {
    pub task_id: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskCompleteRequest {
    pub task_id: Uuid,
    #[serde(default)]
    pub documents_downloaded: i32,
    #[serde(default)]
    pub documents_failed: i32,
    #[serde(default)]
    pub documents_skipped: i32,
    pub result_summary: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TasksSummaryResponse {
    pub total_tasks: i64,
    pub pending: i64,
    pub assigned: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize)]
pub struct ResetStaleResponse {
    pub reset_count: u64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemStartRequest {
    pub task_id: Uuid,
    pub document_id: String,
    pub reg_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ItemStartResponse {
    pub success: bool,
    pub message: String,
    pub statistics: Option<TaskDownloadStats>,
}

// --- documents -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DocumentRegisterRequest {
    pub task_id: Option<Uuid>,
    /// Parameters the scraper searched with, carrying optional
    /// classification hints.
    pub search_params: Option<serde_json::Value>,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Serialize)]
pub struct DocumentRegisterResponse {
    pub system_id: Uuid,
    pub external_id: Option<String>,
    pub reg_number: Option<String>,
    pub classified: bool,
    pub classification: Classification,
    pub message: String,
}
