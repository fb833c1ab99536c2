pub mod document;
pub mod task;
pub mod worker;

pub use document::{Classification, ClassificationSource, Document, DocumentMetadata};
pub use task::{Task, TaskCounters, TaskDownloadStats, TaskStatus, TaskStatusCounts};
pub use worker::{Worker, WorkerActivity, WorkerStatistics, WorkerStatus};
