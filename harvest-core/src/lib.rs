//! # Harvest Core
//!
//! Core library for the harvest coordination server: task lifecycle and
//! leasing, worker liveness and statistics, and the canonical document
//! registry for a fleet of court-registry download workers.
//!
//! ## Architecture
//!
//! - [`types`]: domain records (tasks, workers, documents) shared with the
//!   HTTP layer
//! - [`database`]: PostgreSQL repositories and the Redis read-through cache
//! - [`classify`]: court region / instance inference for registered
//!   documents
//! - [`stats`]: the speed and ETA math behind the progress endpoints
//!
//! All coordination state lives in PostgreSQL; server replicas are
//! stateless, and task leasing relies on row locks (`FOR UPDATE SKIP
//! LOCKED`) rather than any in-process queue.

/// Document classification (court region and instance inference)
pub mod classify;

/// PostgreSQL repositories and the Redis cache layer
pub mod database;

/// Error types shared across the harvest crates
pub mod error;

/// Download speed and ETA estimation
pub mod stats;

/// Domain records and enums
pub mod types;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub use classify::{Classify, CourtClassifier};
pub use database::{CacheKeys, Database, PoolStats, RedisCache};
pub use database::repositories::{
    MAX_DOCUMENTS_LIMIT, PostgresDocumentRepository, PostgresTaskRepository,
    PostgresWorkerRepository, RegisterOutcome,
};
pub use error::{HarvestError, Result};
pub use types::{
    Classification, ClassificationSource, Document, DocumentMetadata, Task, TaskCounters,
    TaskDownloadStats, TaskStatus, TaskStatusCounts, Worker, WorkerActivity, WorkerStatistics,
    WorkerStatus,
};
