pub mod cache;
pub mod repositories;

pub use cache::{CacheKeys, RedisCache};
pub use repositories::{
    PostgresDocumentRepository, PostgresTaskRepository, PostgresWorkerRepository,
};

use std::fmt;
use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::error::{HarvestError, Result};

/// Statistics about the connection pool, surfaced by the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
    pub max_size: u32,
}

/// The shared relational store: one bounded pool, one repository per
/// entity. Server replicas are stateless over this.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    max_connections: u32,
    tasks: PostgresTaskRepository,
    workers: PostgresWorkerRepository,
    documents: PostgresDocumentRepository,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Database {
    /// Connect with a pool sized to the expected fleet concurrency
    /// (workers x in-flight requests per worker). Pool exhaustion surfaces
    /// as an acquire timeout, a retryable error for the caller.
    pub async fn connect(
        database_url: &str,
        min_connections: u32,
        max_connections: u32,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .max_lifetime(Duration::from_secs(1800))
            .idle_timeout(Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(database_url)
            .await
            .map_err(|e| {
                HarvestError::Internal(format!("Database connection failed: {e}"))
            })?;

        info!(
            "Database pool initialized with min_connections={}, max_connections={}",
            min_connections, max_connections
        );

        Ok(Self::from_pool_with_limit(pool, max_connections))
    }

    /// Wrap an existing pool (tests hand one in via `#[sqlx::test]`).
    pub fn from_pool(pool: PgPool) -> Self {
        let max = pool.options().get_max_connections();
        Self::from_pool_with_limit(pool, max)
    }

    fn from_pool_with_limit(pool: PgPool, max_connections: u32) -> Self {
        Self {
            tasks: PostgresTaskRepository::new(pool.clone()),
            workers: PostgresWorkerRepository::new(pool.clone()),
            documents: PostgresDocumentRepository::new(pool.clone()),
            pool,
            max_connections,
        }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        crate::MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| HarvestError::Internal(format!("Migration failed: {e}")))?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Cheap liveness probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_size: self.max_connections,
        }
    }

    pub fn tasks(&self) -> &PostgresTaskRepository {
        &self.tasks
    }

    pub fn workers(&self) -> &PostgresWorkerRepository {
        &self.workers
    }

    pub fn documents(&self) -> &PostgresDocumentRepository {
        &self.documents
    }
}
