//! Redis read-through cache. Strictly an accelerator: every caller treats
//! a cache failure as a miss and falls through to the store.

use std::fmt;
use std::time::Duration;

use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{HarvestError, Result};

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis cache at {}", redis_url);

        let client = redis::Client::open(redis_url)
            .map_err(|e| HarvestError::Cache(format!("Failed to create Redis client: {e}")))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| HarvestError::Cache(format!("Failed to connect to Redis: {e}")))?;

        info!("Successfully connected to Redis cache");

        Ok(Self { conn })
    }

    pub async fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        let data: Option<String> = self
            .conn
            .get(key)
            .await
            .map_err(|e| HarvestError::Cache(format!("Redis GET failed: {e}")))?;

        match data {
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| {
                    HarvestError::Cache(format!("Failed to deserialize cache data: {e}"))
                })?;
                debug!("Cache HIT: {}", key);
                Ok(Some(value))
            }
            None => {
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize>(
        &mut self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        debug!("Cache SET: {} (TTL: {:?})", key, ttl);

        let json = serde_json::to_string(value)
            .map_err(|e| HarvestError::Cache(format!("Failed to serialize cache data: {e}")))?;

        self.conn
            .set_ex::<_, _, ()>(key, json, ttl.as_secs())
            .await
            .map_err(|e| HarvestError::Cache(format!("Redis SETEX failed: {e}")))?;

        Ok(())
    }

    pub async fn delete(&mut self, key: &str) -> Result<()> {
        debug!("Cache DELETE: {}", key);

        self.conn
            .del::<_, ()>(key)
            .await
            .map_err(|e| HarvestError::Cache(format!("Redis DEL failed: {e}")))?;

        Ok(())
    }

    pub async fn delete_pattern(&mut self, pattern: &str) -> Result<()> {
        debug!("Cache DELETE pattern: {}", pattern);

        let keys: Vec<String> = self
            .conn
            .keys(pattern)
            .await
            .map_err(|e| HarvestError::Cache(format!("Redis KEYS failed: {e}")))?;

        if !keys.is_empty() {
            debug!("Deleting {} keys matching pattern: {}", keys.len(), pattern);
            let _: () = self
                .conn
                .del(keys)
                .await
                .map_err(|e| HarvestError::Cache(format!("Redis DEL failed: {e}")))?;
        }

        Ok(())
    }

    pub async fn flush_all(&mut self) -> Result<()> {
        warn!("Flushing entire Redis cache");

        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut self.conn)
            .await
            .map_err(|e| HarvestError::Cache(format!("Redis FLUSHDB failed: {e}")))?;

        Ok(())
    }
}

/// Key namespace for the cached projections. Every mutation path names the
/// keys it invalidates through these constructors so the invalidation
/// discipline stays greppable.
#[derive(Debug, Clone, Copy)]
pub struct CacheKeys;

impl CacheKeys {
    pub fn task(id: Uuid) -> String {
        format!("cache:task:{id}")
    }

    pub fn tasks_summary(status_filter: Option<&str>) -> String {
        match status_filter {
            Some(status) => format!("cache:tasks_summary:{status}"),
            None => "cache:tasks_summary:all".to_string(),
        }
    }

    /// Matches every summary variant, whatever the status filter.
    pub fn tasks_summary_pattern() -> &'static str {
        "cache:tasks_summary:*"
    }

    pub fn worker_statistics(id: Uuid) -> String {
        format!("cache:worker_stats:{id}")
    }

    pub fn document(system_id: Uuid) -> String {
        format!("cache:document:{system_id}")
    }
}
