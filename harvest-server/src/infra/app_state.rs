use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;

use harvest_core::{Classify, Database, RedisCache};

use crate::infra::config::Config;
use crate::notify::Notify;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// `None` when caching is disabled or Redis is unreachable at startup.
    cache: Option<RedisCache>,
    pub config: Arc<Config>,
    pub classifier: Arc<dyn Classify>,
    pub notifier: Arc<dyn Notify>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("cache_enabled", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        db: Database,
        cache: Option<RedisCache>,
        config: Arc<Config>,
        classifier: Arc<dyn Classify>,
        notifier: Arc<dyn Notify>,
    ) -> Self {
        Self {
            db,
            cache,
            config,
            classifier,
            notifier,
        }
    }

    // The cache is strictly an accelerator: every failure below is logged
    // and treated as a miss so requests degrade to direct store reads.

    pub async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut cache = self.cache.clone()?;
        match cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Cache read failed for {key}: {e}");
                None
            }
        }
    }

    pub async fn cache_put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(mut cache) = self.cache.clone() else {
            return;
        };
        if let Err(e) = cache.set(key, value, ttl).await {
            warn!("Cache write failed for {key}: {e}");
        }
    }

    pub async fn cache_delete(&self, key: &str) {
        let Some(mut cache) = self.cache.clone() else {
            return;
        };
        if let Err(e) = cache.delete(key).await {
            warn!("Cache invalidation failed for {key}: {e}");
        }
    }

    pub async fn cache_delete_pattern(&self, pattern: &str) {
        let Some(mut cache) = self.cache.clone() else {
            return;
        };
        if let Err(e) = cache.delete_pattern(pattern).await {
            warn!("Cache invalidation failed for pattern {pattern}: {e}");
        }
    }
}
