use crate::db::redis::connection::RedisConnection;
use crate::db::redis::repository::market_cache_repository::{
    InMemoryMarketCache, MarketCache, RedisMarketCache,
};
use crate::env_config::models::app_setting::AppSettings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct RedisService {
    pub repository_cache: Arc<dyn MarketCache>,
}

impl RedisService {
    /// Без REDIS_URL или при недоступном Redis используется кэш в памяти
    pub async fn new(settings: &Arc<AppSettings>) -> Self {
        let timeout = Duration::from_millis(settings.app_config.redis.timeout_ms);

        let Some(redis_url) = settings.app_env.redis_url.as_deref() else {
            info!("REDIS_URL is not set, using in-memory market cache");
            return Self::in_memory();
        };

        match RedisConnection::new(redis_url, timeout).await {
            Ok(connection) => {
                info!("Redis market cache initialized successfully");
                Self {
                    repository_cache: Arc::new(RedisMarketCache::new(Arc::new(connection), timeout)),
                }
            }
            Err(e) => {
                warn!("Redis is unreachable ({}), using in-memory market cache", e);
                Self::in_memory()
            }
        }
    }

    pub fn in_memory() -> Self {
        Self {
            repository_cache: Arc::new(InMemoryMarketCache::new()),
        }
    }
}
