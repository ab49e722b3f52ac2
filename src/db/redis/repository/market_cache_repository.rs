// File: src/db/redis/repository/market_cache_repository.rs
use crate::db::redis::connection::RedisConnection;
use crate::market_data::errors::CacheError;
use async_trait::async_trait;
use chrono::NaiveDate;
use redis::AsyncCommands;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Ключи кэша, общие для писателей и читателей
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey<'a> {
    LatestPrice(&'a str),
    HourlyData(&'a str, NaiveDate),
    DailyData(&'a str, NaiveDate),
}

impl fmt::Display for CacheKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::LatestPrice(symbol) => write!(f, "latest_price:{}", symbol),
            CacheKey::HourlyData(symbol, date) => {
                write!(f, "hourly_data:{}:{}", symbol, date.format("%Y-%m-%d"))
            }
            CacheKey::DailyData(symbol, date) => {
                write!(f, "daily_data:{}:{}", symbol, date.format("%Y-%m-%d"))
            }
        }
    }
}

/// Ключ-значение с TTL. Ошибки кэша никогда не фатальны для вызывающего
#[async_trait]
pub trait MarketCache: Send + Sync {
    fn name(&self) -> &'static str;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

pub async fn put_json<T: Serialize + Sync>(
    cache: &dyn MarketCache,
    key: CacheKey<'_>,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let payload = serde_json::to_string(value)?;
    cache.put(&key.to_string(), payload, ttl).await
}

pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn MarketCache,
    key: CacheKey<'_>,
) -> Result<Option<T>, CacheError> {
    match cache.get(&key.to_string()).await? {
        Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
        None => Ok(None),
    }
}

pub struct RedisMarketCache {
    connection: Arc<RedisConnection>,
    timeout: Duration,
}

impl RedisMarketCache {
    pub fn new(connection: Arc<RedisConnection>, timeout: Duration) -> Self {
        Self { connection, timeout }
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = Result<T, redis::RedisError>> + Send,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::Unreachable(e.to_string())),
            Err(_) => Err(CacheError::Unreachable(format!(
                "no reply within {} ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl MarketCache for RedisMarketCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.get_manager();
        // SETEX не принимает 0
        let seconds = ttl.as_secs().max(1);
        self.bounded(async move {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(seconds)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;
        debug!("Cached {} for {}s", key, seconds);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.get_manager();
        self.bounded(async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.bounded(self.connection.ping()).await
    }
}

/// Кэш в памяти процесса, когда Redis не настроен или недоступен
#[derive(Default)]
pub struct InMemoryMarketCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryMarketCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MarketCache for InMemoryMarketCache {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Unreachable(e.to_string()))?;
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Unreachable(e.to_string()))?;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
