use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct RedisConnection {
    manager: ConnectionManager,
}

impl RedisConnection {
    pub async fn new(redis_url: &str, timeout: Duration) -> Result<Self, redis::RedisError> {
        info!("Initializing Redis connection...");

        let client = redis::Client::open(redis_url)?;
        let manager = match tokio::time::timeout(timeout, ConnectionManager::new(client)).await {
            Ok(Ok(manager)) => manager,
            Ok(Err(e)) => {
                error!("Failed to connect to Redis: {}", e);
                return Err(e);
            }
            Err(_) => {
                error!("Redis connection timed out after {:?}", timeout);
                return Err(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection timed out",
                )));
            }
        };

        let connection = Self { manager };

        debug!("Executing PING on Redis");
        connection.ping().await?;
        info!("Redis connection successful");

        Ok(connection)
    }

    /// ConnectionManager переподключается сам, клон дешёвый
    pub fn get_manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.get_manager();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
