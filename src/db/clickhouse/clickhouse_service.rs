use crate::db::clickhouse::connection::ClickhouseConnection;
use crate::db::clickhouse::repository::bar_repository::{BarRepository, ClickhouseBarRepository};
use crate::env_config::models::app_setting::AppSettings;
use std::sync::Arc;
use tracing::{error, info};

pub struct ClickhouseService {
    // Соединения
    pub connection: Arc<ClickhouseConnection>,
    // Хранилище баров (daily_bars, intraday_bars)
    pub repository_bars: Arc<dyn BarRepository>,
}

impl ClickhouseService {
    pub async fn new(settings: &Arc<AppSettings>) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing ClickHouse service components");

        info!("Creating ClickHouse connection");
        let clickhouse_connection = match ClickhouseConnection::new(settings.clone()).await {
            Ok(conn) => {
                info!("ClickHouse connection established successfully");
                Arc::new(conn)
            }
            Err(e) => {
                error!("Failed to establish ClickHouse connection: {}", e);
                return Err(Box::new(e));
            }
        };

        let bar_repository = ClickhouseBarRepository::new(
            clickhouse_connection.clone(),
            settings.app_config.ingestion.write_batch_size,
        );

        // Схема создаётся идемпотентно при каждом старте
        if let Err(e) = bar_repository.ensure_schema().await {
            error!("Failed to apply ClickHouse schema: {}", e);
            return Err(Box::new(e));
        }

        info!("ClickHouse service initialized successfully");

        Ok(Self {
            connection: clickhouse_connection,
            repository_bars: Arc::new(bar_repository),
        })
    }
}
