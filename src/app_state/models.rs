use crate::db::clickhouse::clickhouse_service::ClickhouseService;
use crate::db::postgres::postgres_service::PostgresService;
use crate::db::redis::redis_service::RedisService;
use crate::env_config::models::app_setting::AppSettings;
use crate::market_data::market_data_service::MarketDataService;
use crate::services::ingestion::RealtimeUpdater;
use crate::services::market_view::MarketView;
use crate::services::scheduler::MarketSyncScheduler;
use std::sync::Arc;

pub struct AppState {
    pub settings: Arc<AppSettings>,
    pub clickhouse_service: Arc<ClickhouseService>,
    pub postgres_service: Arc<PostgresService>,
    pub redis_service: Arc<RedisService>,
    pub market_data_service: Arc<MarketDataService>,
    pub realtime: Arc<RealtimeUpdater>,
    pub market_view: Arc<MarketView>,
    pub scheduler: Arc<MarketSyncScheduler>,
}
