mod api;
mod app_state;
mod db;
mod env_config;
mod layers;
mod logger;
mod market_data;
mod services;
#[cfg(test)]
mod test_support;
mod utils;

use app_state::models::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use chrono_tz::Tz;
use db::{
    clickhouse::clickhouse_service::ClickhouseService, postgres::postgres_service::PostgresService,
    redis::redis_service::RedisService,
};
use env_config::models::{app_config::AppConfig, app_env::AppEnv, app_setting::AppSettings};
use layers::{create_cors, create_trace};
use market_data::market_data_service::MarketDataService;
use services::ingestion::{HistoricalIngestor, HistoricalSettings, RealtimeSettings, RealtimeUpdater};
use services::market_view::MarketView;
use services::scheduler::MarketSyncScheduler;
use services::scheduler::job::{JobRanges, JobRunner};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    // Инициализация приложения
    let settings: Arc<AppSettings> = Arc::new(initialize_application().await);

    // Часовой пояс рынка и планировщика
    let market_tz: Tz = settings
        .app_config
        .scheduler
        .timezone
        .parse()
        .expect("Invalid scheduler timezone");

    // Подключение к хранилищам
    let (clickhouse_service, postgres_service, redis_service) =
        initialize_database_connections(settings.clone()).await;

    // Источник рыночных данных: live или синтетика, выбирается один раз
    let market_data_service = match MarketDataService::new(&settings, market_tz) {
        Ok(service) => Arc::new(service),
        Err(err) => {
            error!("Failed to initialize market data sources: {}", err);
            panic!("Cannot continue without a market data source");
        }
    };

    let server_address: SocketAddr = format!(
        "{}:{}",
        settings.app_env.server_address, settings.app_env.server_port,
    )
    .parse()
    .expect("Invalid server address configuration");

    info!("Server will listen on: {}", server_address);

    let app_state = build_app_state(
        settings.clone(),
        market_tz,
        clickhouse_service,
        postgres_service,
        redis_service,
        market_data_service,
    );

    // Запуск фоновых задач
    initialize_background_services(app_state.clone());

    let app_router = create_application_router(app_state.clone());

    start_http_server(app_router, server_address).await;

    app_state.scheduler.stop();
    info!("Application stopped");
}

/// Инициализирует настройки и логирование приложения
async fn initialize_application() -> AppSettings {
    let environment = AppEnv::new();
    let config = AppConfig::new(&environment.env);
    let app_settings = AppSettings {
        app_config: config,
        app_env: environment,
    };

    logger::init_logger(
        &app_settings.app_config.log.level,
        &app_settings.app_config.log.format,
        app_settings.app_env.is_local(),
    )
    .expect("Failed to initialize logger");

    info!("Starting Market Sync Service application...");
    info!("Current environment: {}", app_settings.app_env.env);

    if app_settings.app_env.is_local() {
        info!("Running in local development mode");
        debug!("Configuration details: {:#?}", app_settings.app_config);
    } else {
        info!("Running in production mode");
    }

    app_settings
}

/// Устанавливает соединения с хранилищами
async fn initialize_database_connections(
    settings: Arc<AppSettings>,
) -> (ClickhouseService, PostgresService, RedisService) {
    info!("Initializing database connections...");

    let clickhouse_service = match ClickhouseService::new(&settings).await {
        Ok(service) => {
            info!("ClickHouse connection established successfully");
            service
        }
        Err(err) => {
            error!("Failed to connect to ClickHouse: {}", err);
            panic!("Cannot continue without ClickHouse connection");
        }
    };

    let postgres_service = match PostgresService::new(&settings).await {
        Ok(service) => {
            info!("PostgreSQL connection established successfully");
            service
        }
        Err(err) => {
            error!("Failed to connect to PostgreSQL: {}", err);
            panic!("Cannot continue without PostgreSQL connection");
        }
    };

    // Кэш никогда не блокирует запуск
    let redis_service = RedisService::new(&settings).await;

    (clickhouse_service, postgres_service, redis_service)
}

/// Собирает движки, планировщик и глобальное состояние
fn build_app_state(
    settings: Arc<AppSettings>,
    market_tz: Tz,
    clickhouse_service: ClickhouseService,
    postgres_service: PostgresService,
    redis_service: RedisService,
    market_data_service: Arc<MarketDataService>,
) -> Arc<AppState> {
    let config = &settings.app_config;
    let source = market_data_service.source.clone();
    let store = clickhouse_service.repository_bars.clone();
    let cache = redis_service.repository_cache.clone();

    let historical = Arc::new(HistoricalIngestor::new(
        source.clone(),
        store.clone(),
        cache.clone(),
        HistoricalSettings::from_config(&config.ingestion, &config.cache),
    ));

    let realtime = Arc::new(RealtimeUpdater::new(
        source,
        store.clone(),
        cache.clone(),
        RealtimeSettings::from_config(&config.cache, market_tz),
    ));

    let defaults = JobRanges::default();
    let runner = Arc::new(JobRunner::new(
        postgres_service.repository_symbols.clone(),
        historical,
        realtime.clone(),
        JobRanges {
            daily: config.scheduler.jobs.daily_historical.range.unwrap_or(defaults.daily),
            full: config.scheduler.jobs.full_historical.range.unwrap_or(defaults.full),
        },
    ));

    let scheduler = match MarketSyncScheduler::from_config(runner, &config.scheduler, market_tz) {
        Ok(scheduler) => Arc::new(scheduler),
        Err(err) => {
            error!("Invalid scheduler configuration: {}", err);
            panic!("Cannot continue with invalid scheduler configuration");
        }
    };

    Arc::new(AppState {
        settings: settings.clone(),
        clickhouse_service: Arc::new(clickhouse_service),
        postgres_service: Arc::new(postgres_service),
        redis_service: Arc::new(redis_service),
        market_data_service,
        realtime,
        market_view: Arc::new(MarketView::new(store, cache)),
        scheduler,
    })
}

/// Создает API роутер со всеми эндпоинтами и middleware
fn create_application_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api-health", get(api::health_api))
        .route("/db-health", get(api::health_db))
        .route("/jobs", get(api::list_jobs))
        .route("/jobs/{job_type}/trigger", post(api::trigger_job))
        .route("/market/{symbol}/latest", get(api::latest_price))
        .route("/market/{symbol}/intraday", get(api::intraday))
        .layer(axum::Extension(app_state))
        .layer(create_cors())
        .layer(create_trace())
}

/// Запускает HTTP сервер и ждёт сигнала остановки
async fn start_http_server(app: Router, addr: SocketAddr) {
    info!("Starting HTTP server on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind to address {}: {}", addr, err);
            panic!("Cannot start server: {}", err);
        }
    };

    info!("Server started successfully, now accepting connections");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
        panic!("Server failed: {}", err);
    }
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}

/// Запускает планировщик, если он включён
fn initialize_background_services(app_state: Arc<AppState>) {
    let settings = &app_state.settings;

    info!(
        "Market data source: {} ({})",
        app_state.market_data_service.source.name(),
        app_state.market_data_service.mode
    );

    if !settings.app_config.scheduler.enabled {
        info!("Market sync scheduler is disabled in configuration");
        return;
    }

    app_state.scheduler.start();
    info!("Background services initialized successfully");
}
