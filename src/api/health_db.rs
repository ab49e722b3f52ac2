use crate::app_state::models::AppState;
use axum::{Json, extract::Extension, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct DbHealth {
    pub clickhouse: bool,
    pub postgres: bool,
    pub cache_backend: &'static str,
    pub cache: bool,
}

/// ClickHouse и PostgreSQL обязательны; кэш только отображается
pub async fn health_db(Extension(app_state): Extension<Arc<AppState>>) -> (StatusCode, Json<DbHealth>) {
    let clickhouse = app_state.clickhouse_service.connection.ping().await;

    let postgres = app_state
        .postgres_service
        .repository_health_check
        .check()
        .await
        .unwrap_or(false);

    let cache_repository = &app_state.redis_service.repository_cache;
    let cache = match cache_repository.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Cache health check failed: {}", e);
            false
        }
    };

    let status = if clickhouse && postgres {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(DbHealth {
            clickhouse,
            postgres,
            cache_backend: cache_repository.name(),
            cache,
        }),
    )
}
