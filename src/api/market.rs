use crate::app_state::models::AppState;
use crate::services::market_view::{IntradayView, LatestPriceView};
use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct IntradayQuery {
    pub date: Option<NaiveDate>,
}

pub async fn latest_price(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<LatestPriceView>, StatusCode> {
    match app_state.market_view.latest_price(&symbol).await {
        Ok(Some(view)) => Ok(Json(view)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to load latest price of {}: {}", symbol, e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// Без параметра date берётся последний торговый день символа
pub async fn intraday(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<IntradayQuery>,
) -> Result<Json<IntradayView>, StatusCode> {
    let date = query
        .date
        .unwrap_or_else(|| app_state.realtime.trading_day_for(&symbol, Utc::now()));

    match app_state.market_view.intraday(&symbol, date).await {
        Ok(Some(view)) => Ok(Json(view)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to load intraday series of {} for {}: {}", symbol, date, e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
