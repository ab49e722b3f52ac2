// File: src/services/market_view.rs
use crate::db::clickhouse::repository::bar_repository::BarRepository;
use crate::db::redis::repository::market_cache_repository::{CacheKey, MarketCache, get_json};
use crate::market_data::errors::StoreError;
use crate::market_data::models::{CachedBar, PriceQuote};
use crate::market_data::symbols::normalize_symbol;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewSource {
    Cache,
    Store,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestPriceView {
    pub quote: PriceQuote,
    pub source: ViewSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntradayView {
    pub symbol: String,
    pub date: NaiveDate,
    pub bars: Vec<CachedBar>,
    pub source: ViewSource,
}

/// Чтение для API: сначала кэш, затем хранилище
pub struct MarketView {
    store: Arc<dyn BarRepository>,
    cache: Arc<dyn MarketCache>,
}

impl MarketView {
    pub fn new(store: Arc<dyn BarRepository>, cache: Arc<dyn MarketCache>) -> Self {
        Self { store, cache }
    }

    pub async fn latest_price(&self, symbol: &str) -> Result<Option<LatestPriceView>, StoreError> {
        let symbol = normalize_symbol(symbol);

        match get_json::<PriceQuote>(self.cache.as_ref(), CacheKey::LatestPrice(&symbol)).await {
            Ok(Some(quote)) => {
                return Ok(Some(LatestPriceView {
                    quote,
                    source: ViewSource::Cache,
                }));
            }
            Ok(None) => debug!("Latest price of {} is not cached", symbol),
            Err(e) => warn!("Cache read failed for latest price of {}: {}", symbol, e),
        }

        // Цена = последнее закрытие, изменение относительно предыдущего
        let bars = self.store.latest_daily_bars(&symbol, 2).await?;
        let Some(last) = bars.last() else {
            return Ok(None);
        };
        let previous_close = match bars.len() {
            2 => bars[0].close,
            _ => last.close,
        };
        let as_of = last
            .date
            .and_time(NaiveTime::MIN)
            .and_utc()
            .min(Utc::now());

        Ok(Some(LatestPriceView {
            quote: PriceQuote::new(&symbol, last.close, previous_close, as_of),
            source: ViewSource::Store,
        }))
    }

    /// `None` when neither the cache nor the store has bars for that day.
    pub async fn intraday(&self, symbol: &str, date: NaiveDate) -> Result<Option<IntradayView>, StoreError> {
        let symbol = normalize_symbol(symbol);

        match get_json::<Vec<CachedBar>>(self.cache.as_ref(), CacheKey::HourlyData(&symbol, date)).await {
            Ok(Some(bars)) if !bars.is_empty() => {
                return Ok(Some(IntradayView {
                    symbol,
                    date,
                    bars,
                    source: ViewSource::Cache,
                }));
            }
            Ok(_) => debug!("Intraday series of {} for {} is not cached", symbol, date),
            Err(e) => warn!("Cache read failed for intraday series of {}: {}", symbol, e),
        }

        let bars: Vec<CachedBar> = self
            .store
            .query_range(&symbol, date, date)
            .await?
            .iter()
            .filter(|bar| !bar.is_daily())
            .map(CachedBar::from)
            .collect();

        if bars.is_empty() {
            return Ok(None);
        }

        Ok(Some(IntradayView {
            symbol,
            date,
            bars,
            source: ViewSource::Store,
        }))
    }
}
