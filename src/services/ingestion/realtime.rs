// File: src/services/ingestion/realtime.rs
use super::summary::{RefreshSummary, RunCounts};
use super::unique_symbols;
use crate::db::clickhouse::repository::bar_repository::{BarRepository, UpsertCounts};
use crate::db::redis::repository::market_cache_repository::{CacheKey, MarketCache, put_json};
use crate::env_config::models::app_config::CacheConfig;
use crate::market_data::errors::{CacheError, IngestError};
use crate::market_data::models::{Bar, CachedBar};
use crate::market_data::providers::MarketDataSource;
use crate::market_data::symbols::is_crypto_symbol;
use crate::utils::time::last_trading_day;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    pub market_tz: Tz,
    pub hourly_ttl: Duration,
    pub latest_price_ttl: Duration,
}

impl RealtimeSettings {
    pub fn from_config(cache: &CacheConfig, market_tz: Tz) -> Self {
        Self {
            market_tz,
            hourly_ttl: Duration::from_secs(cache.hourly_data_ttl_seconds),
            latest_price_ttl: Duration::from_secs(cache.latest_price_ttl_seconds),
        }
    }
}

/// Intraday refresh and latest-price refresh over the active symbols.
pub struct RealtimeUpdater {
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn BarRepository>,
    cache: Arc<dyn MarketCache>,
    settings: RealtimeSettings,
}

impl RealtimeUpdater {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn BarRepository>,
        cache: Arc<dyn MarketCache>,
        settings: RealtimeSettings,
    ) -> Self {
        Self {
            source,
            store,
            cache,
            settings,
        }
    }

    /// Торговый день символа: крипта по UTC, акции по часовому поясу рынка
    pub fn trading_day_for(&self, symbol: &str, now: DateTime<Utc>) -> NaiveDate {
        if is_crypto_symbol(symbol) {
            last_trading_day(now, chrono_tz::UTC, true)
        } else {
            last_trading_day(now, self.settings.market_tz, false)
        }
    }

    pub async fn refresh_hourly(&self, symbols: &[String]) -> RefreshSummary {
        self.refresh_hourly_at(symbols, Utc::now()).await
    }

    pub async fn refresh_hourly_at(&self, symbols: &[String], now: DateTime<Utc>) -> RefreshSummary {
        let symbols = unique_symbols(symbols);
        let mut counts = RunCounts::default();

        info!("Starting hourly refresh for {} symbols", symbols.len());

        for symbol in &symbols {
            let day = self.trading_day_for(symbol, now);
            match self.refresh_symbol_day(symbol, day).await {
                Ok(written) => counts.record_written(written),
                Err(IngestError::Provider(e)) if !e.is_transient() => {
                    warn!("Skipping hourly refresh of {}: {}", symbol, e);
                    counts.record_provider_error(symbol, &e);
                }
                Err(e) => {
                    error!("Hourly refresh failed for {}: {}", symbol, e);
                    counts.record_error(symbol);
                }
            }
        }

        info!(
            "Completed hourly refresh: {} bars written, {} processed, {} skipped, {} errors",
            counts.records_written(),
            counts.processed,
            counts.skipped,
            counts.errors
        );

        RefreshSummary { counts }
    }

    async fn refresh_symbol_day(&self, symbol: &str, day: NaiveDate) -> Result<UpsertCounts, IngestError> {
        let bars: Vec<Bar> = self
            .source
            .intraday_bars(symbol, day)
            .await?
            .into_iter()
            .filter(|bar| !bar.is_daily() && bar.date == day)
            .collect();

        // Пустой ответ не стирает уже сохранённый день
        if bars.is_empty() {
            debug!("No intraday bars for {} on {}", symbol, day);
            return Ok(UpsertCounts::default());
        }

        let written = self.store.replace_intraday_bars(symbol, day, &bars).await?;

        let series: Vec<CachedBar> = bars.iter().map(CachedBar::from).collect();
        let key = CacheKey::HourlyData(symbol, day);
        if let Err(e) = put_json(self.cache.as_ref(), key, &series, self.settings.hourly_ttl).await {
            warn!("Failed to cache {}: {}", key, e);
        }

        debug!("Refreshed {} intraday bars of {} for {}", bars.len(), symbol, day);
        Ok(written)
    }

    /// Только кэш: котировки в хранилище не пишутся.
    /// Кэш здесь единственный приёмник, поэтому недоступный кэш считается ошибкой символа
    /// (`errors` и `failed_symbols`), в отличие от остальных задач, где он только логируется.
    pub async fn refresh_latest_prices(&self, symbols: &[String]) -> RefreshSummary {
        let symbols = unique_symbols(symbols);
        let mut counts = RunCounts::default();

        debug!("Refreshing latest prices for {} symbols", symbols.len());

        for symbol in &symbols {
            let quote = match self.source.latest_quote(symbol).await {
                Ok(quote) => quote,
                Err(e) if !e.is_transient() => {
                    warn!("Skipping latest price of {}: {}", symbol, e);
                    counts.record_provider_error(symbol, &e);
                    continue;
                }
                Err(e) => {
                    error!("Latest price fetch failed for {}: {}", symbol, e);
                    counts.record_error(symbol);
                    continue;
                }
            };

            let key = CacheKey::LatestPrice(symbol);
            match put_json(self.cache.as_ref(), key, &quote, self.settings.latest_price_ttl).await {
                Ok(()) => counts.record_processed(),
                Err(CacheError::Unreachable(reason)) => {
                    warn!("Cache unreachable while writing {}: {}", key, reason);
                    counts.record_error(symbol);
                }
                Err(e) => {
                    error!("Failed to cache {}: {}", key, e);
                    counts.record_error(symbol);
                }
            }
        }

        info!(
            "Completed latest price refresh: {} cached, {} skipped, {} errors",
            counts.processed, counts.skipped, counts.errors
        );

        RefreshSummary { counts }
    }
}
