// File: src/services/ingestion/historical.rs
use super::summary::{HistoricalSummary, RunCounts};
use super::unique_symbols;
use crate::db::clickhouse::repository::bar_repository::{BarRepository, UpsertCounts};
use crate::db::redis::repository::market_cache_repository::{CacheKey, MarketCache, put_json};
use crate::env_config::models::app_config::{CacheConfig, IngestionConfig};
use crate::market_data::errors::IngestError;
use crate::market_data::models::{Bar, CachedBar, DateWindow, HistoricalRange};
use crate::market_data::providers::MarketDataSource;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct HistoricalSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_lookback_years: u32,
    pub daily_cache_ttl: Duration,
}

impl HistoricalSettings {
    pub fn from_config(ingestion: &IngestionConfig, cache: &CacheConfig) -> Self {
        Self {
            batch_size: ingestion.batch_size.max(1),
            batch_delay: Duration::from_millis(ingestion.batch_delay_ms),
            max_lookback_years: ingestion.max_lookback_years,
            daily_cache_ttl: Duration::from_secs(cache.daily_data_ttl_seconds),
        }
    }
}

/// Backfills daily bars for a symbol list over a named range.
pub struct HistoricalIngestor {
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn BarRepository>,
    cache: Arc<dyn MarketCache>,
    settings: HistoricalSettings,
}

impl HistoricalIngestor {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn BarRepository>,
        cache: Arc<dyn MarketCache>,
        settings: HistoricalSettings,
    ) -> Self {
        Self {
            source,
            store,
            cache,
            settings,
        }
    }

    pub async fn run(&self, symbols: &[String], range: HistoricalRange) -> HistoricalSummary {
        self.run_at(symbols, range, Utc::now().date_naive()).await
    }

    /// Одна ошибка символа никогда не прерывает прогон
    pub async fn run_at(
        &self,
        symbols: &[String],
        range: HistoricalRange,
        today: NaiveDate,
    ) -> HistoricalSummary {
        let window = range.resolve(today, self.settings.max_lookback_years);
        let symbols = unique_symbols(symbols);
        let mut counts = RunCounts::default();

        info!(
            "Starting historical ingestion: {} symbols, range {} ({} - {}), source {}",
            symbols.len(),
            range,
            window.start,
            window.end,
            self.source.name()
        );

        let batch_count = symbols.len().div_ceil(self.settings.batch_size);
        for (batch_index, batch) in symbols.chunks(self.settings.batch_size).enumerate() {
            debug!("Processing batch {}/{} ({} symbols)", batch_index + 1, batch_count, batch.len());

            // Внутри пакета строго последовательно, чтобы не превышать лимиты провайдеров
            for symbol in batch {
                match self.ingest_symbol(symbol, window).await {
                    Ok(written) => {
                        debug!(
                            "Ingested {}: {} inserted, {} updated",
                            symbol, written.inserted, written.updated
                        );
                        counts.record_written(written);
                    }
                    Err(IngestError::Provider(e)) if !e.is_transient() => {
                        warn!("Skipping {}: {}", symbol, e);
                        counts.record_provider_error(symbol, &e);
                    }
                    Err(e) => {
                        error!("Historical ingestion failed for {}: {}", symbol, e);
                        counts.record_error(symbol);
                    }
                }
            }

            if batch_index + 1 < batch_count && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        info!(
            "Completed historical ingestion for range {}: {} inserted, {} updated, {} processed, {} skipped, {} errors",
            range,
            counts.total_inserted,
            counts.total_updated,
            counts.processed,
            counts.skipped,
            counts.errors
        );

        HistoricalSummary {
            counts,
            range,
            window,
        }
    }

    async fn ingest_symbol(&self, symbol: &str, window: DateWindow) -> Result<UpsertCounts, IngestError> {
        let bars = self.source.daily_bars(symbol, window).await?;

        // Провайдер мог вернуть лишнее за пределами окна
        let bars: Vec<Bar> = bars
            .into_iter()
            .filter(|bar| bar.is_daily() && window.contains(bar.date))
            .collect();

        if bars.is_empty() {
            debug!("No bars for {} in {} - {}", symbol, window.start, window.end);
            return Ok(UpsertCounts::default());
        }

        let malformed = bars.iter().filter(|bar| !bar.is_well_formed()).count();
        if malformed > 0 {
            debug!("{} bars of {} violate low <= open/close <= high", malformed, symbol);
        }

        let written = self.store.upsert_bars(symbol, &bars).await?;
        debug!("Stored {} bars of {} ({} new)", written.written(), symbol, written.inserted);

        if let Some(latest) = bars.iter().max_by_key(|bar| bar.date) {
            self.mirror_latest(symbol, latest).await;
        }

        Ok(written)
    }

    async fn mirror_latest(&self, symbol: &str, latest: &Bar) {
        let key = CacheKey::DailyData(symbol, latest.date);
        if let Err(e) = put_json(
            self.cache.as_ref(),
            key,
            &CachedBar::from(latest),
            self.settings.daily_cache_ttl,
        )
        .await
        {
            warn!("Failed to cache {}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::redis::repository::market_cache_repository::{InMemoryMarketCache, get_json};
    use crate::market_data::errors::ProviderError;
    use crate::market_data::providers::SyntheticProvider;
    use crate::market_data::synthetic::SyntheticGenerator;
    use crate::test_support::{InMemoryBarStore, ScriptedSource, UnreachableCache, date};
    use crate::utils::time::DEFAULT_MARKET_TZ;

    fn settings() -> HistoricalSettings {
        HistoricalSettings {
            batch_size: 10,
            batch_delay: Duration::from_secs(2),
            max_lookback_years: 10,
            daily_cache_ttl: Duration::from_secs(1200),
        }
    }

    fn symbols(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ingestor(
        source: Arc<dyn MarketDataSource>,
        store: Arc<InMemoryBarStore>,
        cache: Arc<dyn MarketCache>,
    ) -> HistoricalIngestor {
        HistoricalIngestor::new(source, store, cache, settings())
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_is_idempotent() {
        let store = Arc::new(InMemoryBarStore::new());
        let engine = ingestor(
            Arc::new(ScriptedSource::new("TEST")),
            store.clone(),
            Arc::new(InMemoryMarketCache::new()),
        );
        let today = date(2024, 8, 7);

        let first = engine.run_at(&symbols(&["AAPL"]), HistoricalRange::OneMonth, today).await;
        let stored = store.bars("AAPL");
        assert!(first.counts.total_inserted > 0);

        let second = engine.run_at(&symbols(&["AAPL"]), HistoricalRange::OneMonth, today).await;
        assert_eq!(second.counts.total_inserted, 0);
        assert_eq!(second.counts.total_updated, first.counts.total_inserted);
        assert_eq!(store.bars("AAPL"), stored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_ranges_keep_one_bar_per_day() {
        let store = Arc::new(InMemoryBarStore::new());
        let engine = ingestor(
            Arc::new(ScriptedSource::new("TEST")),
            store.clone(),
            Arc::new(InMemoryMarketCache::new()),
        );
        let today = date(2024, 8, 7);

        engine.run_at(&symbols(&["MSFT"]), HistoricalRange::SevenDays, today).await;
        engine.run_at(&symbols(&["MSFT"]), HistoricalRange::OneMonth, today).await;

        let bars = store.bars("MSFT");
        let mut dates: Vec<NaiveDate> = bars.iter().map(|bar| bar.date).collect();
        dates.dedup();
        assert_eq!(dates.len(), bars.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_symbol_is_isolated() {
        let source = ScriptedSource::new("TEST").with_failure(
            "NVDA",
            ProviderError::Unavailable {
                provider: "FINNHUB".into(),
                reason: "HTTP 503".into(),
            },
        );
        let store = Arc::new(InMemoryBarStore::new());
        let engine = ingestor(Arc::new(source), store.clone(), Arc::new(InMemoryMarketCache::new()));

        let summary = engine
            .run_at(
                &symbols(&["AAPL", "MSFT", "NVDA", "AMZN", "SPY"]),
                HistoricalRange::SevenDays,
                date(2024, 8, 7),
            )
            .await;

        assert_eq!(summary.counts.errors, 1);
        assert_eq!(summary.counts.processed, 4);
        assert_eq!(summary.counts.failed_symbols, vec!["NVDA".to_string()]);
        for symbol in ["AAPL", "MSFT", "AMZN", "SPY"] {
            assert!(store.daily_count(symbol) > 0, "{} should be stored", symbol);
        }
        assert_eq!(store.daily_count("NVDA"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_mapping_is_skipped() {
        let source = ScriptedSource::new("TEST").with_failure(
            "NEWCOIN-USD",
            ProviderError::MappingMissing {
                symbol: "NEWCOIN-USD".into(),
            },
        );
        let store = Arc::new(InMemoryBarStore::new());
        let engine = ingestor(Arc::new(source), store.clone(), Arc::new(InMemoryMarketCache::new()));

        let summary = engine
            .run_at(&symbols(&["NEWCOIN-USD", "BTC-USD"]), HistoricalRange::SevenDays, date(2024, 8, 7))
            .await;

        assert_eq!(summary.counts.skipped, 1);
        assert_eq!(summary.counts.errors, 0);
        assert_eq!(summary.counts.processed, 1);
        // 7D = 31.07 - 07.08, крипта торгуется каждый день
        assert_eq!(store.daily_count("BTC-USD"), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_counts_as_error() {
        let store = Arc::new(InMemoryBarStore::new());
        store.fail_writes_for("QQQ");
        let engine = ingestor(
            Arc::new(ScriptedSource::new("TEST")),
            store.clone(),
            Arc::new(InMemoryMarketCache::new()),
        );

        let summary = engine
            .run_at(&symbols(&["QQQ", "SPY"]), HistoricalRange::SevenDays, date(2024, 8, 7))
            .await;

        assert_eq!(summary.counts.errors, 1);
        assert_eq!(summary.counts.processed, 1);
        assert!(store.daily_count("SPY") > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthetic_source_fills_every_symbol() {
        let store = Arc::new(InMemoryBarStore::new());
        let source = Arc::new(SyntheticProvider::new(SyntheticGenerator::new(DEFAULT_MARKET_TZ)));
        let engine = ingestor(source, store.clone(), Arc::new(InMemoryMarketCache::new()));
        let list = symbols(&[
            "AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "TSLA", "SPY", "BTC-USD", "ETH-USD",
        ]);

        let summary = engine.run_at(&list, HistoricalRange::OneMonth, date(2024, 8, 7)).await;

        assert_eq!(summary.counts.errors, 0);
        assert_eq!(summary.counts.processed, 10);
        for symbol in &list {
            assert!(store.daily_count(symbol) > 0, "{} has no bars", symbol);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_paced() {
        let store = Arc::new(InMemoryBarStore::new());
        let mut settings = settings();
        settings.batch_size = 2;
        let engine = HistoricalIngestor::new(
            Arc::new(ScriptedSource::new("TEST")),
            store,
            Arc::new(InMemoryMarketCache::new()),
            settings,
        );

        let started = tokio::time::Instant::now();
        engine
            .run_at(&symbols(&["A", "B", "C", "D", "E"]), HistoricalRange::SevenDays, date(2024, 8, 7))
            .await;

        // 3 пакета, 2 паузы между ними
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_bar_is_mirrored_to_cache() {
        let cache = Arc::new(InMemoryMarketCache::new());
        let engine = ingestor(
            Arc::new(ScriptedSource::new("TEST")),
            Arc::new(InMemoryBarStore::new()),
            cache.clone(),
        );

        engine
            .run_at(&symbols(&["AAPL"]), HistoricalRange::SevenDays, date(2024, 8, 7))
            .await;

        let cached: Option<CachedBar> = get_json(cache.as_ref(), CacheKey::DailyData("AAPL", date(2024, 8, 7)))
            .await
            .unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_cache_is_not_fatal() {
        let cache = Arc::new(UnreachableCache::default());
        let store = Arc::new(InMemoryBarStore::new());
        let engine = ingestor(Arc::new(ScriptedSource::new("TEST")), store.clone(), cache.clone());

        let summary = engine
            .run_at(&symbols(&["AAPL", "BTC-USD"]), HistoricalRange::SevenDays, date(2024, 8, 7))
            .await;

        assert_eq!(summary.counts.errors, 0);
        assert_eq!(summary.counts.processed, 2);
        assert_eq!(cache.attempts(), 2);
    }
}
