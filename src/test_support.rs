//! In-process fakes for the provider transport, data sources, stores and caches.

use crate::db::clickhouse::repository::bar_repository::{
    BarRepository, UpsertCounts, dedupe_daily, dedupe_intraday, sort_for_range,
};
use crate::db::postgres::repository::symbol_repository::SymbolUniverse;
use crate::db::redis::repository::market_cache_repository::{InMemoryMarketCache, MarketCache};
use crate::market_data::client::transport::{
    HttpTransport, ProviderEndpoint, ProviderRequest, TransportError, TransportResponse,
};
use crate::market_data::errors::{CacheError, ProviderError, StoreError};
use crate::market_data::models::{Bar, BarIdentity, DateWindow, PriceQuote};
use crate::market_data::providers::MarketDataSource;
use crate::market_data::synthetic::{DailyOhlc, SyntheticGenerator};
use crate::services::ingestion::{HistoricalIngestor, HistoricalSettings, RealtimeSettings, RealtimeUpdater};
use crate::services::scheduler::job::{JobRanges, JobRunner};
use crate::utils::time::DEFAULT_MARKET_TZ;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Replays queued responses; an exhausted queue answers 200 "{}".
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    calls: Mutex<Vec<(Instant, ProviderRequest)>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<TransportResponse, TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(body: &str) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.calls.lock().unwrap().iter().map(|(_, request)| request.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(
        &self,
        _endpoint: &ProviderEndpoint,
        request: &ProviderRequest,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push((Instant::now(), request.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedTransport::ok("{}"))
    }
}

/// Deterministic source backed by the synthetic generator, with per-symbol failures.
pub struct ScriptedSource {
    name: &'static str,
    generator: SyntheticGenerator,
    failures: HashMap<String, ProviderError>,
    delay: Option<Duration>,
    now: DateTime<Utc>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generator: SyntheticGenerator::new(DEFAULT_MARKET_TZ),
            failures: HashMap::new(),
            delay: None,
            now: fixed_now(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure(mut self, symbol: &str, error: ProviderError) -> Self {
        self.failures.insert(symbol.to_string(), error);
        self
    }

    /// Every call sleeps first; used to keep a run in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self, symbol: &str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(symbol.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.get(symbol) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MarketDataSource for ScriptedSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn daily_bars(&self, symbol: &str, window: DateWindow) -> Result<Vec<Bar>, ProviderError> {
        self.enter(symbol).await?;
        Ok(self.generator.generate_daily_bars_between(symbol, window.start, window.end))
    }

    async fn intraday_bars(&self, symbol: &str, date: NaiveDate) -> Result<Vec<Bar>, ProviderError> {
        self.enter(symbol).await?;
        let Some(daily) = self.generator.daily_reference(symbol, date) else {
            return Ok(Vec::new());
        };
        Ok(self
            .generator
            .generate_intraday_bars(symbol, date, DailyOhlc::from(&daily), DateTime::<Utc>::MAX_UTC))
    }

    async fn latest_quote(&self, symbol: &str) -> Result<PriceQuote, ProviderError> {
        self.enter(symbol).await?;
        Ok(self.generator.generate_latest_quote(symbol, self.now))
    }
}

/// Wednesday 2024-08-07 15:00 UTC, inside the US session.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 7, 15, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Keyed by bar identity, so rewrites of the same key replace the row.
#[derive(Default)]
pub struct InMemoryBarStore {
    rows: Mutex<BTreeMap<BarIdentity, Bar>>,
    failing: Mutex<HashSet<String>>,
    write_calls: AtomicUsize,
}

impl InMemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_for(&self, symbol: &str) {
        self.failing.lock().unwrap().insert(symbol.to_string());
    }

    pub fn bars(&self, symbol: &str) -> Vec<Bar> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .filter(|bar| bar.symbol == symbol)
            .cloned()
            .collect()
    }

    pub fn daily_count(&self, symbol: &str) -> usize {
        self.bars(symbol).iter().filter(|bar| bar.is_daily()).count()
    }

    pub fn intraday_count(&self, symbol: &str, date: NaiveDate) -> usize {
        self.bars(symbol)
            .iter()
            .filter(|bar| !bar.is_daily() && bar.date == date)
            .count()
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn check_writable(&self, symbol: &str) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(symbol) {
            return Err(StoreError::WriteFailed {
                symbol: symbol.to_string(),
                message: "connection reset".to_string(),
            });
        }
        Ok(())
    }

    fn write(&self, bars: Vec<&Bar>) -> UpsertCounts {
        let mut rows = self.rows.lock().unwrap();
        let mut counts = UpsertCounts::default();
        for bar in bars {
            match rows.insert(bar.identity(), bar.clone()) {
                Some(_) => counts.updated += 1,
                None => counts.inserted += 1,
            }
        }
        counts
    }
}

#[async_trait]
impl BarRepository for InMemoryBarStore {
    async fn upsert_bars(&self, symbol: &str, bars: &[Bar]) -> Result<UpsertCounts, StoreError> {
        let mut counts = self.upsert_daily_bars(symbol, bars).await?;
        counts += self.upsert_intraday_bars(symbol, bars).await?;
        Ok(counts)
    }

    async fn upsert_daily_bars(&self, symbol: &str, bars: &[Bar]) -> Result<UpsertCounts, StoreError> {
        self.check_writable(symbol)?;
        Ok(self.write(dedupe_daily(bars)))
    }

    async fn upsert_intraday_bars(&self, symbol: &str, bars: &[Bar]) -> Result<UpsertCounts, StoreError> {
        self.check_writable(symbol)?;
        Ok(self.write(dedupe_intraday(bars)))
    }

    async fn replace_intraday_bars(
        &self,
        symbol: &str,
        date: NaiveDate,
        bars: &[Bar],
    ) -> Result<UpsertCounts, StoreError> {
        self.check_writable(symbol)?;
        let existing: HashSet<BarIdentity> = {
            let mut rows = self.rows.lock().unwrap();
            let keys: HashSet<BarIdentity> = rows
                .keys()
                .filter(|key| key.symbol == symbol && key.date == date && key.timestamp.is_some())
                .cloned()
                .collect();
            rows.retain(|key, _| !keys.contains(key));
            keys
        };

        let fresh: Vec<&Bar> = dedupe_intraday(bars)
            .into_iter()
            .filter(|bar| bar.date == date)
            .collect();
        let mut counts = self.write(fresh.clone());
        counts.updated = fresh.iter().filter(|bar| existing.contains(&bar.identity())).count() as u64;
        counts.inserted = fresh.len() as u64 - counts.updated;
        Ok(counts)
    }

    async fn query_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, StoreError> {
        let mut bars: Vec<Bar> = self
            .bars(symbol)
            .into_iter()
            .filter(|bar| bar.date >= start && bar.date <= end)
            .collect();
        sort_for_range(&mut bars);
        Ok(bars)
    }

    async fn latest_daily_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, StoreError> {
        let daily: Vec<Bar> = self.bars(symbol).into_iter().filter(|bar| bar.is_daily()).collect();
        let skip = daily.len().saturating_sub(limit);
        Ok(daily.into_iter().skip(skip).collect())
    }
}

pub struct StaticSymbolUniverse {
    all: Vec<String>,
    active: Vec<String>,
}

impl StaticSymbolUniverse {
    pub fn new(all: &[&str], active: &[&str]) -> Self {
        Self {
            all: all.iter().map(|s| s.to_string()).collect(),
            active: active.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl SymbolUniverse for StaticSymbolUniverse {
    async fn all_symbols(&self) -> Result<Vec<String>, sqlx::Error> {
        Ok(self.all.clone())
    }

    async fn active_symbols(&self) -> Result<Vec<String>, sqlx::Error> {
        Ok(self.active.clone())
    }
}

/// Every operation fails as if Redis went away.
#[derive(Default)]
pub struct UnreachableCache {
    attempts: AtomicUsize,
}

impl UnreachableCache {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketCache for UnreachableCache {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unreachable("connection refused".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unreachable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Unreachable("connection refused".to_string()))
    }
}

/// Runner over all = [AAPL, MSFT, SPY], active = [AAPL, BTC-USD], no batch pauses.
pub fn job_runner(source: ScriptedSource, store: Arc<InMemoryBarStore>) -> JobRunner {
    job_runner_with(Arc::new(source), store)
}

/// Same runner, keeping a handle on the source to inspect its calls.
pub fn job_runner_with(source: Arc<ScriptedSource>, store: Arc<InMemoryBarStore>) -> JobRunner {
    let source: Arc<dyn MarketDataSource> = source;
    let cache = Arc::new(InMemoryMarketCache::new());
    let historical = HistoricalIngestor::new(
        source.clone(),
        store.clone(),
        cache.clone(),
        HistoricalSettings {
            batch_size: 10,
            batch_delay: Duration::ZERO,
            max_lookback_years: 10,
            daily_cache_ttl: Duration::from_secs(1200),
        },
    );
    let realtime = RealtimeUpdater::new(
        source,
        store,
        cache,
        RealtimeSettings {
            market_tz: DEFAULT_MARKET_TZ,
            hourly_ttl: Duration::from_secs(120),
            latest_price_ttl: Duration::from_secs(60),
        },
    );
    JobRunner::new(
        Arc::new(StaticSymbolUniverse::new(&["AAPL", "MSFT", "SPY"], &["AAPL", "BTC-USD"])),
        Arc::new(historical),
        Arc::new(realtime),
        JobRanges::default(),
    )
}
