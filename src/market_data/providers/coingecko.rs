//! CoinGecko crypto provider.
//!
//! CoinGecko's range endpoint reports spot prices, not candles. Daily bars are
//! aggregated per UTC date; hourly bars get a narrow synthetic high/low band
//! around the observed prices.

use super::MarketDataSource;
use crate::env_config::models::app_config::ProviderEndpointConfig;
use crate::market_data::client::{ProviderEndpoint, ProviderRequest, RateLimitedClient};
use crate::market_data::errors::ProviderError;
use crate::market_data::models::bar::{RawBar, map_raw_bars, to_price};
use crate::market_data::models::{Bar, DateWindow, PriceQuote};
use crate::market_data::symbols::{CryptoIdMap, normalize_symbol};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Timelike, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const PROVIDER_ID: &str = "COINGECKO";

const VS_CURRENCY: &str = "usd";

/// Response from /coins/{id}/market_chart/range: [timestamp_ms, value] pairs
#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    #[serde(default)]
    prices: Vec<(i64, Option<f64>)>,
    #[serde(default)]
    total_volumes: Vec<(i64, Option<f64>)>,
}

/// Entry of /simple/price
#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
    last_updated_at: Option<i64>,
}

/// Accumulates spot prices of one bucket (a day or an hour).
#[derive(Debug, Clone, Copy)]
struct Bucket {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: Option<f64>,
}

impl Bucket {
    fn new(price: f64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
            volume: None,
        }
    }

    fn push(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }
}

pub struct CoinGeckoProvider {
    client: Arc<RateLimitedClient>,
    endpoint: ProviderEndpoint,
    ids: CryptoIdMap,
    /// Half-width of the synthetic intraday band as a fraction of price
    band: f64,
}

impl CoinGeckoProvider {
    pub fn new(
        client: Arc<RateLimitedClient>,
        config: &ProviderEndpointConfig,
        api_key: Option<String>,
        ids: CryptoIdMap,
        band_bps: u32,
    ) -> Self {
        Self {
            client,
            endpoint: ProviderEndpoint {
                id: PROVIDER_ID,
                base_url: config.base_url.clone(),
                auth_header: api_key.map(|key| ("x-cg-demo-api-key", key)),
                timeout: Duration::from_secs(config.timeout_seconds),
            },
            ids,
            band: band_bps as f64 / 10_000.0,
        }
    }

    fn coin_id(&self, symbol: &str) -> Result<String, ProviderError> {
        self.ids
            .resolve(symbol)
            .ok_or_else(|| ProviderError::MappingMissing {
                symbol: symbol.to_string(),
            })
    }

    async fn market_chart(
        &self,
        coin_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<MarketChartResponse, ProviderError> {
        let request = ProviderRequest::new(format!("/coins/{}/market_chart/range", coin_id))
            .param("vs_currency", VS_CURRENCY)
            .param("from", from.timestamp())
            .param("to", to.timestamp());

        self.client.fetch_json(&self.endpoint, &request).await
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoProvider {
    fn name(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn daily_bars(&self, symbol: &str, window: DateWindow) -> Result<Vec<Bar>, ProviderError> {
        let symbol = normalize_symbol(symbol);
        let coin_id = self.coin_id(&symbol)?;

        let from = window.start.and_time(NaiveTime::MIN).and_utc();
        let to = window
            .end
            .checked_add_days(Days::new(1))
            .map(|next| next.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or(from);

        let chart = self.market_chart(&coin_id, from, to).await?;
        let rows = aggregate_daily(&chart);
        let (mut bars, dropped) = map_raw_bars(&symbol, rows, false);
        if dropped > 0 {
            debug!("{}: dropped {} incomplete daily rows for {}", PROVIDER_ID, dropped, symbol);
        }

        bars.retain(|bar| window.contains(bar.date));
        Ok(bars)
    }

    async fn intraday_bars(&self, symbol: &str, date: NaiveDate) -> Result<Vec<Bar>, ProviderError> {
        let symbol = normalize_symbol(symbol);
        let coin_id = self.coin_id(&symbol)?;

        let from = date.and_time(NaiveTime::MIN).and_utc();
        let to = date
            .checked_add_days(Days::new(1))
            .map(|next| next.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or(from)
            .min(Utc::now());

        let chart = self.market_chart(&coin_id, from, to).await?;
        let rows = aggregate_hourly(&chart, date, self.band);
        let (bars, dropped) = map_raw_bars(&symbol, rows, true);
        if dropped > 0 {
            debug!("{}: dropped {} incomplete intraday rows for {}", PROVIDER_ID, dropped, symbol);
        }
        Ok(bars)
    }

    async fn latest_quote(&self, symbol: &str) -> Result<PriceQuote, ProviderError> {
        let symbol = normalize_symbol(symbol);
        let coin_id = self.coin_id(&symbol)?;

        let request = ProviderRequest::new("/simple/price")
            .param("ids", &coin_id)
            .param("vs_currencies", VS_CURRENCY)
            .param("include_24hr_change", "true")
            .param("include_last_updated_at", "true");

        let mut response: HashMap<String, SimplePrice> =
            self.client.fetch_json(&self.endpoint, &request).await?;

        let entry = response.remove(&coin_id).ok_or_else(|| ProviderError::BadRequest {
            provider: PROVIDER_ID.to_string(),
            message: format!("No price for {} ({})", symbol, coin_id),
        })?;

        let spot = entry.usd.filter(|price| *price > 0.0).ok_or_else(|| ProviderError::BadRequest {
            provider: PROVIDER_ID.to_string(),
            message: format!("Empty price for {} ({})", symbol, coin_id),
        })?;

        // Предыдущее закрытие восстанавливаем из изменения за 24 часа
        let previous = match entry.usd_24h_change {
            Some(pct) if pct > -100.0 => spot / (1.0 + pct / 100.0),
            _ => spot,
        };

        let as_of = entry
            .last_updated_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        let price = to_price(spot).unwrap_or_default();
        let previous_close = to_price(previous).unwrap_or(price);
        Ok(PriceQuote::new(&symbol, price, previous_close, as_of))
    }
}

fn millis_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ts)
}

/// first/max/min/last spot price per UTC date, last reported volume of the date.
fn aggregate_daily(chart: &MarketChartResponse) -> Vec<RawBar> {
    let mut days: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();

    for (ts, price) in &chart.prices {
        let (Some(time), Some(price)) = (millis_to_utc(*ts), *price) else {
            continue;
        };
        days.entry(time.date_naive())
            .and_modify(|bucket| bucket.push(price))
            .or_insert_with(|| Bucket::new(price));
    }

    for (ts, volume) in &chart.total_volumes {
        let Some(time) = millis_to_utc(*ts) else {
            continue;
        };
        if let Some(bucket) = days.get_mut(&time.date_naive()) {
            bucket.volume = volume.or(bucket.volume);
        }
    }

    days.into_iter()
        .map(|(date, bucket)| RawBar {
            time: Some(date.and_time(NaiveTime::MIN).and_utc()),
            open: Some(bucket.open),
            high: Some(bucket.high),
            low: Some(bucket.low),
            close: Some(bucket.close),
            volume: bucket.volume,
        })
        .collect()
}

/// Hourly buckets of `date`. Each bar opens at the previous bar's close and its
/// high/low are widened by `band` because the feed has no true range.
fn aggregate_hourly(chart: &MarketChartResponse, date: NaiveDate, band: f64) -> Vec<RawBar> {
    let mut hours: BTreeMap<u32, Bucket> = BTreeMap::new();

    for (ts, price) in &chart.prices {
        let (Some(time), Some(price)) = (millis_to_utc(*ts), *price) else {
            continue;
        };
        if time.date_naive() != date {
            continue;
        }
        hours
            .entry(time.hour())
            .and_modify(|bucket| bucket.push(price))
            .or_insert_with(|| Bucket::new(price));
    }

    let mut previous_close: Option<f64> = None;
    let mut rows = Vec::with_capacity(hours.len());

    for (hour, bucket) in hours {
        let open = previous_close.unwrap_or(bucket.open);
        let high = bucket.high.max(open) * (1.0 + band);
        let low = bucket.low.min(open) * (1.0 - band);
        previous_close = Some(bucket.close);

        rows.push(RawBar {
            time: NaiveTime::from_hms_opt(hour, 0, 0).map(|t| date.and_time(t).and_utc()),
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close: Some(bucket.close),
            volume: None,
        });
    }

    rows
}
