//! Finnhub equity/ETF provider.
//!
//! - daily and hourly candles via /stock/candle (resolution D / 60)
//! - latest price via /quote

use super::MarketDataSource;
use crate::env_config::models::app_config::ProviderEndpointConfig;
use crate::market_data::client::{ProviderEndpoint, ProviderRequest, RateLimitedClient};
use crate::market_data::errors::ProviderError;
use crate::market_data::models::bar::{RawBar, map_raw_bars, to_price};
use crate::market_data::models::{Bar, DateWindow, PriceQuote};
use crate::market_data::symbols::normalize_symbol;
use crate::utils::time::local_to_utc;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const PROVIDER_ID: &str = "FINNHUB";

/// Response from /stock/candle
#[derive(Debug, Deserialize)]
struct CandleResponse {
    /// "ok" or "no_data"
    s: String,
    #[serde(default)]
    o: Vec<Option<f64>>,
    #[serde(default)]
    h: Vec<Option<f64>>,
    #[serde(default)]
    l: Vec<Option<f64>>,
    #[serde(default)]
    c: Vec<Option<f64>>,
    #[serde(default)]
    v: Vec<Option<f64>>,
    #[serde(default)]
    t: Vec<i64>,
}

impl CandleResponse {
    fn into_raw_bars(self) -> Vec<RawBar> {
        let at = |values: &Vec<Option<f64>>, index: usize| values.get(index).copied().flatten();

        self.t
            .iter()
            .enumerate()
            .map(|(index, ts)| RawBar {
                time: DateTime::<Utc>::from_timestamp(*ts, 0),
                open: at(&self.o, index),
                high: at(&self.h, index),
                low: at(&self.l, index),
                close: at(&self.c, index),
                volume: at(&self.v, index),
            })
            .collect()
    }
}

/// Response from /quote
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
}

pub struct FinnhubProvider {
    client: Arc<RateLimitedClient>,
    endpoint: ProviderEndpoint,
    market_tz: Tz,
}

impl FinnhubProvider {
    pub fn new(
        client: Arc<RateLimitedClient>,
        config: &ProviderEndpointConfig,
        api_key: String,
        market_tz: Tz,
    ) -> Self {
        Self {
            client,
            endpoint: ProviderEndpoint {
                id: PROVIDER_ID,
                base_url: config.base_url.clone(),
                auth_header: Some(("X-Finnhub-Token", api_key)),
                timeout: Duration::from_secs(config.timeout_seconds),
            },
            market_tz,
        }
    }

    async fn candles(
        &self,
        symbol: &str,
        resolution: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawBar>, ProviderError> {
        let request = ProviderRequest::new("/stock/candle")
            .param("symbol", symbol)
            .param("resolution", resolution)
            .param("from", from.timestamp())
            .param("to", to.timestamp());

        let response: CandleResponse = self.client.fetch_json(&self.endpoint, &request).await?;

        match response.s.as_str() {
            "ok" => Ok(response.into_raw_bars()),
            "no_data" => {
                debug!("{}: no candles for {} ({})", PROVIDER_ID, symbol, resolution);
                Ok(Vec::new())
            }
            other => Err(ProviderError::BadRequest {
                provider: PROVIDER_ID.to_string(),
                message: format!("Unexpected candle status '{}' for {}", other, symbol),
            }),
        }
    }
}

#[async_trait]
impl MarketDataSource for FinnhubProvider {
    fn name(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn daily_bars(&self, symbol: &str, window: DateWindow) -> Result<Vec<Bar>, ProviderError> {
        let symbol = normalize_symbol(symbol);
        let from = window.start.and_time(NaiveTime::MIN).and_utc();
        let to = window
            .end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc())
            .unwrap_or(from);

        let rows = self.candles(&symbol, "D", from, to).await?;
        let (mut bars, dropped) = map_raw_bars(&symbol, rows, false);
        if dropped > 0 {
            debug!("{}: dropped {} incomplete daily rows for {}", PROVIDER_ID, dropped, symbol);
        }

        bars.retain(|bar| window.contains(bar.date));
        Ok(bars)
    }

    async fn intraday_bars(&self, symbol: &str, date: NaiveDate) -> Result<Vec<Bar>, ProviderError> {
        let symbol = normalize_symbol(symbol);
        let day_start = local_to_utc(date.and_time(NaiveTime::MIN), self.market_tz);
        let day_end = date
            .and_hms_opt(23, 59, 59)
            .and_then(|naive| local_to_utc(naive, self.market_tz));

        let (Some(from), Some(to)) = (day_start, day_end) else {
            return Ok(Vec::new());
        };

        let rows = self.candles(&symbol, "60", from, to).await?;
        let (mut bars, dropped) = map_raw_bars(&symbol, rows, true);
        if dropped > 0 {
            debug!("{}: dropped {} incomplete intraday rows for {}", PROVIDER_ID, dropped, symbol);
        }

        // Торговый день определяется по времени биржи, а не по UTC
        for bar in &mut bars {
            bar.date = date;
        }
        Ok(bars)
    }

    async fn latest_quote(&self, symbol: &str) -> Result<PriceQuote, ProviderError> {
        let symbol = normalize_symbol(symbol);
        let request = ProviderRequest::new("/quote").param("symbol", &symbol);
        let response: QuoteResponse = self.client.fetch_json(&self.endpoint, &request).await?;

        // Для неизвестного тикера Finnhub отвечает нулями
        let price = response
            .c
            .filter(|price| *price > 0.0)
            .and_then(to_price)
            .ok_or_else(|| ProviderError::BadRequest {
                provider: PROVIDER_ID.to_string(),
                message: format!("No quote for {}", symbol),
            })?;
        let previous_close = response.pc.and_then(to_price).unwrap_or(price);
        let as_of = response
            .t
            .filter(|ts| *ts > 0)
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        Ok(PriceQuote::new(&symbol, price, previous_close, as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::client::{ProviderPacer, RetryPolicy};
    use crate::test_support::ScriptedTransport;
    use crate::utils::time::DEFAULT_MARKET_TZ;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn provider(transport: Arc<ScriptedTransport>) -> FinnhubProvider {
        let client = RateLimitedClient::new(
            transport,
            Arc::new(ProviderPacer::new(Duration::from_millis(10))),
            RetryPolicy {
                rate_limit_cooldown: Duration::from_secs(1),
                server_error_cooldown: Duration::from_secs(1),
            },
        );
        FinnhubProvider::new(
            Arc::new(client),
            &ProviderEndpointConfig {
                base_url: "http://finnhub.test".to_string(),
                min_interval_ms: 10,
                timeout_seconds: 5,
            },
            "secret".to_string(),
            DEFAULT_MARKET_TZ,
        )
    }

    fn window() -> DateWindow {
        DateWindow {
            start: NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 8, 2).unwrap(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_candles_are_mapped() {
        // 2024-08-01 and 2024-08-02 00:00 UTC; the second row misses its close
        let body = r#"{"s":"ok","o":[10.0,11.0],"h":[12.0,13.0],"l":[9.5,10.5],
                       "c":[11.5,null],"v":[1000,2000],"t":[1722470400,1722556800]}"#;
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(body)]));

        let bars = provider(transport.clone()).daily_bars("aapl", window()).await.unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].symbol, "AAPL");
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 8, 1).unwrap());
        assert_eq!(bars[0].close, Decimal::new(115, 1));
        assert!(bars[0].is_daily());

        let requests = transport.requests();
        assert_eq!(requests[0].path, "/stock/candle");
        assert!(requests[0].query.contains(&("resolution".to_string(), "D".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_data_is_empty_not_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(r#"{"s":"no_data"}"#)]));
        let bars = provider(transport).daily_bars("NEWCO", window()).await.unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_intraday_bars_belong_to_requested_day() {
        // 2024-08-01 20:30 EDT = 2024-08-02 00:30 UTC
        let body = r#"{"s":"ok","o":[10.0],"h":[10.5],"l":[9.9],"c":[10.2],"v":[300],"t":[1722558600]}"#;
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(body)]));
        let day = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();

        let bars = provider(transport).intraday_bars("AAPL", day).await.unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, day);
        assert_eq!(
            bars[0].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 8, 2, 0, 30, 0).unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_quote() {
        let body = r#"{"c":110.0,"d":10.0,"dp":10.0,"pc":100.0,"t":1722556800}"#;
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(body)]));

        let quote = provider(transport).latest_quote("AAPL").await.unwrap();

        assert_eq!(quote.price, Decimal::new(110, 0));
        assert_eq!(quote.previous_close, Decimal::new(100, 0));
        assert_eq!(quote.change_percent, Decimal::new(10, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_quote_is_bad_request() {
        let body = r#"{"c":0,"d":null,"dp":null,"pc":0,"t":0}"#;
        let transport = Arc::new(ScriptedTransport::new(vec![ScriptedTransport::ok(body)]));

        let result = provider(transport).latest_quote("NOPE").await;
        assert!(matches!(result, Err(ProviderError::BadRequest { .. })));
    }
}
