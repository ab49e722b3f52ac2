use super::MarketDataSource;
use crate::market_data::errors::ProviderError;
use crate::market_data::models::{Bar, DateWindow, PriceQuote};
use crate::market_data::synthetic::{DailyOhlc, SyntheticGenerator};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

/// Generator-backed source. Never fails.
pub struct SyntheticProvider {
    generator: SyntheticGenerator,
}

impl SyntheticProvider {
    pub fn new(generator: SyntheticGenerator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl MarketDataSource for SyntheticProvider {
    fn name(&self) -> &'static str {
        "SYNTHETIC"
    }

    async fn daily_bars(&self, symbol: &str, window: DateWindow) -> Result<Vec<Bar>, ProviderError> {
        Ok(self
            .generator
            .generate_daily_bars(symbol, window.end, window.day_count()))
    }

    async fn intraday_bars(&self, symbol: &str, date: NaiveDate) -> Result<Vec<Bar>, ProviderError> {
        let Some(daily) = self.generator.daily_reference(symbol, date) else {
            return Ok(Vec::new());
        };

        Ok(self
            .generator
            .generate_intraday_bars(symbol, date, DailyOhlc::from(&daily), Utc::now()))
    }

    async fn latest_quote(&self, symbol: &str) -> Result<PriceQuote, ProviderError> {
        Ok(self.generator.generate_latest_quote(symbol, Utc::now()))
    }
}
