use super::MarketDataSource;
use crate::market_data::errors::ProviderError;
use crate::market_data::models::{Bar, DateWindow, PriceQuote};
use crate::market_data::symbols::{AssetClass, asset_class};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Routes crypto-pattern symbols to the crypto provider and everything else
/// to the equity/ETF provider.
pub struct LiveProvider {
    equity: Arc<dyn MarketDataSource>,
    crypto: Arc<dyn MarketDataSource>,
}

impl LiveProvider {
    pub fn new(equity: Arc<dyn MarketDataSource>, crypto: Arc<dyn MarketDataSource>) -> Self {
        Self { equity, crypto }
    }

    fn route(&self, symbol: &str) -> &Arc<dyn MarketDataSource> {
        match asset_class(symbol) {
            AssetClass::Crypto => &self.crypto,
            AssetClass::Equity => &self.equity,
        }
    }
}

#[async_trait]
impl MarketDataSource for LiveProvider {
    fn name(&self) -> &'static str {
        "LIVE"
    }

    async fn daily_bars(&self, symbol: &str, window: DateWindow) -> Result<Vec<Bar>, ProviderError> {
        self.route(symbol).daily_bars(symbol, window).await
    }

    async fn intraday_bars(&self, symbol: &str, date: NaiveDate) -> Result<Vec<Bar>, ProviderError> {
        self.route(symbol).intraday_bars(symbol, date).await
    }

    async fn latest_quote(&self, symbol: &str) -> Result<PriceQuote, ProviderError> {
        self.route(symbol).latest_quote(symbol).await
    }
}
