//! Market data sources.
//!
//! Engines only see `MarketDataSource`. Which implementation sits behind it
//! (live HTTP providers or the synthetic generator) is decided once at startup
//! from `IngestionMode`.

pub mod coingecko;
pub mod finnhub;
pub mod live;
pub mod synthetic;

use crate::env_config::models::app_config::IngestionModeSetting;
use crate::market_data::errors::ProviderError;
use crate::market_data::models::{Bar, DateWindow, PriceQuote};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use tracing::warn;

pub use live::LiveProvider;
pub use synthetic::SyntheticProvider;

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Daily bars within `window`, ascending. An empty result is not an error.
    async fn daily_bars(&self, symbol: &str, window: DateWindow) -> Result<Vec<Bar>, ProviderError>;

    /// Intraday bars of one trading day, ascending.
    async fn intraday_bars(&self, symbol: &str, date: NaiveDate) -> Result<Vec<Bar>, ProviderError>;

    async fn latest_quote(&self, symbol: &str) -> Result<PriceQuote, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionMode {
    Live,
    Synthetic,
}

impl IngestionMode {
    /// Live data needs at least the equity provider key.
    pub fn resolve(setting: IngestionModeSetting, equity_api_key: Option<&str>) -> Self {
        let has_key = equity_api_key.is_some_and(|key| !key.trim().is_empty());
        match (setting, has_key) {
            (IngestionModeSetting::Synthetic, _) => IngestionMode::Synthetic,
            (IngestionModeSetting::Auto, true) | (IngestionModeSetting::Live, true) => IngestionMode::Live,
            (IngestionModeSetting::Auto, false) => IngestionMode::Synthetic,
            (IngestionModeSetting::Live, false) => {
                warn!("Live ingestion requested but no equity provider key is configured, using synthetic data");
                IngestionMode::Synthetic
            }
        }
    }
}

impl fmt::Display for IngestionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestionMode::Live => write!(f, "live"),
            IngestionMode::Synthetic => write!(f, "synthetic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_resolution() {
        assert_eq!(
            IngestionMode::resolve(IngestionModeSetting::Auto, None),
            IngestionMode::Synthetic
        );
        assert_eq!(
            IngestionMode::resolve(IngestionModeSetting::Auto, Some("key")),
            IngestionMode::Live
        );
        assert_eq!(
            IngestionMode::resolve(IngestionModeSetting::Live, Some("  ")),
            IngestionMode::Synthetic
        );
        assert_eq!(
            IngestionMode::resolve(IngestionModeSetting::Synthetic, Some("key")),
            IngestionMode::Synthetic
        );
    }
}
