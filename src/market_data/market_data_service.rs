use crate::env_config::models::app_setting::AppSettings;
use crate::market_data::client::{ProviderPacer, RateLimitedClient, ReqwestTransport, RetryPolicy};
use crate::market_data::providers::coingecko::{self, CoinGeckoProvider};
use crate::market_data::providers::finnhub::{self, FinnhubProvider};
use crate::market_data::providers::{IngestionMode, LiveProvider, MarketDataSource, SyntheticProvider};
use crate::market_data::symbols::CryptoIdMap;
use crate::market_data::synthetic::SyntheticGenerator;
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct MarketDataService {
    pub mode: IngestionMode,
    pub source: Arc<dyn MarketDataSource>,
}

impl MarketDataService {
    /// Picks live or synthetic data once for the whole process lifetime.
    pub fn new(settings: &Arc<AppSettings>, market_tz: Tz) -> Result<Self, Box<dyn std::error::Error>> {
        let providers = &settings.app_config.providers;
        let mode = IngestionMode::resolve(
            settings.app_config.ingestion.mode,
            settings.app_env.finnhub_api_key.as_deref(),
        );

        info!("Market data ingestion mode: {}", mode);

        let source: Arc<dyn MarketDataSource> = match mode {
            IngestionMode::Synthetic => {
                Arc::new(SyntheticProvider::new(SyntheticGenerator::new(market_tz)))
            }
            IngestionMode::Live => {
                // Один pacer на процесс: исторические и real-time задачи делят лимиты провайдеров
                let pacer = Arc::new(
                    ProviderPacer::new(Duration::from_millis(providers.equity.min_interval_ms))
                        .with_interval(
                            finnhub::PROVIDER_ID,
                            Duration::from_millis(providers.equity.min_interval_ms),
                        )
                        .with_interval(
                            coingecko::PROVIDER_ID,
                            Duration::from_millis(providers.crypto.min_interval_ms),
                        ),
                );

                let client = Arc::new(RateLimitedClient::new(
                    Arc::new(ReqwestTransport::new()?),
                    pacer,
                    RetryPolicy {
                        rate_limit_cooldown: Duration::from_secs(providers.rate_limit_cooldown_seconds),
                        server_error_cooldown: Duration::from_secs(
                            providers.server_error_cooldown_seconds,
                        ),
                    },
                ));

                let equity_key = settings.app_env.finnhub_api_key.clone().unwrap_or_default();
                let equity = Arc::new(FinnhubProvider::new(
                    client.clone(),
                    &providers.equity,
                    equity_key,
                    market_tz,
                ));
                let crypto = Arc::new(CoinGeckoProvider::new(
                    client,
                    &providers.crypto,
                    settings.app_env.coingecko_api_key.clone(),
                    CryptoIdMap::new(&providers.crypto_ids),
                    providers.crypto_band_bps,
                ));

                Arc::new(LiveProvider::new(equity, crypto))
            }
        };

        Ok(Self { mode, source })
    }
}
