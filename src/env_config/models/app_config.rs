use crate::market_data::models::range::HistoricalRange;
use crate::services::scheduler::cadence::Cadence;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub log: LogConfig,
    pub clickhouse: ClickhouseConfig,
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,
    pub providers: ProvidersConfig,
    pub ingestion: IngestionConfig,
    pub cache: CacheConfig,
    pub universe: UniverseConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
pub struct ClickhouseConfig {
    pub timeout: u64,
}

#[derive(Debug, Deserialize)]
pub struct PostgresConfig {
    pub timeout: u64,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: u64,
    pub idle_timeout: u64,
}

#[derive(Debug, Deserialize)]
pub struct RedisConfig {
    /// Upper bound for a single cache round trip
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpointConfig {
    pub base_url: String,
    /// Minimum spacing between two requests to this provider
    pub min_interval_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub equity: ProviderEndpointConfig,
    pub crypto: ProviderEndpointConfig,
    pub rate_limit_cooldown_seconds: u64,
    pub server_error_cooldown_seconds: u64,
    /// Half-width of the synthetic high/low band for spot-only crypto series, in basis points
    #[serde(default = "default_crypto_band_bps")]
    pub crypto_band_bps: u32,
    /// Symbol -> CoinGecko id overrides, merged over the built-in table
    #[serde(default)]
    pub crypto_ids: HashMap<String, String>,
}

fn default_crypto_band_bps() -> u32 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionModeSetting {
    Auto,
    Live,
    Synthetic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    pub mode: IngestionModeSetting,
    /// Symbols per batch; batches are separated by `batch_delay_ms`
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    /// Rows per INSERT round trip
    pub write_batch_size: usize,
    /// Ceiling for the MAX range
    pub max_lookback_years: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub latest_price_ttl_seconds: u64,
    pub hourly_data_ttl_seconds: u64,
    pub daily_data_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UniverseConfig {
    pub active_limit: usize,
    #[serde(default)]
    pub featured_symbols: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub timezone: String,
    #[serde(default)]
    pub run_on_start: Vec<String>,
    pub jobs: JobsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    pub daily_historical: JobScheduleConfig,
    pub full_historical: JobScheduleConfig,
    pub hourly: JobScheduleConfig,
    pub latest_price: JobScheduleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobScheduleConfig {
    pub enabled: bool,
    pub cadence: Cadence,
    /// Only meaningful for the historical jobs
    #[serde(default)]
    pub range: Option<HistoricalRange>,
}
