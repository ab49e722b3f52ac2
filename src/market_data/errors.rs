//! Error types shared by the provider client, the store and the cache.

use thiserror::Error;

/// Failures of a single provider request after the client's retry policy ran.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// HTTP 429 on the first attempt and on the retry.
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String },

    /// 5xx, timeout or connection failure on the first attempt and on the retry.
    #[error("Provider unavailable: {provider} - {reason}")]
    Unavailable { provider: String, reason: String },

    /// Non-transient: other 4xx or a payload that cannot be decoded.
    #[error("Bad request: {provider} - {message}")]
    BadRequest { provider: String, message: String },

    /// The symbol has no id on the provider it routes to.
    #[error("No provider mapping for symbol {symbol}")]
    MappingMissing { symbol: String },
}

impl ProviderError {
    /// Transient errors are counted as run errors; the rest are configuration problems.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Unavailable { .. }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Write failed for {symbol}: {message}")]
    WriteFailed { symbol: String, message: String },

    #[error("Query failed for {symbol}: {message}")]
    QueryFailed { symbol: String, message: String },
}

/// Cache failures never reach the engines' callers; they are logged and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unreachable: {0}")]
    Unreachable(String),

    #[error("Cache payload error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Why one symbol of an engine run produced no data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::RateLimited { provider: "FINNHUB".into() }.is_transient());
        assert!(
            ProviderError::Unavailable {
                provider: "COINGECKO".into(),
                reason: "503".into()
            }
            .is_transient()
        );
        assert!(
            !ProviderError::BadRequest {
                provider: "FINNHUB".into(),
                message: "401".into()
            }
            .is_transient()
        );
        assert!(!ProviderError::MappingMissing { symbol: "FOO-USD".into() }.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = ProviderError::RateLimited { provider: "FINNHUB".into() };
        assert_eq!(err.to_string(), "Rate limited: FINNHUB");

        let err = StoreError::WriteFailed {
            symbol: "AAPL".into(),
            message: "timeout".into(),
        };
        assert_eq!(err.to_string(), "Write failed for AAPL: timeout");
    }
}
