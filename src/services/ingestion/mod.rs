pub mod historical;
pub mod realtime;
pub mod summary;

use crate::market_data::symbols::normalize_symbol;
use std::collections::HashSet;

pub use historical::{HistoricalIngestor, HistoricalSettings};
pub use realtime::{RealtimeSettings, RealtimeUpdater};
pub use summary::RunCounts;

/// Upper-cased, trimmed, without duplicates; first occurrence keeps its position.
pub fn unique_symbols(symbols: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .map(|symbol| normalize_symbol(symbol))
        .filter(|symbol| !symbol.is_empty() && seen.insert(symbol.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_symbols() {
        let input: Vec<String> = ["aapl", "AAPL ", "", "btc-usd", "MSFT"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(unique_symbols(&input), vec!["AAPL", "BTC-USD", "MSFT"]);
    }
}
