use std::collections::HashMap;

const CRYPTO_SUFFIXES: [&str; 3] = ["-USD", "-USDT", "-USDC"];

/// Built-in CoinGecko ids for the most common pairs.
const DEFAULT_CRYPTO_IDS: [(&str, &str); 14] = [
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("DOT", "polkadot"),
    ("AVAX", "avalanche-2"),
    ("LINK", "chainlink"),
    ("LTC", "litecoin"),
    ("MATIC", "matic-network"),
    ("TRX", "tron"),
    ("ATOM", "cosmos"),
];

/// Routing class of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Equity,
    Crypto,
}

pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

pub fn asset_class(symbol: &str) -> AssetClass {
    let upper = normalize_symbol(symbol);
    if CRYPTO_SUFFIXES.iter().any(|suffix| upper.ends_with(suffix) && upper.len() > suffix.len()) {
        AssetClass::Crypto
    } else {
        AssetClass::Equity
    }
}

pub fn is_crypto_symbol(symbol: &str) -> bool {
    asset_class(symbol) == AssetClass::Crypto
}

/// Base ticker of a crypto pair: "BTC-USD" -> "BTC".
fn crypto_base(symbol: &str) -> String {
    let upper = normalize_symbol(symbol);
    CRYPTO_SUFFIXES
        .iter()
        .find_map(|suffix| upper.strip_suffix(suffix).map(str::to_string))
        .unwrap_or(upper)
}

/// Symbol -> crypto provider id lookup. Full-symbol overrides win over the base-ticker table.
#[derive(Debug, Clone, Default)]
pub struct CryptoIdMap {
    overrides: HashMap<String, String>,
}

impl CryptoIdMap {
    pub fn new(overrides: &HashMap<String, String>) -> Self {
        Self {
            overrides: overrides
                .iter()
                .map(|(symbol, id)| (normalize_symbol(symbol), id.trim().to_string()))
                .collect(),
        }
    }

    pub fn resolve(&self, symbol: &str) -> Option<String> {
        let upper = normalize_symbol(symbol);
        if let Some(id) = self.overrides.get(&upper) {
            return Some(id.clone());
        }

        let base = crypto_base(&upper);
        DEFAULT_CRYPTO_IDS
            .iter()
            .find(|(ticker, _)| *ticker == base)
            .map(|(_, id)| (*id).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_class_routing() {
        assert_eq!(asset_class("BTC-USD"), AssetClass::Crypto);
        assert_eq!(asset_class("eth-usdt"), AssetClass::Crypto);
        assert_eq!(asset_class("AAPL"), AssetClass::Equity);
        assert_eq!(asset_class("SPY"), AssetClass::Equity);
        assert_eq!(asset_class("-USD"), AssetClass::Equity);
    }

    #[test]
    fn test_crypto_id_resolution() {
        let mut overrides = HashMap::new();
        overrides.insert("pepe-usd".to_string(), "pepe".to_string());
        overrides.insert("BTC-USD".to_string(), "wrapped-bitcoin".to_string());
        let map = CryptoIdMap::new(&overrides);

        assert_eq!(map.resolve("ETH-USD").as_deref(), Some("ethereum"));
        assert_eq!(map.resolve("SOL-USDT").as_deref(), Some("solana"));
        assert_eq!(map.resolve("PEPE-USD").as_deref(), Some("pepe"));
        assert_eq!(map.resolve("BTC-USD").as_deref(), Some("wrapped-bitcoin"));
        assert_eq!(map.resolve("UNKNOWN-USD"), None);
    }
}
