use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::bar::PRICE_SCALE;

/// Current price snapshot with change versus the prior close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: Decimal,
    pub previous_close: Decimal,
    pub change: Decimal,
    pub change_percent: Decimal,
    pub as_of: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(symbol: &str, price: Decimal, previous_close: Decimal, as_of: DateTime<Utc>) -> Self {
        let change = (price - previous_close).round_dp(PRICE_SCALE);
        let change_percent = if previous_close.is_zero() {
            Decimal::ZERO
        } else {
            (change / previous_close * Decimal::ONE_HUNDRED).round_dp(4)
        };

        Self {
            symbol: symbol.to_string(),
            price,
            previous_close,
            change,
            change_percent,
            as_of,
        }
    }
}
