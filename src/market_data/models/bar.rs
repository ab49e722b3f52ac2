use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Prices are kept with this many fractional digits end to end.
pub const PRICE_SCALE: u32 = 8;

/// One OHLCV record. `timestamp == None` is a daily bar, otherwise an
/// intraday bar belonging to `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub timestamp: Option<DateTime<Utc>>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
    pub adjusted_close: Decimal,
}

impl Bar {
    pub fn is_daily(&self) -> bool {
        self.timestamp.is_none()
    }

    pub fn identity(&self) -> BarIdentity {
        BarIdentity {
            symbol: self.symbol.clone(),
            date: self.date,
            timestamp: self.timestamp,
        }
    }

    /// low <= open,close <= high. Providers may break it; it is reported, never enforced.
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BarIdentity {
    pub symbol: String,
    pub date: NaiveDate,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Provider-side tuple before validation. Any missing price rejects the row.
#[derive(Debug, Clone, Default)]
pub struct RawBar {
    pub time: Option<DateTime<Utc>>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl RawBar {
    /// Builds a daily bar (`intraday == false`) or an intraday bar stamped with `time`.
    pub fn into_bar(self, symbol: &str, intraday: bool) -> Option<Bar> {
        let time = self.time?;
        let open = to_price(self.open?)?;
        let high = to_price(self.high?)?;
        let low = to_price(self.low?)?;
        let close = to_price(self.close?)?;
        let volume = self
            .volume
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v.round() as u64)
            .unwrap_or(0);

        Some(Bar {
            symbol: symbol.to_string(),
            date: time.date_naive(),
            timestamp: intraday.then_some(time),
            open,
            high,
            low,
            close,
            volume,
            adjusted_close: close,
        })
    }
}

/// f64 -> Decimal rounded to PRICE_SCALE; NaN/inf are rejected.
pub fn to_price(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64_retain(value).map(|d| d.round_dp(PRICE_SCALE))
}

/// Maps a slice of raw rows, dropping incomplete ones.
pub fn map_raw_bars(symbol: &str, rows: Vec<RawBar>, intraday: bool) -> (Vec<Bar>, usize) {
    let total = rows.len();
    let bars: Vec<Bar> = rows
        .into_iter()
        .filter_map(|row| row.into_bar(symbol, intraday))
        .collect();
    let dropped = total - bars.len();
    (bars, dropped)
}

/// Serving-layer projection of a bar, as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBar {
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl From<&Bar> for CachedBar {
    fn from(bar: &Bar) -> Self {
        let time = bar.timestamp.unwrap_or_else(|| {
            bar.date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc())
                .unwrap_or_default()
        });
        Self {
            time,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn raw(close: Option<f64>) -> RawBar {
        RawBar {
            time: Some(Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap()),
            open: Some(10.0),
            high: Some(12.5),
            low: Some(9.75),
            close,
            volume: Some(1234.4),
        }
    }

    #[test]
    fn test_raw_bar_maps_to_daily() {
        let bar = raw(Some(11.0)).into_bar("AAPL", false).unwrap();
        assert!(bar.is_daily());
        assert_eq!(bar.date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(bar.volume, 1234);
        assert_eq!(bar.adjusted_close, bar.close);
    }

    #[test]
    fn test_raw_bar_maps_to_intraday() {
        let bar = raw(Some(11.0)).into_bar("AAPL", true).unwrap();
        assert_eq!(
            bar.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_missing_field_drops_row_but_ohlc_violation_does_not() {
        let mut broken = raw(Some(50.0));
        broken.high = Some(1.0);
        let (bars, dropped) = map_raw_bars("X", vec![raw(None), broken, raw(Some(11.0))], false);
        assert_eq!(dropped, 1);
        assert_eq!(bars.len(), 2);
        assert!(!bars[0].is_well_formed());
        assert!(bars[1].is_well_formed());
    }

    #[test]
    fn test_to_price_keeps_eight_digits() {
        let price = to_price(0.123456789123).unwrap();
        assert_eq!(price, Decimal::from_str("0.12345679").unwrap());
        assert!(to_price(f64::NAN).is_none());
    }
}
