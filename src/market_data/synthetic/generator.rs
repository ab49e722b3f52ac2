//! Deterministic OHLCV generator used when live data is not available.
//!
//! Every value is a pure function of (symbol, date, salt): the same symbol and
//! day always produce the same bar, so re-running a synthetic backfill is a
//! no-op for the store.

use crate::market_data::models::bar::{Bar, to_price};
use crate::market_data::models::quote::PriceQuote;
use crate::market_data::symbols::{is_crypto_symbol, normalize_symbol};
use crate::utils::time::{last_trading_day, local_to_utc, previous_trading_day, trading_days};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

const DEFAULT_BASE_PRICE: f64 = 100.0;
const EQUITY_VOLATILITY: f64 = 0.015;
const CRYPTO_VOLATILITY: f64 = 0.035;
const EQUITY_BASE_VOLUME: f64 = 5_000_000.0;
const CRYPTO_BASE_VOLUME: f64 = 25_000.0;

/// Equity session: 7 hourly bars opening at 09:30 local time.
const EQUITY_SESSION_BARS: u32 = 7;

const BASE_PRICES: [(&str, f64); 16] = [
    ("AAPL", 190.0),
    ("MSFT", 420.0),
    ("NVDA", 120.0),
    ("AMZN", 180.0),
    ("GOOGL", 165.0),
    ("META", 500.0),
    ("TSLA", 220.0),
    ("SPY", 540.0),
    ("QQQ", 470.0),
    ("VTI", 270.0),
    ("BTC-USD", 65_000.0),
    ("ETH-USD", 3_200.0),
    ("SOL-USD", 150.0),
    ("BNB-USD", 560.0),
    ("XRP-USD", 0.55),
    ("DOGE-USD", 0.12),
];

#[derive(Debug, Clone, Copy)]
struct SymbolProfile {
    base_price: f64,
    volatility: f64,
    base_volume: f64,
    always_open: bool,
}

/// Daily reference values an intraday series has to stay within.
#[derive(Debug, Clone, Copy)]
pub struct DailyOhlc {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl From<&Bar> for DailyOhlc {
    fn from(bar: &Bar) -> Self {
        Self {
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    market_tz: Tz,
}

impl SyntheticGenerator {
    pub fn new(market_tz: Tz) -> Self {
        Self { market_tz }
    }

    /// Daily bars for the trading days among the `day_count` calendar days ending at `end`.
    pub fn generate_daily_bars(&self, symbol: &str, end: NaiveDate, day_count: u32) -> Vec<Bar> {
        let start = end
            .checked_sub_days(Days::new(day_count.saturating_sub(1) as u64))
            .unwrap_or(end);
        self.generate_daily_bars_between(symbol, start, end)
    }

    pub fn generate_daily_bars_between(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
        let symbol = normalize_symbol(symbol);
        let profile = profile(&symbol);

        trading_days(start, end, profile.always_open)
            .into_iter()
            .filter_map(|date| daily_bar(&symbol, profile, date))
            .collect()
    }

    /// Hourly bars for `date`, walking from the daily open to the daily close
    /// without leaving the daily high/low. Bars stamped after `now` are omitted.
    pub fn generate_intraday_bars(
        &self,
        symbol: &str,
        date: NaiveDate,
        daily: DailyOhlc,
        now: DateTime<Utc>,
    ) -> Vec<Bar> {
        let symbol = normalize_symbol(symbol);
        let profile = profile(&symbol);

        let open = daily.open.to_f64().unwrap_or(profile.base_price);
        let close = daily.close.to_f64().unwrap_or(open);
        let day_high = daily.high.to_f64().unwrap_or(open.max(close));
        let day_low = daily.low.to_f64().unwrap_or(open.min(close));

        let slots = self.session_slots(date, profile.always_open);
        let count = slots.len();
        if count == 0 {
            return Vec::new();
        }

        let band = (day_high - day_low).abs();
        let mut previous = open;
        let mut bars = Vec::with_capacity(count);

        for (index, timestamp) in slots.into_iter().enumerate() {
            let step = index as u64 + 1;
            let progress = step as f64 / count as f64;

            let bar_close = if step as usize == count {
                close
            } else {
                let target = open + (close - open) * progress;
                (target + noise(&symbol, date, 100 + step) * band * 0.25).clamp(day_low, day_high)
            };
            let bar_open = previous;
            let wiggle = profile.volatility * 0.2;
            let bar_high = (bar_open.max(bar_close) * (1.0 + noise(&symbol, date, 200 + step).abs() * wiggle))
                .min(day_high)
                .max(bar_open.max(bar_close));
            let bar_low = (bar_open.min(bar_close) * (1.0 - noise(&symbol, date, 300 + step).abs() * wiggle))
                .max(day_low)
                .min(bar_open.min(bar_close));
            let volume = profile.base_volume / count as f64 * (1.0 + noise(&symbol, date, 400 + step) * 0.3);

            previous = bar_close;

            if timestamp > now {
                continue;
            }

            if let Some(bar) = build_bar(&symbol, date, Some(timestamp), bar_open, bar_high, bar_low, bar_close, volume) {
                bars.push(bar);
            }
        }

        bars
    }

    /// Current price for the last trading day, with a minute-bucketed offset from its close.
    pub fn generate_latest_quote(&self, symbol: &str, now: DateTime<Utc>) -> PriceQuote {
        let symbol = normalize_symbol(symbol);
        let profile = profile(&symbol);
        let tz = if profile.always_open { chrono_tz::UTC } else { self.market_tz };

        let day = last_trading_day(now, tz, profile.always_open);
        let previous_day = previous_trading_day(day, profile.always_open);

        let previous_close = close_at(&symbol, profile, previous_day);
        let minute_salt = 1_000 + (now.hour() * 60 + now.minute()) as u64;
        let price = close_at(&symbol, profile, day)
            * (1.0 + noise(&symbol, day, minute_salt) * profile.volatility * 0.1);

        PriceQuote::new(
            &symbol,
            to_price(price).unwrap_or_default(),
            to_price(previous_close).unwrap_or_default(),
            now,
        )
    }

    /// Synthetic daily bar for a single date, also for non-trading days.
    pub fn daily_reference(&self, symbol: &str, date: NaiveDate) -> Option<Bar> {
        let symbol = normalize_symbol(symbol);
        daily_bar(&symbol, profile(&symbol), date)
    }

    fn session_slots(&self, date: NaiveDate, always_open: bool) -> Vec<DateTime<Utc>> {
        if always_open {
            return (0..24)
                .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
                .map(|time| date.and_time(time).and_utc())
                .collect();
        }

        (0..EQUITY_SESSION_BARS)
            .filter_map(|offset| NaiveTime::from_hms_opt(9 + offset, 30, 0))
            .filter_map(|time| local_to_utc(date.and_time(time), self.market_tz))
            .collect()
    }
}

fn profile(symbol: &str) -> SymbolProfile {
    let always_open = is_crypto_symbol(symbol);
    // Неизвестный символ получает цену по умолчанию, генератор не падает
    let base_price = BASE_PRICES
        .iter()
        .find(|(known, _)| *known == symbol)
        .map(|(_, price)| *price)
        .unwrap_or(DEFAULT_BASE_PRICE);

    SymbolProfile {
        base_price,
        volatility: if always_open { CRYPTO_VOLATILITY } else { EQUITY_VOLATILITY },
        base_volume: if always_open { CRYPTO_BASE_VOLUME } else { EQUITY_BASE_VOLUME },
        always_open,
    }
}

fn daily_bar(symbol: &str, profile: SymbolProfile, date: NaiveDate) -> Option<Bar> {
    let previous_close = close_at(symbol, profile, previous_trading_day(date, profile.always_open));
    let close = close_at(symbol, profile, date);
    let open = previous_close * (1.0 + noise(symbol, date, 2) * profile.volatility * 0.3);
    let high = open.max(close) * (1.0 + noise(symbol, date, 3).abs() * profile.volatility * 0.5);
    let low = open.min(close) * (1.0 - noise(symbol, date, 4).abs() * profile.volatility * 0.5);
    let volume = profile.base_volume * (1.0 + noise(symbol, date, 5) * 0.4);

    build_bar(symbol, date, None, open, high, low, close, volume)
}

/// Slow two-wave trend times a bounded daily shock; always positive.
fn close_at(symbol: &str, profile: SymbolProfile, date: NaiveDate) -> f64 {
    let seed = symbol_seed(symbol);
    let phase = (seed % 1_000) as f64 / 1_000.0 * std::f64::consts::TAU;
    let day = date.num_days_from_ce() as f64;

    let trend = 1.0 + 0.15 * (day / 90.0 + phase).sin() + 0.05 * (day / 17.0 + phase * 2.0).sin();
    let shock = 1.0 + noise(symbol, date, 1) * profile.volatility;

    profile.base_price * trend * shock
}

#[allow(clippy::too_many_arguments)]
fn build_bar(
    symbol: &str,
    date: NaiveDate,
    timestamp: Option<DateTime<Utc>>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
) -> Option<Bar> {
    let close = to_price(close)?;
    Some(Bar {
        symbol: symbol.to_string(),
        date,
        timestamp,
        open: to_price(open)?,
        high: to_price(high)?,
        low: to_price(low)?,
        close,
        volume: volume.max(0.0).round() as u64,
        adjusted_close: close,
    })
}

/// Uniform value in [-1, 1) for (symbol, date, salt).
fn noise(symbol: &str, date: NaiveDate, salt: u64) -> f64 {
    let day = date.num_days_from_ce() as u64;
    let seed = symbol_seed(symbol)
        ^ day.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ salt.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    StdRng::seed_from_u64(seed).gen_range(-1.0..1.0)
}

/// FNV-1a over the symbol bytes; stable across processes.
fn symbol_seed(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::{DEFAULT_MARKET_TZ, is_weekend};
    use chrono::TimeZone;

    fn generator() -> SyntheticGenerator {
        SyntheticGenerator::new(DEFAULT_MARKET_TZ)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_daily_bars_are_deterministic() {
        let first = generator().generate_daily_bars("AAPL", date(2024, 8, 16), 30);
        let second = generator().generate_daily_bars("aapl", date(2024, 8, 16), 30);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_equities_skip_weekends_crypto_does_not() {
        let equity = generator().generate_daily_bars("MSFT", date(2024, 8, 18), 14);
        assert_eq!(equity.len(), 10);
        assert!(equity.iter().all(|bar| !is_weekend(bar.date)));

        let crypto = generator().generate_daily_bars("BTC-USD", date(2024, 8, 18), 14);
        assert_eq!(crypto.len(), 14);
    }

    #[test]
    fn test_bars_are_ordered_and_well_formed() {
        let bars = generator().generate_daily_bars("ETH-USD", date(2024, 8, 18), 120);
        for pair in bars.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
        for bar in &bars {
            assert!(bar.is_well_formed(), "bar {:?} out of range", bar);
            assert!(bar.low > Decimal::ZERO);
            assert!(bar.is_daily());
        }
    }

    #[test]
    fn test_unknown_symbol_falls_back_to_default_price() {
        let bars = generator().generate_daily_bars("ZZZZ", date(2024, 8, 16), 5);
        assert!(!bars.is_empty());
        let close = bars[0].close.to_f64().unwrap();
        assert!(close > 50.0 && close < 150.0);
    }

    #[test]
    fn test_overlapping_windows_agree() {
        let long = generator().generate_daily_bars("SPY", date(2024, 8, 16), 30);
        let short = generator().generate_daily_bars("SPY", date(2024, 8, 16), 7);
        assert_eq!(&long[long.len() - short.len()..], short.as_slice());
    }

    #[test]
    fn test_intraday_bars_stay_within_daily_range() {
        let day = date(2024, 8, 16);
        let daily = generator().daily_reference("AAPL", day).unwrap();
        let end_of_day = Utc.with_ymd_and_hms(2024, 8, 17, 0, 0, 0).unwrap();

        let bars = generator().generate_intraday_bars("AAPL", day, DailyOhlc::from(&daily), end_of_day);

        assert_eq!(bars.len(), EQUITY_SESSION_BARS as usize);
        assert_eq!(bars.last().unwrap().close, daily.close);
        assert_eq!(bars.first().unwrap().open, daily.open);
        for bar in &bars {
            assert!(bar.high <= daily.high && bar.low >= daily.low);
            assert_eq!(bar.date, day);
            assert!(bar.timestamp.is_some());
        }
        // 09:30 New York (EDT) = 13:30 UTC
        assert_eq!(
            bars[0].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 8, 16, 13, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_intraday_bars_omit_future_slots() {
        let day = date(2024, 8, 16);
        let daily = generator().daily_reference("BTC-USD", day).unwrap();
        let midday = Utc.with_ymd_and_hms(2024, 8, 16, 11, 30, 0).unwrap();

        let bars = generator().generate_intraday_bars("BTC-USD", day, DailyOhlc::from(&daily), midday);
        assert_eq!(bars.len(), 12);
    }

    #[test]
    fn test_latest_quote_change_matches_previous_close() {
        let now = Utc.with_ymd_and_hms(2024, 8, 17, 15, 0, 0).unwrap();
        let quote = generator().generate_latest_quote("NVDA", now);
        assert_eq!(quote.symbol, "NVDA");
        assert!(quote.price > Decimal::ZERO);
        assert_eq!(quote.change, quote.price - quote.previous_close);
    }
}
