// File: src/db/clickhouse/models/bar.rs
use crate::market_data::models::bar::{Bar, PRICE_SCALE};
use chrono::{DateTime, NaiveDate, Utc};
use clickhouse::Row;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Строка таблицы daily_bars. Цены - Decimal64(8), передаются как i64 мантиссы
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Row)]
pub struct DbDailyBar {
    pub symbol: String,
    /// Date = дни от 1970-01-01
    pub date: u16,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub adjusted_close: i64,
    pub volume: u64,
    /// Версия для ReplacingMergeTree, миллисекунды
    pub updated_at: i64,
}

/// Строка таблицы intraday_bars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Row)]
pub struct DbIntradayBar {
    pub symbol: String,
    pub date: u16,
    /// DateTime64(3, 'UTC'), миллисекунды
    pub timestamp: i64,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub adjusted_close: i64,
    pub volume: u64,
    pub updated_at: i64,
}

/// Ключ для подсчёта уже существующих дневных баров
#[derive(Debug, Deserialize, Row)]
pub struct DbDateKey {
    pub date: u16,
}

/// Ключ для подсчёта уже существующих внутридневных баров
#[derive(Debug, Deserialize, Row)]
pub struct DbIntradayKey {
    pub date: u16,
    pub timestamp: i64,
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// NaiveDate -> ClickHouse Date (1970-01-01 ..= 2149-06-06)
pub fn date_to_days(date: NaiveDate) -> Option<u16> {
    u16::try_from((date - epoch()).num_days()).ok()
}

pub fn days_to_date(days: u16) -> NaiveDate {
    epoch() + chrono::Days::new(days as u64)
}

/// Decimal -> мантисса при масштабе PRICE_SCALE
pub fn decimal_to_scaled(value: Decimal) -> Option<i64> {
    let mut scaled = value.round_dp(PRICE_SCALE);
    scaled.rescale(PRICE_SCALE);
    i64::try_from(scaled.mantissa()).ok()
}

pub fn scaled_to_decimal(value: i64) -> Decimal {
    Decimal::new(value, PRICE_SCALE)
}

struct ScaledPrices {
    open: i64,
    high: i64,
    low: i64,
    close: i64,
    adjusted_close: i64,
}

fn scale_prices(bar: &Bar) -> Result<ScaledPrices, String> {
    let scale = |value: Decimal| {
        decimal_to_scaled(value).ok_or_else(|| format!("price {} out of Decimal64(8) range", value))
    };
    Ok(ScaledPrices {
        open: scale(bar.open)?,
        high: scale(bar.high)?,
        low: scale(bar.low)?,
        close: scale(bar.close)?,
        adjusted_close: scale(bar.adjusted_close)?,
    })
}

impl DbDailyBar {
    pub fn from_bar(bar: &Bar, updated_at: i64) -> Result<Self, String> {
        let date = date_to_days(bar.date).ok_or_else(|| format!("date {} out of range", bar.date))?;
        let prices = scale_prices(bar)?;
        Ok(Self {
            symbol: bar.symbol.clone(),
            date,
            open: prices.open,
            high: prices.high,
            low: prices.low,
            close: prices.close,
            adjusted_close: prices.adjusted_close,
            volume: bar.volume,
            updated_at,
        })
    }
}

impl From<DbDailyBar> for Bar {
    fn from(row: DbDailyBar) -> Self {
        Bar {
            symbol: row.symbol,
            date: days_to_date(row.date),
            timestamp: None,
            open: scaled_to_decimal(row.open),
            high: scaled_to_decimal(row.high),
            low: scaled_to_decimal(row.low),
            close: scaled_to_decimal(row.close),
            volume: row.volume,
            adjusted_close: scaled_to_decimal(row.adjusted_close),
        }
    }
}

impl DbIntradayBar {
    pub fn from_bar(bar: &Bar, updated_at: i64) -> Result<Self, String> {
        let timestamp = bar
            .timestamp
            .ok_or_else(|| format!("intraday bar for {} has no timestamp", bar.date))?;
        let date = date_to_days(bar.date).ok_or_else(|| format!("date {} out of range", bar.date))?;
        let prices = scale_prices(bar)?;
        Ok(Self {
            symbol: bar.symbol.clone(),
            date,
            timestamp: timestamp.timestamp_millis(),
            open: prices.open,
            high: prices.high,
            low: prices.low,
            close: prices.close,
            adjusted_close: prices.adjusted_close,
            volume: bar.volume,
            updated_at,
        })
    }
}

impl From<DbIntradayBar> for Bar {
    fn from(row: DbIntradayBar) -> Self {
        Bar {
            symbol: row.symbol,
            date: days_to_date(row.date),
            timestamp: DateTime::<Utc>::from_timestamp_millis(row.timestamp),
            open: scaled_to_decimal(row.open),
            high: scaled_to_decimal(row.high),
            low: scaled_to_decimal(row.low),
            close: scaled_to_decimal(row.close),
            volume: row.volume,
            adjusted_close: scaled_to_decimal(row.adjusted_close),
        }
    }
}
