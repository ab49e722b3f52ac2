// File: src/db/clickhouse/repository/bar_repository.rs
use crate::db::clickhouse::connection::ClickhouseConnection;
use crate::db::clickhouse::models::bar::{
    DbDailyBar, DbDateKey, DbIntradayBar, DbIntradayKey, date_to_days,
};
use crate::market_data::errors::StoreError;
use crate::market_data::models::{Bar, BarIdentity};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use clickhouse::Row;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, error, info};

const SCHEMA: &str = include_str!("../../../../migrations/clickhouse/001_bars.sql");

/// Результат записи: новые ключи и перезаписанные существующие
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: u64,
    pub updated: u64,
}

impl UpsertCounts {
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

impl AddAssign for UpsertCounts {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

#[async_trait]
pub trait BarRepository: Send + Sync {
    /// Записывает смешанный набор баров, разделяя дневные и внутридневные
    async fn upsert_bars(&self, symbol: &str, bars: &[Bar]) -> Result<UpsertCounts, StoreError>;

    /// Идемпотентная запись дневных баров по ключу (symbol, date)
    async fn upsert_daily_bars(&self, symbol: &str, bars: &[Bar]) -> Result<UpsertCounts, StoreError>;

    /// Внутридневные бары по ключу (symbol, date, timestamp)
    async fn upsert_intraday_bars(&self, symbol: &str, bars: &[Bar]) -> Result<UpsertCounts, StoreError>;

    /// Удаляет все внутридневные бары символа за дату и записывает новые
    async fn replace_intraday_bars(
        &self,
        symbol: &str,
        date: NaiveDate,
        bars: &[Bar],
    ) -> Result<UpsertCounts, StoreError>;

    /// Все бары в [start, end], по дате; дневной бар раньше внутридневных
    async fn query_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, StoreError>;

    /// Последние `limit` дневных баров по возрастанию даты
    async fn latest_daily_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, StoreError>;
}

/// Последний бар с тем же ключом побеждает
pub fn dedupe_daily(bars: &[Bar]) -> Vec<&Bar> {
    dedupe_by_identity(bars.iter().filter(|bar| bar.is_daily()))
}

pub fn dedupe_intraday(bars: &[Bar]) -> Vec<&Bar> {
    dedupe_by_identity(bars.iter().filter(|bar| !bar.is_daily()))
}

/// Последний бар с тем же ключом побеждает
fn dedupe_by_identity<'a>(bars: impl Iterator<Item = &'a Bar>) -> Vec<&'a Bar> {
    let mut by_identity: BTreeMap<BarIdentity, &Bar> = BTreeMap::new();
    for bar in bars {
        by_identity.insert(bar.identity(), bar);
    }
    by_identity.into_values().collect()
}

/// Порядок выдачи query_range
pub fn sort_for_range(bars: &mut [Bar]) {
    bars.sort_by(|a, b| a.date.cmp(&b.date).then(a.timestamp.cmp(&b.timestamp)));
}

fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub struct ClickhouseBarRepository {
    connection: Arc<ClickhouseConnection>,
    write_batch_size: usize,
}

impl ClickhouseBarRepository {
    pub fn new(connection: Arc<ClickhouseConnection>, write_batch_size: usize) -> Self {
        Self {
            connection,
            write_batch_size: write_batch_size.max(1),
        }
    }

    /// CREATE TABLE IF NOT EXISTS для обеих таблиц
    pub async fn ensure_schema(&self) -> Result<(), clickhouse::error::Error> {
        let client = self.connection.get_client();
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            debug!("Applying ClickHouse DDL: {}", statement.lines().next().unwrap_or_default());
            client.query(statement).execute().await?;
        }
        info!("ClickHouse schema is up to date");
        Ok(())
    }

    async fn write_rows<T>(&self, table: &str, symbol: &str, rows: &[T]) -> Result<(), StoreError>
    where
        T: Row + Serialize + Send + Sync,
    {
        let client = self.connection.get_client();
        let write_failed = |e: clickhouse::error::Error| {
            error!("Insert into {} failed for {}: {}", table, symbol, e);
            StoreError::WriteFailed {
                symbol: symbol.to_string(),
                message: e.to_string(),
            }
        };

        for chunk in rows.chunks(self.write_batch_size) {
            let mut insert = client.insert::<T>(table).map_err(write_failed)?;
            for row in chunk {
                insert.write(row).await.map_err(write_failed)?;
            }
            insert.end().await.map_err(write_failed)?;
            debug!("Inserted {} rows into {} for {}", chunk.len(), table, symbol);
        }
        Ok(())
    }

    async fn existing_daily_dates(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashSet<u16>, StoreError> {
        let rows = self
            .connection
            .get_client()
            .query("SELECT date FROM daily_bars FINAL WHERE symbol = ? AND date >= ? AND date <= ?")
            .bind(symbol)
            .bind(date_param(start))
            .bind(date_param(end))
            .fetch_all::<DbDateKey>()
            .await
            .map_err(|e| query_failed(symbol, e))?;
        Ok(rows.into_iter().map(|row| row.date).collect())
    }

    async fn existing_intraday_keys(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashSet<(u16, i64)>, StoreError> {
        let rows = self
            .connection
            .get_client()
            .query(
                "SELECT date, `timestamp` FROM intraday_bars FINAL \
                 WHERE symbol = ? AND date >= ? AND date <= ?",
            )
            .bind(symbol)
            .bind(date_param(start))
            .bind(date_param(end))
            .fetch_all::<DbIntradayKey>()
            .await
            .map_err(|e| query_failed(symbol, e))?;
        Ok(rows.into_iter().map(|row| (row.date, row.timestamp)).collect())
    }
}

fn query_failed(symbol: &str, e: clickhouse::error::Error) -> StoreError {
    error!("ClickHouse query failed for {}: {}", symbol, e);
    StoreError::QueryFailed {
        symbol: symbol.to_string(),
        message: e.to_string(),
    }
}

fn conversion_failed(symbol: &str, message: String) -> StoreError {
    StoreError::WriteFailed {
        symbol: symbol.to_string(),
        message,
    }
}

fn date_bounds(bars: &[&Bar]) -> Option<(NaiveDate, NaiveDate)> {
    bars.iter().fold(None, |acc, bar| match acc {
        None => Some((bar.date, bar.date)),
        Some((min, max)) => Some((min.min(bar.date), max.max(bar.date))),
    })
}

#[async_trait]
impl BarRepository for ClickhouseBarRepository {
    async fn upsert_bars(&self, symbol: &str, bars: &[Bar]) -> Result<UpsertCounts, StoreError> {
        let mut counts = self.upsert_daily_bars(symbol, bars).await?;
        counts += self.upsert_intraday_bars(symbol, bars).await?;
        Ok(counts)
    }

    async fn upsert_daily_bars(&self, symbol: &str, bars: &[Bar]) -> Result<UpsertCounts, StoreError> {
        let unique = dedupe_daily(bars);
        let Some((start, end)) = date_bounds(&unique) else {
            return Ok(UpsertCounts::default());
        };

        let existing = self.existing_daily_dates(symbol, start, end).await?;
        let updated_at = Utc::now().timestamp_millis();
        let rows = unique
            .iter()
            .map(|bar| DbDailyBar::from_bar(bar, updated_at))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| conversion_failed(symbol, message))?;

        let updated = rows.iter().filter(|row| existing.contains(&row.date)).count() as u64;
        self.write_rows("daily_bars", symbol, &rows).await?;

        Ok(UpsertCounts {
            inserted: rows.len() as u64 - updated,
            updated,
        })
    }

    async fn upsert_intraday_bars(&self, symbol: &str, bars: &[Bar]) -> Result<UpsertCounts, StoreError> {
        let unique = dedupe_intraday(bars);
        let Some((start, end)) = date_bounds(&unique) else {
            return Ok(UpsertCounts::default());
        };

        let existing = self.existing_intraday_keys(symbol, start, end).await?;
        let updated_at = Utc::now().timestamp_millis();
        let rows = unique
            .iter()
            .map(|bar| DbIntradayBar::from_bar(bar, updated_at))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| conversion_failed(symbol, message))?;

        let updated = rows
            .iter()
            .filter(|row| existing.contains(&(row.date, row.timestamp)))
            .count() as u64;
        self.write_rows("intraday_bars", symbol, &rows).await?;

        Ok(UpsertCounts {
            inserted: rows.len() as u64 - updated,
            updated,
        })
    }

    async fn replace_intraday_bars(
        &self,
        symbol: &str,
        date: NaiveDate,
        bars: &[Bar],
    ) -> Result<UpsertCounts, StoreError> {
        if date_to_days(date).is_none() {
            return Err(conversion_failed(symbol, format!("date {} out of range", date)));
        }

        let unique: Vec<&Bar> = dedupe_intraday(bars)
            .into_iter()
            .filter(|bar| bar.date == date)
            .collect();
        let existing = self.existing_intraday_keys(symbol, date, date).await?;

        let updated_at = Utc::now().timestamp_millis();
        let rows = unique
            .iter()
            .map(|bar| DbIntradayBar::from_bar(bar, updated_at))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| conversion_failed(symbol, message))?;

        self.connection
            .get_client()
            .query("DELETE FROM intraday_bars WHERE symbol = ? AND date = ?")
            .bind(symbol)
            .bind(date_param(date))
            .execute()
            .await
            .map_err(|e| {
                error!("Failed to clear intraday bars of {} for {}: {}", symbol, date, e);
                StoreError::WriteFailed {
                    symbol: symbol.to_string(),
                    message: e.to_string(),
                }
            })?;
        debug!("Cleared {} intraday bars of {} for {}", existing.len(), symbol, date);

        self.write_rows("intraday_bars", symbol, &rows).await?;

        let updated = rows
            .iter()
            .filter(|row| existing.contains(&(row.date, row.timestamp)))
            .count() as u64;
        Ok(UpsertCounts {
            inserted: rows.len() as u64 - updated,
            updated,
        })
    }

    async fn query_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, StoreError> {
        let client = self.connection.get_client();

        let daily = client
            .query(
                "SELECT ?fields FROM daily_bars FINAL \
                 WHERE symbol = ? AND date >= ? AND date <= ? ORDER BY date",
            )
            .bind(symbol)
            .bind(date_param(start))
            .bind(date_param(end))
            .fetch_all::<DbDailyBar>()
            .await
            .map_err(|e| query_failed(symbol, e))?;

        let intraday = client
            .query(
                "SELECT ?fields FROM intraday_bars FINAL \
                 WHERE symbol = ? AND date >= ? AND date <= ? ORDER BY date, `timestamp`",
            )
            .bind(symbol)
            .bind(date_param(start))
            .bind(date_param(end))
            .fetch_all::<DbIntradayBar>()
            .await
            .map_err(|e| query_failed(symbol, e))?;

        let mut bars: Vec<Bar> = daily
            .into_iter()
            .map(Bar::from)
            .chain(intraday.into_iter().map(Bar::from))
            .collect();
        sort_for_range(&mut bars);

        debug!("Loaded {} bars of {} for {} - {}", bars.len(), symbol, start, end);
        Ok(bars)
    }

    async fn latest_daily_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, StoreError> {
        let mut rows = self
            .connection
            .get_client()
            .query("SELECT ?fields FROM daily_bars FINAL WHERE symbol = ? ORDER BY date DESC LIMIT ?")
            .bind(symbol)
            .bind(limit as u64)
            .fetch_all::<DbDailyBar>()
            .await
            .map_err(|e| query_failed(symbol, e))?;
        rows.reverse();
        Ok(rows.into_iter().map(Bar::from).collect())
    }
}
