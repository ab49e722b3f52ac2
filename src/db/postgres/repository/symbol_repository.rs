use crate::db::postgres::connection::PostgresConnection;
use crate::env_config::models::app_config::UniverseConfig;
use crate::market_data::symbols::normalize_symbol;
use async_trait::async_trait;
use sqlx::Error as SqlxError;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Источник списков символов для задач
#[async_trait]
pub trait SymbolUniverse: Send + Sync {
    /// Все известные символы, для полной исторической загрузки
    async fn all_symbols(&self) -> Result<Vec<String>, SqlxError>;

    /// Watchlist + featured, для частых задач
    async fn active_symbols(&self) -> Result<Vec<String>, SqlxError>;
}

/// Featured идут первыми, затем watchlist по популярности; без повторов, не больше `limit`
pub fn merge_symbols(first: &[String], rest: &[String], limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    first
        .iter()
        .chain(rest.iter())
        .map(|symbol| normalize_symbol(symbol))
        .filter(|symbol| !symbol.is_empty())
        .filter(|symbol| seen.insert(symbol.clone()))
        .take(limit)
        .collect()
}

pub struct PgSymbolUniverse {
    connection: Arc<PostgresConnection>,
    featured: Vec<String>,
    active_limit: usize,
}

impl PgSymbolUniverse {
    pub fn new(connection: Arc<PostgresConnection>, config: &UniverseConfig) -> Self {
        Self {
            connection,
            featured: config.featured_symbols.clone(),
            active_limit: config.active_limit,
        }
    }
}

#[async_trait]
impl SymbolUniverse for PgSymbolUniverse {
    async fn all_symbols(&self) -> Result<Vec<String>, SqlxError> {
        let pool = self.connection.get_pool();

        let known = sqlx::query_scalar::<_, String>("SELECT symbol FROM symbols ORDER BY symbol")
            .fetch_all(pool)
            .await?;
        let active = self.active_symbols().await?;

        let symbols = merge_symbols(&active, &known, usize::MAX);
        debug!("Symbol universe: {} symbols ({} active)", symbols.len(), active.len());
        Ok(symbols)
    }

    async fn active_symbols(&self) -> Result<Vec<String>, SqlxError> {
        let pool = self.connection.get_pool();

        let watchlisted = sqlx::query_scalar::<_, String>(
            "SELECT UPPER(symbol) AS symbol FROM watchlist \
             GROUP BY UPPER(symbol) \
             ORDER BY COUNT(*) DESC, UPPER(symbol) \
             LIMIT $1",
        )
        .bind(self.active_limit as i64)
        .fetch_all(pool)
        .await?;

        Ok(merge_symbols(&self.featured, &watchlisted, self.active_limit))
    }
}
