use crate::db::clickhouse::repository::bar_repository::UpsertCounts;
use crate::market_data::errors::ProviderError;
use crate::market_data::models::{DateWindow, HistoricalRange};
use serde::Serialize;

/// Per-symbol outcome counters of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub total_inserted: u64,
    pub total_updated: u64,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub failed_symbols: Vec<String>,
}

impl RunCounts {
    pub fn record_written(&mut self, counts: UpsertCounts) {
        self.total_inserted += counts.inserted;
        self.total_updated += counts.updated;
        self.processed += 1;
    }

    /// Cache-only paths count a processed symbol without store writes.
    pub fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_error(&mut self, symbol: &str) {
        self.errors += 1;
        self.failed_symbols.push(symbol.to_string());
    }

    /// Transient provider failures are errors, configuration problems are skips.
    pub fn record_provider_error(&mut self, symbol: &str, error: &ProviderError) {
        if error.is_transient() {
            self.record_error(symbol);
        } else {
            self.record_skipped();
        }
    }

    pub fn records_written(&self) -> u64 {
        self.total_inserted + self.total_updated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoricalSummary {
    #[serde(flatten)]
    pub counts: RunCounts,
    pub range: HistoricalRange,
    pub window: DateWindow,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    #[serde(flatten)]
    pub counts: RunCounts,
}
