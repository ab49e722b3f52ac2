// File: src/services/scheduler/job.rs
use crate::db::postgres::repository::symbol_repository::SymbolUniverse;
use crate::market_data::models::HistoricalRange;
use crate::services::ingestion::{HistoricalIngestor, RealtimeUpdater, RunCounts};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Unknown job type: {0}")]
    UnknownJob(String),

    #[error("Failed to load symbol universe: {0}")]
    Universe(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    DailyHistorical,
    FullHistorical,
    Hourly,
    LatestPrice,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::DailyHistorical,
        JobType::FullHistorical,
        JobType::Hourly,
        JobType::LatestPrice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::DailyHistorical => "daily-historical",
            JobType::FullHistorical => "full-historical",
            JobType::Hourly => "hourly",
            JobType::LatestPrice => "latest-price",
        }
    }

    fn index(&self) -> usize {
        match self {
            JobType::DailyHistorical => 0,
            JobType::FullHistorical => 1,
            JobType::Hourly => 2,
            JobType::LatestPrice => 3,
        }
    }

    /// Исторические задачи идут по всем символам, real-time только по активным
    pub fn uses_full_universe(&self) -> bool {
        matches!(self, JobType::DailyHistorical | JobType::FullHistorical)
    }
}

impl FromStr for JobType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        JobType::ALL
            .into_iter()
            .find(|job| job.as_str() == normalized)
            .ok_or_else(|| SchedulerError::UnknownJob(s.to_string()))
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accounting record of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRun {
    pub id: Uuid,
    pub job_type: JobType,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub symbols_planned: usize,
    pub symbols_processed: usize,
    pub symbols_skipped: usize,
    pub records_written: u64,
    pub errors: usize,
    pub failed_symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed(JobRun),
    /// The same job type was already running; nothing is queued.
    Skipped,
}

#[derive(Debug, Clone, Copy)]
pub struct JobRanges {
    pub daily: HistoricalRange,
    pub full: HistoricalRange,
}

impl Default for JobRanges {
    fn default() -> Self {
        Self {
            daily: HistoricalRange::SevenDays,
            full: HistoricalRange::Max,
        }
    }
}

/// Занятый слот типа задачи. Флаг снимается при drop, в том числе при панике внутри прогона.
pub struct RunClaim {
    runner: Arc<JobRunner>,
    job: JobType,
}

impl RunClaim {
    pub fn job(&self) -> JobType {
        self.job
    }

    pub async fn run(self) -> Result<JobRun, SchedulerError> {
        let id = Uuid::new_v4();
        let span = info_span!("job_run", job = self.job.as_str(), run_id = %id);
        self.runner.execute(self.job, id).instrument(span).await
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.runner.in_progress[self.job.index()].store(false, Ordering::SeqCst);
    }
}

/// Runs one job type at a time per type; shared by timers and manual triggers.
pub struct JobRunner {
    universe: Arc<dyn SymbolUniverse>,
    historical: Arc<HistoricalIngestor>,
    realtime: Arc<RealtimeUpdater>,
    ranges: JobRanges,
    in_progress: [AtomicBool; 4],
}

impl JobRunner {
    pub fn new(
        universe: Arc<dyn SymbolUniverse>,
        historical: Arc<HistoricalIngestor>,
        realtime: Arc<RealtimeUpdater>,
        ranges: JobRanges,
    ) -> Self {
        Self {
            universe,
            historical,
            realtime,
            ranges,
            in_progress: Default::default(),
        }
    }

    pub fn is_running(&self, job: JobType) -> bool {
        self.in_progress[job.index()].load(Ordering::SeqCst)
    }

    /// Atomically marks `job` as running. `None` when a run of that type is in progress.
    pub fn try_claim(self: &Arc<Self>, job: JobType) -> Option<RunClaim> {
        self.in_progress[job.index()]
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunClaim {
                runner: self.clone(),
                job,
            })
    }

    pub async fn trigger(self: &Arc<Self>, job: JobType) -> Result<JobOutcome, SchedulerError> {
        let Some(claim) = self.try_claim(job) else {
            info!("Job {} is already running, skipping trigger", job);
            return Ok(JobOutcome::Skipped);
        };

        Ok(JobOutcome::Completed(claim.run().await?))
    }

    async fn execute(&self, job: JobType, id: Uuid) -> Result<JobRun, SchedulerError> {
        let started_at = Utc::now();

        // Свежий снимок списка символов на каждый прогон
        let symbols = if job.uses_full_universe() {
            self.universe.all_symbols().await?
        } else {
            self.universe.active_symbols().await?
        };

        info!("Job {} started for {} symbols", job, symbols.len());

        let counts: RunCounts = match job {
            JobType::DailyHistorical => self.historical.run(&symbols, self.ranges.daily).await.counts,
            JobType::FullHistorical => self.historical.run(&symbols, self.ranges.full).await.counts,
            JobType::Hourly => self.realtime.refresh_hourly(&symbols).await.counts,
            JobType::LatestPrice => self.realtime.refresh_latest_prices(&symbols).await.counts,
        };

        let run = JobRun {
            id,
            job_type: job,
            started_at,
            finished_at: Utc::now(),
            symbols_planned: symbols.len(),
            symbols_processed: counts.processed,
            symbols_skipped: counts.skipped,
            records_written: counts.records_written(),
            errors: counts.errors,
            failed_symbols: counts.failed_symbols,
        };

        info!(
            "Job {} finished in {} ms: {}/{} symbols processed, {} skipped, {} records, {} errors",
            job,
            (run.finished_at - run.started_at).num_milliseconds(),
            run.symbols_processed,
            run.symbols_planned,
            run.symbols_skipped,
            run.records_written,
            run.errors
        );

        Ok(run)
    }
}
