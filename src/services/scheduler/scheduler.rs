// File: src/services/scheduler/scheduler.rs
use super::cadence::Cadence;
use super::job::{JobOutcome, JobRunner, JobType, RunClaim, SchedulerError};
use crate::env_config::models::app_config::{JobScheduleConfig, SchedulerConfig};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Источник текущего времени для таймеров
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Owns one timer per enabled job type.
pub struct MarketSyncScheduler {
    runner: Arc<JobRunner>,
    schedules: Vec<(JobType, Cadence)>,
    timezone: Tz,
    run_on_start: Vec<JobType>,
    clock: Clock,
    // None = Stopped
    timers: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl MarketSyncScheduler {
    pub fn new(
        runner: Arc<JobRunner>,
        schedules: Vec<(JobType, Cadence)>,
        timezone: Tz,
        run_on_start: Vec<JobType>,
    ) -> Self {
        Self {
            runner,
            schedules,
            timezone,
            run_on_start,
            clock: Arc::new(Utc::now),
            timers: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn from_config(
        runner: Arc<JobRunner>,
        config: &SchedulerConfig,
        timezone: Tz,
    ) -> Result<Self, SchedulerError> {
        let jobs = &config.jobs;
        let configured: [(JobType, &JobScheduleConfig); 4] = [
            (JobType::DailyHistorical, &jobs.daily_historical),
            (JobType::FullHistorical, &jobs.full_historical),
            (JobType::Hourly, &jobs.hourly),
            (JobType::LatestPrice, &jobs.latest_price),
        ];

        let schedules = configured
            .into_iter()
            .filter(|(job, schedule)| {
                if !schedule.enabled {
                    info!("Job {} is disabled in configuration", job);
                }
                schedule.enabled
            })
            .map(|(job, schedule)| (job, schedule.cadence.clone()))
            .collect();

        let run_on_start = config
            .run_on_start
            .iter()
            .map(|name| name.parse::<JobType>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(runner, schedules, timezone, run_on_start))
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    pub fn state(&self) -> SchedulerState {
        match self.timers.lock() {
            Ok(timers) if timers.is_some() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Stopped -> Running. Returns false if the scheduler was already running.
    pub fn start(&self) -> bool {
        let Ok(mut timers) = self.timers.lock() else {
            error!("Scheduler state lock is poisoned");
            return false;
        };
        if timers.is_some() {
            warn!("Scheduler is already running");
            return false;
        }

        info!("Starting market sync scheduler ({})", self.timezone);

        let handles = self
            .schedules
            .iter()
            .map(|(job, cadence)| {
                info!("Scheduling {} {} ({})", job, cadence, self.timezone);
                tokio::spawn(timer_loop(
                    self.runner.clone(),
                    *job,
                    cadence.clone(),
                    self.timezone,
                    self.clock.clone(),
                ))
            })
            .collect();
        *timers = Some(handles);

        for job in &self.run_on_start {
            info!("Triggering {} on start", job);
            spawn_run(self.runner.clone(), *job);
        }

        true
    }

    /// Running -> Stopped. Timers are cancelled, runs already in flight finish on their own.
    pub fn stop(&self) -> bool {
        let Ok(mut timers) = self.timers.lock() else {
            error!("Scheduler state lock is poisoned");
            return false;
        };
        let Some(handles) = timers.take() else {
            debug!("Scheduler is not running");
            return false;
        };

        for handle in &handles {
            handle.abort();
        }
        info!("Market sync scheduler stopped ({} timers cancelled)", handles.len());
        true
    }

    /// Manual trigger, works in both states. The job slot is taken before returning,
    /// the run itself continues in the background. `false` when a run of that type is in progress.
    pub fn trigger(&self, job: JobType) -> bool {
        match self.runner.try_claim(job) {
            Some(claim) => {
                spawn_claimed(claim);
                true
            }
            None => {
                info!("Job {} is already running, manual trigger rejected", job);
                false
            }
        }
    }
}

impl Drop for MarketSyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Следующий запуск и пауза до него
fn next_fire(cadence: &Cadence, now: DateTime<Utc>, timezone: Tz) -> Option<(DateTime<Utc>, Duration)> {
    let next = cadence.next_after(now, timezone)?;
    Some((next, (next - now).to_std().unwrap_or_default()))
}

async fn timer_loop(runner: Arc<JobRunner>, job: JobType, cadence: Cadence, timezone: Tz, clock: Clock) {
    loop {
        let Some((next, wait)) = next_fire(&cadence, clock(), timezone) else {
            warn!("Job {} has no upcoming fire time, timer exits", job);
            return;
        };

        debug!("Next {} run at {}", job, next.with_timezone(&timezone));
        tokio::time::sleep(wait).await;

        spawn_run(runner.clone(), job);
    }
}

fn spawn_claimed(claim: RunClaim) -> JoinHandle<()> {
    tokio::spawn(async move {
        let job = claim.job();
        match claim.run().await {
            Ok(run) => debug!("Job {} run {} completed", job, run.id),
            Err(e) => error!("Job {} failed: {}", job, e),
        }
    })
}

/// Отдельная задача: остановка таймера не прерывает начатый прогон
fn spawn_run(runner: Arc<JobRunner>, job: JobType) -> JoinHandle<()> {
    tokio::spawn(async move {
        match runner.trigger(job).await {
            Ok(JobOutcome::Completed(run)) => debug!("Job {} run {} completed", job, run.id),
            Ok(JobOutcome::Skipped) => debug!("Job {} trigger skipped", job),
            Err(e) => error!("Job {} failed: {}", job, e),
        }
    })
}
