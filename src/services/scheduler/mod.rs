pub mod cadence;
pub mod job;
pub mod scheduler;

pub use job::JobType;
pub use scheduler::{MarketSyncScheduler, SchedulerState};
