mod health_api;
mod health_db;
mod jobs;
mod market;

pub use health_api::health_api;
pub use health_db::health_db;
pub use jobs::{list_jobs, trigger_job};
pub use market::{intraday, latest_price};
