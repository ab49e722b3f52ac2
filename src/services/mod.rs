pub mod ingestion;
pub mod market_view;
pub mod scheduler;
