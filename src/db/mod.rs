pub mod clickhouse;
pub mod postgres;
pub mod redis;
