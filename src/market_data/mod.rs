pub mod client;
pub mod errors;
pub mod market_data_service;
pub mod models;
pub mod providers;
pub mod symbols;
pub mod synthetic;
