pub mod connection;
pub mod redis_service;
pub mod repository;
