pub mod connection;
pub mod postgres_service;
pub mod repository;
