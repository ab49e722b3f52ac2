pub mod health_check_repository;
pub mod symbol_repository;
