pub mod market_cache_repository;
