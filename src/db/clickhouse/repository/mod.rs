pub mod bar_repository;
