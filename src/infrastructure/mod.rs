pub mod config;
pub mod day_start_cache;
pub mod day_start_repository;
pub mod error;
pub mod storage;
pub mod task_repository;
