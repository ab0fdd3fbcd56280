pub mod calendar_store;
pub mod config;
pub mod error;
pub mod plan_generator;
pub mod storage;
