pub mod config;
pub mod error;
pub mod record_store;
pub mod sqlite_store;
pub mod storage;
