pub mod config;
pub mod error;
pub mod handlers;
pub mod operations;
pub mod rollback;
pub mod store;
