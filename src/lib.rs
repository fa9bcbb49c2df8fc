pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod index;
pub mod logging;
pub mod pool;
pub mod query;
pub mod service;
pub mod watcher;

pub use config::Config;
pub use error::CoreError;
pub use service::{ContentIndexService, ServiceState};
