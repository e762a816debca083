//! ICA CLI - Command-line front end for the declaration lifecycle

pub mod commands;
pub mod config;
pub mod context;

pub use config::{AppConfig, ConfigError};
pub use context::AppContext;
