//! # s3-broker CLI
//!
//! Administrative front end for the bucket lifecycle manager.
//!
//! This crate provides:
//! - **Configuration**: JSON file layered with `S3_BROKER__*` environment overrides
//! - **Commands**: one subcommand per bucket lifecycle operation
//! - **Logging**: `tracing` subscriber driven by the configured level
//!
//! ```text
//! s3-broker --config broker.json create my-bucket --policy-file policy.json
//! s3-broker describe my-bucket
//! s3-broker delete my-bucket --missing-ok
//! ```

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Command, ResumePhase};
pub use commands::execute;
pub use config::{BrokerConfig, ConfigError, S3Settings};

/// Default `EnvFilter` directive for the broker crates at `level`
pub fn log_filter(level: &str) -> String {
    format!(
        "s3_broker_cli={level},s3_broker_core={level},s3_broker_client={level}",
        level = level
    )
}
