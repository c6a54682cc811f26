//! s3-broker - bucket provisioning from the command line

use anyhow::Context;
use clap::Parser;
use s3_broker_cli::{execute, log_filter, BrokerConfig, Cli};
use s3_broker_client::S3Client;
use s3_broker_core::BucketStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Cli::parse();

    let config = BrokerConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    // Setup logging
    let log_level = if args.debug { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(endpoint = %config.s3.endpoint, region = %config.s3.region, "Using object storage");

    let client = S3Client::new(config.client_config()).context("failed to create S3 client")?;
    let store = BucketStore::new(client);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping at the next page boundary");
            on_interrupt.cancel();
        }
    });

    let output = execute(&store, args.command, &config, &cancel).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
