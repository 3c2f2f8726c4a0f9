mod bootstrap;

use anyhow::Result;
use sweepbot_core::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use sweepbot_core::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    tracing::info!("sweepbot-server started; connecting to slack socket mode");

    tokio::select! {
        result = app.slack_runner.start() => {
            result?;
            tracing::info!("slack socket runner finished; shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received; stopping");
        }
    }

    Ok(())
}
