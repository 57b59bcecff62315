mod bootstrap;
mod health;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use saleslens_core::config::{AppConfig, LoadOptions};
use saleslens_db::{SqlBusinessRepository, SqlLedgerRepository};
use saleslens_square::SquareClient;

use crate::health::HealthState;
use crate::scheduler::SyncScheduler;

fn init_logging(config: &AppConfig) {
    use saleslens_core::config::LogFormat::*;
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
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let platform = Arc::new(SquareClient::from_config(&app.config.commerce)?);
    let scheduler = Arc::new(SyncScheduler::new(
        platform,
        Arc::new(SqlLedgerRepository::new(app.db_pool.clone())),
        Arc::new(SqlBusinessRepository::new(app.db_pool.clone())),
        app.config.commerce.sync_settings(),
    ));

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        HealthState::new(app.db_pool.clone(), scheduler.status()),
    )
    .await?;

    let sync_task = Arc::clone(&scheduler)
        .spawn(Duration::from_secs(app.config.server.sync_interval_secs));

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        sync_interval_secs = app.config.server.sync_interval_secs,
        "saleslens-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "saleslens-server stopping"
    );

    sync_task.abort();
    app.db_pool.close().await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
