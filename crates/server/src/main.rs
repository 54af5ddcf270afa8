mod bootstrap;
mod broadcast;
mod git;
mod github;
mod health;

use anyhow::Result;
use deckhand_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use deckhand_core::config::LogFormat::*;
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
    // Logging needs the loaded config, so load before bootstrapping.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.health.clone(),
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        commands = ?app.commands.keys().collect::<Vec<_>>(),
        release_targets = app.health.release_targets,
        "deckhand-server started"
    );

    app.slack_runner.run_until(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "deckhand-server stopped"
    );
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "shutdown requested, draining in-flight handlers"
    );
}
