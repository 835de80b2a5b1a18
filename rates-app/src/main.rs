//! # Rates Server
//!
//! Long-running daemon: keeps hot pairs warm and refreshes the tracked
//! currencies until interrupted.

use rates_app::{Config, DEFAULT_LOG_FILTER, build_daemon_service, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format, DEFAULT_LOG_FILTER);

    tracing::info!(
        tracked = ?config.tracked_currencies,
        auto_update_secs = config.auto_update_interval.as_secs(),
        prefetch_secs = config.prefetch_interval.as_secs(),
        "Starting currency rate engine"
    );

    let service = build_daemon_service(&config);
    service.start_background_tasks();

    shutdown_signal().await?;

    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = ctrl_c => result?,
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await?;

    tracing::info!("Shutdown signal received, stopping background tasks...");
    Ok(())
}
