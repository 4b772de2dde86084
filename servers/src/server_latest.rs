use anyhow::Result;
use clap::Parser;
use lib_feed::loggers::{setup_logging, ConsoleLog};
use tokio::signal;

mod latest_logic;
use latest_logic::{config::Config, routes, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    setup_logging("server_latest", &config.log_dir, &config.log_level, ConsoleLog::Stdout)?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = AppState::new();

    let mut server_handle = tokio::spawn(routes::run(config.port, app_state, shutdown_tx.subscribe()));

    // Wait for shutdown signal
    tokio::select! {
        finished = &mut server_handle => {
            // The server stopped on its own, e.g. the port was taken.
            return finished?;
        }
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    let _ = shutdown_tx.send(());
    server_handle.await??;

    log::info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Could not install the SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}
