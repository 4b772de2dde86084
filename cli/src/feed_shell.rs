use anyhow::Result;
use lib_feed::loggers::{setup_logging, ConsoleLog};
use lib_feed::{CommandInterpreter, FeedSession};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::signal;

mod feed_logic;
use feed_logic::{config, forwarder};

/// Exit status when the emulator can't be reached at startup.
const EXIT_CONNECT_FAILED: i32 = 2;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            log::error!("Startup failed: {:#}", e);
            1
        }
    };
    // The blocking stdin reader would otherwise keep the runtime alive.
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let (config, config_warnings) = config::load_config();
    setup_logging("feed_shell", &config.log_dir(), config.log_level(), ConsoleLog::Stderr(log::LevelFilter::Warn))?;
    // Reported only now; the warn level also reaches stderr.
    for warning in &config_warnings {
        log::warn!("{}", warning);
    }
    let session_config = config.to_session_config()?;
    let forward_target = config.forward_target()?;
    log::info!("Starting feed_shell against {}", session_config.url);

    let url = session_config.url.clone();
    let session = Arc::new(FeedSession::new(session_config));

    if let Err(e) = session.connect().await {
        log::error!("Initial connection to {} failed: {}", url, e);
        eprintln!("Could not connect to the data emulator at {}: {}", url, e);
        eprintln!("Make sure the emulator is running, or point the shell at another server with --url <ws-url> or FEED_URL.");
        session.close().await;
        return Ok(EXIT_CONNECT_FAILED);
    }

    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("Connected to {}. Type 'help' for the list of commands.\n", url).as_bytes())
        .await?;

    let forwarder_handle = forward_target.map(|target| {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let latest = session.latest_data();
            forwarder::run(reqwest::Client::new(), target, latest, session.closed()).await;
        })
    });

    {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                log::info!("Ctrl-C received, closing session.");
                session.close().await;
            }
        });
    }

    let interpreter = CommandInterpreter::new(Arc::clone(&session));
    interpreter.run(BufReader::new(tokio::io::stdin()), stdout).await?;

    if let Some(handle) = forwarder_handle {
        let _ = handle.await;
    }

    log::info!("Shutdown complete.");
    Ok(0)
}
