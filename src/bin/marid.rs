//! marid: the Marionette daemon.
//!
//! Runs the streamer until Ctrl-C, then saves caches and exits.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use marionette::{Config, Secrets, Streamer};

/// Marionette daemon, a chat-driven virtual streamer.
#[derive(Parser)]
#[command(name = "marid")]
#[command(version = marionette::PKG_VERSION)]
#[command(about = "Marionette virtual streamer daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "MARIONETTE_CONFIG")]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    // asset probing shells out to ffprobe
    let streamer =
        tokio::task::spawn_blocking(move || Streamer::from_config(&config, &secrets)).await??;

    info!(version = marionette::PKG_VERSION, "marid starting");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("interrupt received, shutting down");
        signal.cancel();
    });

    streamer.run(shutdown).await;
    Ok(())
}
