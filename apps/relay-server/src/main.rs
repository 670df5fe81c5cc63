//! LAN chat relay server
//!
//! Runs the chat relay (every datagram echoed to every known peer) and the
//! video relay (every datagram forwarded to every other known peer).
//!
//! Usage:
//!   relay-server [--config <path>]
//!   relay-server --version

mod config;

use std::path::PathBuf;

use net_transport::RelayServer;
use tracing::{error, info};

use config::RelayServerConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("relay-server {}", VERSION);
        return Ok(());
    }
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_server=debug".parse()?)
                .add_directive("net_transport=info".parse()?),
        )
        .init();

    info!("Starting LAN chat relay server {}", VERSION);

    let config = RelayServerConfig::load(config_path.as_deref())?;

    let chat = RelayServer::chat(config.relay.chat_addr()).await?;
    let video = RelayServer::video(config.relay.video_addr()).await?;
    info!(
        "Chat relay on {}, video relay on {}",
        chat.local_addr()?,
        video.local_addr()?
    );

    let relays = futures::future::try_join(chat.run(), video.run());

    tokio::select! {
        result = relays => {
            if let Err(e) = result {
                error!("Relay stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown_signal() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
