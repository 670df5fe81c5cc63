//! LAN chat peer
//!
//! Headless peer: stream text/file chat, group chat through a relay, and a
//! low-framerate JPEG video feed.

mod config;
mod console;
mod session;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use net_transport::{DispatchQueue, deliver};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::PeerConfig;
use console::ConsoleUi;
use session::Command;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long the console waits for an event before checking the session
const DISPATCH_POLL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("peer {}", VERSION);
        return Ok(());
    }
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let (command, config_path) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            print_usage();
            std::process::exit(2);
        }
    };

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Starting LAN chat peer {}", VERSION);

    let config = PeerConfig::load(config_path.as_deref())?;
    let mut ui = ConsoleUi::new(std::io::stdout(), config.download_dir.clone());

    let runtime = tokio::runtime::Runtime::new()?;
    let queue = DispatchQueue::new();
    let session = runtime.spawn(session::run(command, config, queue.sink()));

    // this thread is the only consumer of network events
    while !session.is_finished() {
        if let Some(event) = queue.recv_timeout(DISPATCH_POLL) {
            deliver(&mut ui, &event);
        }
    }
    queue.drain(&mut ui);

    let result = runtime.block_on(session)?;
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

fn parse_args(args: &[String]) -> anyhow::Result<(Command, Option<PathBuf>)> {
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a path")?;
            config_path = Some(PathBuf::from(path));
        } else {
            positional.push(arg.as_str());
        }
    }

    let addr = |s: &str| -> anyhow::Result<SocketAddr> {
        s.parse().with_context(|| format!("invalid address {:?}", s))
    };

    let command = match positional.as_slice() {
        ["serve", port] => Command::Serve {
            port: port.parse().with_context(|| format!("invalid port {:?}", port))?,
        },
        ["connect", target] => Command::Connect {
            addr: addr(target)?,
        },
        ["chat", server, username] => Command::Chat {
            server: addr(server)?,
            username: username.to_string(),
        },
        ["video", remote] => Command::Video {
            remote: addr(remote)?,
            jpeg: None,
        },
        ["video", remote, jpeg] => Command::Video {
            remote: addr(remote)?,
            jpeg: Some(PathBuf::from(jpeg)),
        },
        [other, ..] => bail!("unknown command or arguments: {}", other),
        [] => bail!("missing command"),
    };

    Ok((command, config_path))
}

fn print_usage() {
    println!("peer {} - LAN chat, file and video peer", VERSION);
    println!();
    println!("USAGE:");
    println!("    peer [--config <path>] <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    serve <port>                  Wait for a stream peer");
    println!("    connect <addr>                Connect to a stream peer");
    println!("    chat <server-addr> <name>     Join a chat relay");
    println!("    video <remote-addr> [jpeg]    Receive video, and send the JPEG if given");
    println!();
    println!("INPUT:");
    println!("    <text>            Send a line");
    println!("    /file <path>      Send a file (stream roles)");
    println!("    /quit             Leave");
    println!();
    println!("ENVIRONMENT:");
    println!("    LANCHAT_CONFIG    JSON config file");
    println!("    RUST_LOG          Log filter, e.g. RUST_LOG=debug");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        let (command, path) = parse_args(&args(&["serve", "9000"])).unwrap();
        assert_eq!(command, Command::Serve { port: 9000 });
        assert_eq!(path, None);

        let (command, path) =
            parse_args(&args(&["--config", "peer.json", "chat", "10.0.0.2:5000", "ana"])).unwrap();
        assert_eq!(
            command,
            Command::Chat {
                server: "10.0.0.2:5000".parse().unwrap(),
                username: "ana".into(),
            }
        );
        assert_eq!(path, Some(PathBuf::from("peer.json")));

        let (command, _) = parse_args(&args(&["video", "10.0.0.2:6000", "cam.jpg"])).unwrap();
        assert_eq!(
            command,
            Command::Video {
                remote: "10.0.0.2:6000".parse().unwrap(),
                jpeg: Some(PathBuf::from("cam.jpg")),
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["serve", "http"])).is_err());
        assert!(parse_args(&args(&["connect", "nowhere"])).is_err());
        assert!(parse_args(&args(&["dance"])).is_err());
        assert!(parse_args(&args(&["chat", "--config"])).is_err());
    }
}
