//! Session wiring for each peer role
//!
//! Every role reads commands from stdin and pushes what it receives onto the
//! dispatch queue; the main thread drains that queue into the console.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use image_codec::{JpegDecoder, JpegFileSource};
use net_transport::{
    ChatClient, ChatConfig, EventSink, StreamChannel, StreamListener, VideoConfig, VideoReceiver,
    VideoSender, bind_video_socket,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use crate::config::PeerConfig;

/// How often an idle stream session checks whether the peer hung up
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What the peer was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve { port: u16 },
    Connect { addr: SocketAddr },
    Chat { server: SocketAddr, username: String },
    Video { remote: SocketAddr, jpeg: Option<PathBuf> },
}

/// One line typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    Text(String),
    File(PathBuf),
    Quit,
}

impl InputLine {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim() == "/quit" {
            return Self::Quit;
        }
        match trimmed.strip_prefix("/file ") {
            Some(path) if !path.trim().is_empty() => Self::File(PathBuf::from(path.trim())),
            _ => Self::Text(trimmed.to_string()),
        }
    }
}

/// Why a stream session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Quit,
    PeerClosed,
}

type StdinLines = Lines<BufReader<Stdin>>;

fn stdin_lines() -> StdinLines {
    BufReader::new(tokio::io::stdin()).lines()
}

pub async fn run(command: Command, config: PeerConfig, sink: EventSink) -> anyhow::Result<()> {
    match command {
        Command::Serve { port } => serve(port, config, sink).await,
        Command::Connect { addr } => connect(addr, config, sink).await,
        Command::Chat { server, username } => {
            let mut chat = config.chat.clone();
            chat.server_addr = server;
            chat.username = username;
            run_chat(chat, sink).await
        }
        Command::Video { remote, jpeg } => {
            let mut video = config.video.clone();
            video.remote_addr = remote;
            run_video(video, jpeg, sink).await
        }
    }
}

/// Stream server role: one connection at a time until `/quit`
async fn serve(port: u16, config: PeerConfig, sink: EventSink) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = StreamListener::bind(addr, config.stream, sink).await?;
    let mut lines = stdin_lines();

    loop {
        info!("Waiting for a peer on {}", listener.local_addr()?);
        let channel = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => return Ok(()),
        };

        match drive_stream(&channel, &mut lines).await? {
            StreamEnd::Quit => {
                channel.close().await;
                return Ok(());
            }
            StreamEnd::PeerClosed => info!("Peer {} left", channel.peer_addr()),
        }
    }
}

/// Stream client role
async fn connect(addr: SocketAddr, config: PeerConfig, sink: EventSink) -> anyhow::Result<()> {
    let channel = StreamChannel::connect(addr, &config.stream, sink)
        .await
        .with_context(|| format!("connecting to {}", addr))?;
    let mut lines = stdin_lines();

    if drive_stream(&channel, &mut lines).await? == StreamEnd::Quit {
        channel.close().await;
    }
    Ok(())
}

async fn drive_stream(channel: &StreamChannel, lines: &mut StdinLines) -> anyhow::Result<StreamEnd> {
    let mut poll = tokio::time::interval(CLOSE_POLL_INTERVAL);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = poll.tick() => {
                if channel.is_closed() {
                    return Ok(StreamEnd::PeerClosed);
                }
                continue;
            }
            _ = tokio::signal::ctrl_c() => return Ok(StreamEnd::Quit),
        };

        // stdin closed
        let Some(line) = line else {
            return Ok(StreamEnd::Quit);
        };

        let result = match InputLine::parse(&line) {
            InputLine::Quit => return Ok(StreamEnd::Quit),
            InputLine::Text(text) if text.is_empty() => continue,
            InputLine::Text(text) => channel.send_text(&text).await,
            InputLine::File(path) => channel.send_file(&path).await.map(|header| {
                info!(file = %header.file_name, size = header.file_size, "File sent");
            }),
        };

        // a failed send is reported and the session goes on
        if let Err(e) = result {
            warn!("Send failed: {}", e);
        }
    }
}

async fn run_chat(config: ChatConfig, sink: EventSink) -> anyhow::Result<()> {
    let client = ChatClient::start(&config, sink).await?;
    let mut lines = stdin_lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match InputLine::parse(&line) {
            InputLine::Quit => break,
            InputLine::Text(text) if text.is_empty() => {}
            InputLine::Text(text) => {
                if let Err(e) = client.send(&text).await {
                    warn!("Chat send failed: {}", e);
                }
            }
            InputLine::File(_) => warn!("Files can only be sent over a stream connection"),
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn run_video(
    config: VideoConfig,
    jpeg: Option<PathBuf>,
    sink: EventSink,
) -> anyhow::Result<()> {
    let socket = bind_video_socket(config.local_port).await?;

    let receiver = VideoReceiver::spawn(
        socket.clone(),
        config.assembler_limits(),
        Arc::new(JpegDecoder::new()),
        sink,
    );
    if config.register_with_relay {
        receiver.register_with(config.remote_addr).await?;
    }

    let capture = jpeg.map(|path| {
        let sender = VideoSender::new(socket.clone(), config.remote_addr, config.max_chunk_size);
        let period = config.send_interval();
        info!(source = %path.display(), "Sending video to {}", config.remote_addr);
        tokio::spawn(async move {
            let mut source = JpegFileSource::new(path);
            sender.run_capture_loop(&mut source, period).await;
        })
    });

    let mut lines = stdin_lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        match line.as_deref().map(InputLine::parse) {
            None | Some(InputLine::Quit) => break,
            Some(_) => {}
        }
    }

    if let Some(task) = capture {
        task.abort();
    }
    receiver.stop();
    let stats = receiver.stats();
    info!(
        completed = stats.frames_completed,
        aborted = stats.frames_aborted,
        evicted = stats.frames_evicted,
        rejected_chunks = stats.chunks_rejected,
        "Video stopped"
    );
    Ok(())
}
