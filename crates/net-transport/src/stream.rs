//! Stream channel: text and file frames over one TCP connection

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use shared_protocol::{
    DecoderState, FileHeader, SenderRole, StreamDecoder, StreamEvent, encode_text,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{EventSink, PeerEvent, StreamConfig, TransportError, TransportResult};

/// One connected stream peer.
///
/// A reader task decodes incoming bytes and pushes events to the dispatch
/// queue; sends go through a write half guarded by an async mutex so a file
/// header and its content are never interleaved with another send.
pub struct StreamChannel {
    id: Uuid,
    peer_addr: SocketAddr,
    local_role: SenderRole,
    writer: Mutex<Option<OwnedWriteHalf>>,
    state: Arc<RwLock<DecoderState>>,
    reader: JoinHandle<()>,
}

impl StreamChannel {
    /// Connect to a listening peer (client role)
    pub async fn connect(
        addr: SocketAddr,
        config: &StreamConfig,
        sink: EventSink,
    ) -> TransportResult<Self> {
        info!("Connecting to {}", addr);
        let stream = TcpStream::connect(addr).await?;
        Self::start(stream, SenderRole::Client, config, sink)
    }

    fn start(
        stream: TcpStream,
        local_role: SenderRole,
        config: &StreamConfig,
        sink: EventSink,
    ) -> TransportResult<Self> {
        let id = Uuid::new_v4();
        let peer_addr = stream.peer_addr()?;
        disable_nagle(id, &stream);
        let (read_half, write_half) = stream.into_split();

        let decoder = StreamDecoder::new(config.header_policy, config.max_file_size);
        let state = Arc::new(RwLock::new(decoder.state()));

        let reader = tokio::spawn(read_loop(
            id,
            read_half,
            decoder,
            state.clone(),
            sink,
            local_role.peer(),
            config.read_buffer_size.max(1),
        ));

        info!(conn = %id, peer = %peer_addr, role = %local_role, "Stream connection established");

        Ok(Self {
            id,
            peer_addr,
            local_role,
            writer: Mutex::new(Some(write_half)),
            state,
            reader,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Role of this end of the connection
    pub fn local_role(&self) -> SenderRole {
        self.local_role
    }

    /// Receive-side framing state
    pub fn state(&self) -> DecoderState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == DecoderState::Closed
    }

    /// Send one text frame, written verbatim
    pub async fn send_text(&self, text: &str) -> TransportResult<()> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotConnected)?;

        write_frame(self.id, writer, &encode_text(text)).await?;
        debug!(conn = %self.id, len = text.len(), "Sent text");
        Ok(())
    }

    /// Read a file from disk and send it as one file frame
    pub async fn send_file(&self, path: impl AsRef<Path>) -> TransportResult<FileHeader> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransportError::FileRead {
                path: path.display().to_string(),
                reason: "not a file path".to_string(),
            })?;

        // reject the name before touching the disk
        FileHeader::new(name.as_str(), 0)?;

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| TransportError::FileRead {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.send_file_bytes(&name, Bytes::from(data)).await
    }

    /// Send in-memory content as a file frame: header write, then content write
    pub async fn send_file_bytes(&self, name: &str, data: Bytes) -> TransportResult<FileHeader> {
        let header = FileHeader::new(name, data.len() as u64)?;

        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotConnected)?;

        write_frame(self.id, writer, &header.encode()).await?;
        write_frame(self.id, writer, &data).await?;

        info!(
            conn = %self.id,
            file = %header.file_name,
            size = header.file_size,
            "Sent file"
        );
        Ok(header)
    }

    /// Close the connection. The pending read is cancelled silently.
    pub async fn close(&self) {
        self.reader.abort();
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        *self.state.write() = DecoderState::Closed;
        info!(conn = %self.id, "Stream connection closed");
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn write_frame(id: Uuid, writer: &mut OwnedWriteHalf, data: &[u8]) -> TransportResult<()> {
    if data.is_empty() {
        return Ok(());
    }
    writer.write_all(data).await.map_err(|e| {
        warn!(conn = %id, "Send failed: {}", e);
        TransportError::Send(e.to_string())
    })
}

/// Small text frames go out immediately. A socket that refuses the option
/// still carries the session.
fn disable_nagle(id: Uuid, stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(conn = %id, "Failed to set TCP_NODELAY: {}", e);
    }
}

async fn read_loop(
    id: Uuid,
    mut reader: OwnedReadHalf,
    mut decoder: StreamDecoder,
    state: Arc<RwLock<DecoderState>>,
    sink: EventSink,
    sender: SenderRole,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                debug!(conn = %id, "Read ended: {}", e);
                0
            }
        };

        let events = decoder.feed(&buf[..n]);
        *state.write() = decoder.state();

        for event in events {
            dispatch(id, &sink, sender, event);
        }

        if decoder.state() == DecoderState::Closed {
            break;
        }
    }

    debug!(conn = %id, "Reader task finished");
}

fn dispatch(id: Uuid, sink: &EventSink, sender: SenderRole, event: StreamEvent) {
    match event {
        StreamEvent::Text(text) => {
            debug!(conn = %id, len = text.len(), "Received text");
            sink.push(PeerEvent::TextReceived { text, sender });
        }
        StreamEvent::File { name, data } => {
            info!(conn = %id, file = %name, size = data.len(), "Received file");
            sink.push(PeerEvent::FileReceived {
                name,
                bytes: data,
                sender,
            });
        }
        StreamEvent::TruncatedFile {
            name,
            data,
            expected,
        } => {
            warn!(
                conn = %id,
                file = %name,
                received = data.len(),
                expected,
                "Connection closed before file completed"
            );
            sink.push(PeerEvent::FileReceived {
                name,
                bytes: data,
                sender,
            });
        }
        StreamEvent::Malformed(e) => {
            warn!(conn = %id, "Discarded malformed frame: {}", e);
        }
        StreamEvent::Closed => {
            info!(conn = %id, "Peer closed the connection");
            sink.push(PeerEvent::StreamClosed { sender });
        }
    }
}

/// Accepts stream connections (server role)
pub struct StreamListener {
    listener: TcpListener,
    config: StreamConfig,
    sink: EventSink,
}

impl StreamListener {
    pub async fn bind(
        addr: SocketAddr,
        config: StreamConfig,
        sink: EventSink,
    ) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::Bind(format!("{}: {}", addr, e)))?;
        info!("Stream listener bound to {}", listener.local_addr()?);
        Ok(Self {
            listener,
            config,
            sink,
        })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the next peer. Its events are tagged as coming from the client.
    pub async fn accept(&self) -> TransportResult<StreamChannel> {
        let (stream, addr) = self.listener.accept().await?;
        debug!("Accepted stream connection from {}", addr);
        StreamChannel::start(stream, SenderRole::Server, &self.config, self.sink.clone())
    }
}
