//! Chunked video over UDP
//!
//! Sender and receiver share one socket so a relay that learned the
//! receiving address also recognizes outgoing chunks as coming from it.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image_codec::{FrameSource, ImageDecoder};
use parking_lot::RwLock;
use shared_protocol::{
    AssemblerLimits, AssemblerStats, AssemblyOutcome, FrameAssembler, FrameIdGenerator,
    VideoChunk, fragment_frame,
};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::{EventSink, PeerEvent, TransportError, TransportResult};

const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Datagram sent to a relay so it learns this peer before any video flows.
/// Shorter than a chunk header, so receivers drop it.
const REGISTRATION_DATAGRAM: &[u8] = &[0];

/// Bind the socket a video peer sends and receives on
pub async fn bind_video_socket(local_port: u16) -> TransportResult<Arc<UdpSocket>> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, local_port));
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|e| TransportError::Bind(format!("{}: {}", addr, e)))?;
    info!("Video socket bound to {}", socket.local_addr()?);
    Ok(Arc::new(socket))
}

/// Outcome of sending one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSendReport {
    pub frame_id: u32,
    pub total_chunks: u16,
    pub failed_chunks: u16,
}

/// Fragments encoded images and sends the chunks to one remote
pub struct VideoSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    max_chunk_size: usize,
    frame_ids: FrameIdGenerator,
}

impl VideoSender {
    pub fn new(socket: Arc<UdpSocket>, remote: SocketAddr, max_chunk_size: usize) -> Self {
        Self {
            socket,
            remote,
            max_chunk_size,
            frame_ids: FrameIdGenerator::new(),
        }
    }

    /// Start numbering frames at `first`
    pub fn with_first_frame_id(mut self, first: u32) -> Self {
        self.frame_ids = FrameIdGenerator::starting_at(first);
        self
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Send every chunk of one image. A failed chunk does not stop the rest.
    pub async fn send_frame(&self, image: &[u8]) -> TransportResult<FrameSendReport> {
        let frame_id = self.frame_ids.next_id();
        let datagrams = fragment_frame(frame_id, image, self.max_chunk_size)?;
        let total_chunks = datagrams.len() as u16;

        let mut failed_chunks = 0u16;
        for (index, datagram) in datagrams.iter().enumerate() {
            if let Err(e) = self.socket.send_to(datagram, self.remote).await {
                warn!(frame_id, index, "Chunk send failed: {}", e);
                failed_chunks += 1;
            }
        }

        trace!(frame_id, total_chunks, failed_chunks, len = image.len(), "Frame sent");
        Ok(FrameSendReport {
            frame_id,
            total_chunks,
            failed_chunks,
        })
    }

    /// Send one frame per tick until the task is cancelled.
    ///
    /// A tick where the source has nothing new sends nothing.
    pub async fn run_capture_loop<S: FrameSource>(&self, source: &mut S, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(remote = %self.remote, period_ms = period.as_millis() as u64, "Capture loop started");

        loop {
            ticker.tick().await;

            let image = match source.next_frame() {
                Ok(Some(image)) => image,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Frame capture failed: {}", e);
                    continue;
                }
            };

            if let Err(e) = self.send_frame(&image).await {
                warn!("Frame not sent: {}", e);
            }
        }
    }
}

/// Reassembles incoming chunks and hands decoded frames to the dispatch queue
pub struct VideoReceiver {
    socket: Arc<UdpSocket>,
    stats: Arc<RwLock<AssemblerStats>>,
    task: JoinHandle<()>,
}

impl VideoReceiver {
    pub fn spawn(
        socket: Arc<UdpSocket>,
        limits: AssemblerLimits,
        decoder: Arc<dyn ImageDecoder>,
        sink: EventSink,
    ) -> Self {
        let stats = Arc::new(RwLock::new(AssemblerStats::default()));
        let task = tokio::spawn(recv_loop(
            socket.clone(),
            FrameAssembler::new(limits),
            decoder,
            sink,
            stats.clone(),
        ));
        Self {
            socket,
            stats,
            task,
        }
    }

    /// Announce this peer to a relay
    pub async fn register_with(&self, relay: SocketAddr) -> TransportResult<()> {
        self.socket
            .send_to(REGISTRATION_DATAGRAM, relay)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        info!(%relay, "Registered with video relay");
        Ok(())
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats.read().clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for VideoReceiver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    mut assembler: FrameAssembler,
    decoder: Arc<dyn ImageDecoder>,
    sink: EventSink,
    stats: Arc<RwLock<AssemblerStats>>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        let n = match socket.recv_from(&mut buf).await {
            Ok((n, _)) => n,
            Err(e) => {
                debug!("Video receive error: {}", e);
                continue;
            }
        };

        let chunk = match VideoChunk::from_datagram(Bytes::copy_from_slice(&buf[..n])) {
            Ok(chunk) => chunk,
            Err(_) => {
                trace!(len = n, "Dropped short datagram");
                continue;
            }
        };

        match assembler.push(chunk) {
            AssemblyOutcome::Pending => {}
            AssemblyOutcome::Complete { frame_id, data } => match decoder.decode(data) {
                Ok(image) => {
                    trace!(frame_id, width = image.width, height = image.height, "Frame ready");
                    sink.push(PeerEvent::FrameReady { image });
                }
                Err(e) => warn!(frame_id, "Frame decode failed: {}", e),
            },
            AssemblyOutcome::Rejected(e) => debug!("Dropped chunk: {}", e),
            AssemblyOutcome::Aborted {
                frame_id,
                missing_index,
            } => debug!(frame_id, missing_index, "Frame assembly aborted"),
        }

        *stats.write() = assembler.stats().clone();
    }
}
