//! Transport configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_protocol::{
    AssemblerLimits, DEFAULT_CHAT_PORT, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE,
    DEFAULT_VIDEO_LOCAL_PORT, DEFAULT_VIDEO_RELAY_PORT, HeaderPolicy,
};

/// Stream channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Largest declared file size accepted from a peer
    pub max_file_size: u64,
    /// What to do with a file header split across reads
    pub header_policy: HeaderPolicy,
    /// Size of one socket read
    pub read_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            header_policy: HeaderPolicy::Discard,
            read_buffer_size: 64 * 1024,
        }
    }
}

/// Chat client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Chat relay address
    pub server_addr: SocketAddr,
    /// Local UDP port, 0 for ephemeral
    pub local_port: u16,
    /// Name prefixed to every outgoing line
    pub username: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_CHAT_PORT),
            local_port: 0,
            username: "anonymous".to_string(),
        }
    }
}

/// Video peer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Where chunks are sent (a relay or the other peer)
    pub remote_addr: SocketAddr,
    /// Local UDP port chunks are received on
    pub local_port: u16,
    /// Image bytes per chunk
    pub max_chunk_size: usize,
    /// Capture tick period
    pub send_interval_ms: u64,
    /// Incomplete frames held before the oldest is evicted, 0 for no limit
    pub max_pending_frames: usize,
    /// Age after which an incomplete frame is evicted, 0 for no limit
    pub max_frame_age_ms: u64,
    /// Announce the local address to the relay on start
    pub register_with_relay: bool,
}

impl VideoConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms.max(1))
    }

    pub fn assembler_limits(&self) -> AssemblerLimits {
        AssemblerLimits {
            max_pending_frames: (self.max_pending_frames > 0).then_some(self.max_pending_frames),
            max_age: (self.max_frame_age_ms > 0)
                .then(|| Duration::from_millis(self.max_frame_age_ms)),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            remote_addr: SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                DEFAULT_VIDEO_RELAY_PORT,
            ),
            local_port: DEFAULT_VIDEO_LOCAL_PORT,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            send_interval_ms: 200,
            max_pending_frames: 32,
            max_frame_age_ms: 2000,
            register_with_relay: true,
        }
    }
}

/// Relay daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub chat_port: u16,
    pub video_port: u16,
    pub bind_ip: IpAddr,
}

impl RelayConfig {
    pub fn chat_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.chat_port)
    }

    pub fn video_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.video_port)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chat_port: DEFAULT_CHAT_PORT,
            video_port: DEFAULT_VIDEO_RELAY_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}
