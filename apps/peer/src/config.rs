//! Peer configuration: defaults, then an optional JSON file, then environment.
//!
//! File: `--config <path>` or `LANCHAT_CONFIG`.
//! Env overrides: LANCHAT_USERNAME, LANCHAT_DOWNLOAD_DIR, LANCHAT_MAX_FILE_SIZE,
//! LANCHAT_VIDEO_LOCAL_PORT, LANCHAT_MAX_CHUNK_SIZE.

use std::path::{Path, PathBuf};

use anyhow::Context;
use net_transport::{ChatConfig, StreamConfig, VideoConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub stream: StreamConfig,
    pub chat: ChatConfig,
    pub video: VideoConfig,
    /// Where received files are written
    pub download_dir: PathBuf,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            chat: ChatConfig::default(),
            video: VideoConfig::default(),
            download_dir: PathBuf::from("downloads"),
        }
    }
}

impl PeerConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("LANCHAT_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(name) = var("LANCHAT_USERNAME") {
            self.chat.username = name;
        }
        if let Some(dir) = var("LANCHAT_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(dir);
        }
        if let Some(size) = var("LANCHAT_MAX_FILE_SIZE").and_then(|s| s.parse().ok()) {
            self.stream.max_file_size = size;
        }
        if let Some(port) = var("LANCHAT_VIDEO_LOCAL_PORT").and_then(|s| s.parse().ok()) {
            self.video.local_port = port;
        }
        if let Some(size) = var("LANCHAT_MAX_CHUNK_SIZE").and_then(|s| s.parse().ok()) {
            self.video.max_chunk_size = size;
        }
    }
}
