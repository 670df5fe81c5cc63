//! Relay configuration: defaults, then an optional JSON file, then environment.
//!
//! File: `--config <path>` or `LANCHAT_CONFIG`.
//! Env overrides: LANCHAT_CHAT_PORT, LANCHAT_VIDEO_PORT, LANCHAT_BIND_IP.

use std::path::{Path, PathBuf};

use anyhow::Context;
use net_transport::RelayConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayServerConfig {
    pub relay: RelayConfig,
}

impl RelayServerConfig {
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
        if let Some(port) = var("LANCHAT_CHAT_PORT").and_then(|s| s.parse().ok()) {
            self.relay.chat_port = port;
        }
        if let Some(port) = var("LANCHAT_VIDEO_PORT").and_then(|s| s.parse().ok()) {
            self.relay.video_port = port;
        }
        if let Some(ip) = var("LANCHAT_BIND_IP").and_then(|s| s.parse().ok()) {
            self.relay.bind_ip = ip;
        }
    }
}
