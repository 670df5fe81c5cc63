//! Console stand-in for the UI layer
//!
//! Prints every event and stores received files and the latest video frame
//! under the download directory.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use image_codec::DecodedImage;
use net_transport::PeerEventHandler;
use shared_protocol::SenderRole;
use tracing::{debug, warn};

/// File the most recent video frame is written to
pub const LATEST_FRAME_FILE: &str = "latest_frame.jpg";

pub struct ConsoleUi<W: Write> {
    out: W,
    download_dir: PathBuf,
    frames_shown: u64,
}

impl<W: Write> ConsoleUi<W> {
    pub fn new(out: W, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            out,
            download_dir: download_dir.into(),
            frames_shown: 0,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    /// Only the final path component of a peer-supplied name is used
    fn target_path(&self, name: &str) -> Option<PathBuf> {
        let file_name = Path::new(name).file_name()?;
        Some(self.download_dir.join(file_name))
    }

    fn save(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.download_dir)?;
        std::fs::write(path, bytes)
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            debug!("Console write failed: {}", e);
        }
    }
}

impl<W: Write> PeerEventHandler for ConsoleUi<W> {
    fn on_text_message(&mut self, text: &str, sender: SenderRole) {
        self.line(format_args!("[{}] {}", sender, text));
    }

    fn on_file_message(&mut self, name: &str, bytes: &Bytes, sender: SenderRole) {
        let Some(path) = self.target_path(name) else {
            warn!(file = name, "Refusing to store file with no usable name");
            return;
        };
        match self.save(&path, bytes) {
            Ok(()) => self.line(format_args!(
                "[{}] sent file {} ({} bytes) -> {}",
                sender,
                name,
                bytes.len(),
                path.display()
            )),
            Err(e) => warn!(path = %path.display(), "Failed to store received file: {}", e),
        }
    }

    fn on_chat_message(&mut self, from: &str, text: &str) {
        self.line(format_args!("<{}> {}", from, text));
    }

    fn on_frame_ready(&mut self, image: &DecodedImage) {
        self.frames_shown += 1;
        let path = self.download_dir.join(LATEST_FRAME_FILE);
        if let Err(e) = self.save(&path, &image.data) {
            warn!(path = %path.display(), "Failed to store frame: {}", e);
        }
        debug!(
            width = image.width,
            height = image.height,
            size = image.data.len(),
            "Frame shown"
        );
    }

    fn on_stream_closed(&mut self, sender: SenderRole) {
        self.line(format_args!("[{}] disconnected", sender));
    }
}
