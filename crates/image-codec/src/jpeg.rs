//! JPEG structural decoder and a file-backed frame source

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::{CodecError, CodecResult, DecodedImage, FrameSource, ImageDecoder};

const MARKER: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;

/// Start-of-frame markers carry the image dimensions (DHT, JPG and DAC share the range)
fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Markers with no length field
fn is_standalone(marker: u8) -> bool {
    marker == TEM || (0xD0..=0xD7).contains(&marker)
}

/// Walks JPEG marker segments up to the first frame header.
///
/// Pixel data is not decompressed; rendering is left to the UI layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegDecoder;

impl JpegDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Image dimensions as (width, height)
    pub fn dimensions(data: &[u8]) -> CodecResult<(u32, u32)> {
        if data.len() < 4 || data[0] != MARKER || data[1] != SOI {
            return Err(CodecError::NotJpeg("missing start-of-image marker".into()));
        }
        if data[data.len() - 2] != MARKER || data[data.len() - 1] != EOI {
            return Err(CodecError::NotJpeg("missing end-of-image marker".into()));
        }

        let mut pos = 2;
        loop {
            if pos >= data.len() {
                return Err(CodecError::Truncated {
                    needed: pos + 1,
                    available: data.len(),
                });
            }
            if data[pos] != MARKER {
                return Err(CodecError::NotJpeg(format!(
                    "expected marker at offset {}, found 0x{:02X}",
                    pos, data[pos]
                )));
            }
            // fill bytes
            while pos < data.len() && data[pos] == MARKER {
                pos += 1;
            }
            let Some(&marker) = data.get(pos) else {
                return Err(CodecError::Truncated {
                    needed: pos + 1,
                    available: data.len(),
                });
            };
            pos += 1;

            if is_standalone(marker) {
                continue;
            }
            if marker == EOI || marker == SOS {
                return Err(CodecError::MissingFrameHeader);
            }

            if pos + 2 > data.len() {
                return Err(CodecError::Truncated {
                    needed: pos + 2,
                    available: data.len(),
                });
            }
            let len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
            if len < 2 {
                return Err(CodecError::NotJpeg(format!(
                    "segment length {} at offset {}",
                    len, pos
                )));
            }
            if pos + len > data.len() {
                return Err(CodecError::Truncated {
                    needed: pos + len,
                    available: data.len(),
                });
            }

            if is_start_of_frame(marker) {
                // length(2) precision(1) height(2) width(2)
                if len < 7 {
                    return Err(CodecError::NotJpeg("short frame header".into()));
                }
                let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as u32;
                let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
                return Ok((width, height));
            }

            pos += len;
        }
    }
}

impl ImageDecoder for JpegDecoder {
    fn decode(&self, data: Bytes) -> CodecResult<DecodedImage> {
        let (width, height) = Self::dimensions(&data)?;
        Ok(DecodedImage {
            data,
            width,
            height,
        })
    }
}

/// Re-reads one JPEG file on every tick, standing in for a camera
pub struct JpegFileSource {
    path: PathBuf,
}

impl JpegFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for JpegFileSource {
    // A synchronous read of one still image per tick. Sources that can stall
    // (network mounts, devices) belong behind their own thread.
    fn next_frame(&mut self) -> CodecResult<Option<Bytes>> {
        let data = std::fs::read(&self.path)?;
        if data.is_empty() {
            debug!(path = %self.path.display(), "Frame source file is empty");
            return Ok(None);
        }
        Ok(Some(Bytes::from(data)))
    }
}
