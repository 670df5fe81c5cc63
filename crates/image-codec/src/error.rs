//! Codec error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Not a JPEG stream: {0}")]
    NotJpeg(String),

    #[error("Truncated image: needed {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("No frame header before scan data")]
    MissingFrameHeader,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;
