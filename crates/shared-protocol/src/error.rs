//! Error types for the protocol

use thiserror::Error;

/// Protocol error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed file header: {0}")]
    MalformedHeader(String),

    #[error("Invalid file size in header: {0:?}")]
    InvalidFileSize(String),

    #[error("Declared file size too large: {size} bytes (max: {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("Chunk too short: {0} bytes")]
    ChunkTooShort(usize),

    #[error("Chunk index {index} out of range for {total} chunks")]
    InvalidChunkIndex { index: u16, total: u16 },

    #[error("Frame {frame_id} has {expected} chunks, chunk claims {actual}")]
    ChunkCountMismatch {
        frame_id: u32,
        expected: u16,
        actual: u16,
    },

    #[error("Frame needs {0} chunks (max: 65535)")]
    TooManyChunks(usize),

    #[error("Invalid chunk size: {size} (max: {max})")]
    InvalidChunkSize { size: usize, max: usize },

    #[error("Empty frame")]
    EmptyFrame,
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
