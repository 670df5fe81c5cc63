//! Frame source and decoder trait abstractions

use bytes::Bytes;

use crate::CodecResult;

/// A decoded image handed to the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// The compressed image exactly as received
    pub data: Bytes,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Produces one compressed image per capture tick
pub trait FrameSource: Send {
    /// Encoded bytes of the current frame, or `None` if nothing new was captured.
    ///
    /// Called from async code on the runtime thread, so it must return quickly.
    fn next_frame(&mut self) -> CodecResult<Option<Bytes>>;
}

/// Checks and describes a reassembled image
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, data: Bytes) -> CodecResult<DecodedImage>;
}
