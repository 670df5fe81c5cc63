//! Image Codec - encoded frame sources and decoders for the video path
//!
//! The capture/encode cadence lives outside the transport; this crate only
//! defines the seams the transport talks to:
//! - `FrameSource`: yields compressed image bytes on each capture tick
//! - `ImageDecoder`: validates a reassembled image before it is surfaced

mod error;
mod jpeg;
mod traits;

pub use error::*;
pub use jpeg::*;
pub use traits::*;
