//! Shared Protocol Definitions for LAN chat
//!
//! Wire formats shared by every peer and relay: stream framing for text and
//! files, chat datagrams, and chunked video datagrams. Nothing here performs
//! I/O.

mod assembly;
mod chat;
mod endpoint;
mod error;
mod role;
mod stream;
mod video;

pub use assembly::*;
pub use chat::*;
pub use endpoint::*;
pub use error::*;
pub use role::*;
pub use stream::*;
pub use video::*;

/// Default UDP port of the chat relay
pub const DEFAULT_CHAT_PORT: u16 = 5000;

/// Default UDP port of the video relay
pub const DEFAULT_VIDEO_RELAY_PORT: u16 = 6000;

/// Default local UDP port a video peer receives on
pub const DEFAULT_VIDEO_LOCAL_PORT: u16 = 6001;
