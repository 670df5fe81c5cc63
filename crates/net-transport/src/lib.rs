//! Network Transport - tokio sockets for LAN chat
//!
//! TCP stream channels carry text and files between two peers. UDP carries
//! group chat and chunked video, optionally through relays. Everything a
//! socket task decodes is pushed onto a [`DispatchQueue`] for the UI layer.

mod chat;
mod config;
mod dispatch;
mod error;
mod registry;
mod relay;
mod stream;
mod video;

pub use chat::*;
pub use config::*;
pub use dispatch::*;
pub use error::*;
pub use registry::*;
pub use relay::*;
pub use stream::*;
pub use video::*;
