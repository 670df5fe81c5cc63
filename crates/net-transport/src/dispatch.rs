//! Dispatch queue between network tasks and the UI layer
//!
//! Every network-originated event is pushed through an [`EventSink`] and
//! consumed on one thread by a [`PeerEventHandler`]. Nothing else touches the
//! UI.

use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use image_codec::DecodedImage;
use shared_protocol::SenderRole;
use tracing::debug;

/// Application event raised by a network task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    TextReceived { text: String, sender: SenderRole },
    FileReceived {
        name: String,
        bytes: Bytes,
        sender: SenderRole,
    },
    ChatReceived { from: String, message: String },
    FrameReady { image: DecodedImage },
    StreamClosed { sender: SenderRole },
}

/// UI collaborator. Only ever invoked from the queue's consumer.
pub trait PeerEventHandler {
    fn on_text_message(&mut self, text: &str, sender: SenderRole);

    fn on_file_message(&mut self, name: &str, bytes: &Bytes, sender: SenderRole);

    fn on_chat_message(&mut self, from: &str, text: &str);

    fn on_frame_ready(&mut self, image: &DecodedImage);

    fn on_stream_closed(&mut self, _sender: SenderRole) {}
}

/// Route one event to the matching handler method
pub fn deliver<H: PeerEventHandler + ?Sized>(handler: &mut H, event: &PeerEvent) {
    match event {
        PeerEvent::TextReceived { text, sender } => handler.on_text_message(text, *sender),
        PeerEvent::FileReceived {
            name,
            bytes,
            sender,
        } => handler.on_file_message(name, bytes, *sender),
        PeerEvent::ChatReceived { from, message } => handler.on_chat_message(from, message),
        PeerEvent::FrameReady { image } => handler.on_frame_ready(image),
        PeerEvent::StreamClosed { sender } => handler.on_stream_closed(*sender),
    }
}

/// Producer half, cloned into every network task
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<PeerEvent>,
}

impl EventSink {
    pub fn push(&self, event: PeerEvent) {
        if self.tx.send(event).is_err() {
            debug!("Dispatch queue consumer dropped, event discarded");
        }
    }
}

/// Multi-producer, single-consumer event queue
pub struct DispatchQueue {
    tx: Sender<PeerEvent>,
    rx: Receiver<PeerEvent>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sink(&self) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
        }
    }

    /// Deliver everything queued right now. Returns the number of events handled.
    pub fn drain<H: PeerEventHandler + ?Sized>(&self, handler: &mut H) -> usize {
        let mut handled = 0;
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    deliver(handler, &event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PeerEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll the queue from async tests without blocking the runtime
#[cfg(test)]
pub(crate) async fn next_event(queue: &DispatchQueue) -> PeerEvent {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(event) = queue.recv_timeout(Duration::ZERO) {
            return event;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "no event within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
