//! Chat client over the datagram relay

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use shared_protocol::{ChatPayload, ProtocolError, is_valid_username};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{ChatConfig, EventSink, PeerEvent, TransportError, TransportResult};

const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Sends `username|message` lines to a chat relay and surfaces what it echoes back
pub struct ChatClient {
    username: String,
    socket: Arc<UdpSocket>,
    reader: JoinHandle<()>,
}

impl ChatClient {
    /// Bind, start receiving and announce the join
    pub async fn start(config: &ChatConfig, sink: EventSink) -> TransportResult<Self> {
        if !is_valid_username(&config.username) {
            return Err(ProtocolError::InvalidUsername(config.username.clone()).into());
        }

        let ip = match config.server_addr {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let bind_addr = SocketAddr::new(ip, config.local_port);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| TransportError::Bind(format!("{}: {}", bind_addr, e)))?;
        socket.connect(config.server_addr).await?;
        let socket = Arc::new(socket);

        let reader = tokio::spawn(recv_loop(socket.clone(), sink));

        let client = Self {
            username: config.username.clone(),
            socket,
            reader,
        };
        info!(
            user = %client.username,
            server = %config.server_addr,
            "Chat client bound to {}",
            client.local_addr()?
        );

        client.send_payload(&ChatPayload::joined(&client.username)).await?;
        Ok(client)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn send(&self, message: &str) -> TransportResult<()> {
        self.send_payload(&ChatPayload::new(self.username.as_str(), message))
            .await
    }

    async fn send_payload(&self, payload: &ChatPayload) -> TransportResult<()> {
        self.socket.send(&payload.encode()).await.map_err(|e| {
            warn!("Chat send failed: {}", e);
            TransportError::Send(e.to_string())
        })?;
        Ok(())
    }

    /// Announce the leave, best effort, and stop receiving
    pub async fn shutdown(self) {
        if let Err(e) = self.send_payload(&ChatPayload::left(&self.username)).await {
            debug!("Leave announcement not sent: {}", e);
        }
        self.reader.abort();
        info!(user = %self.username, "Chat client stopped");
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, sink: EventSink) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => {
                let payload = ChatPayload::decode(&buf[..n]);
                debug!(from = %payload.username, "Chat line received");
                sink.push(PeerEvent::ChatReceived {
                    from: payload.username,
                    message: payload.message,
                });
            }
            // a refused send surfaces here on connected sockets
            Err(e) => debug!("Chat receive error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::next_event;
    use crate::{DispatchQueue, RelayServer};

    async fn chat_event(queue: &DispatchQueue, from: &str, message: &str) {
        loop {
            if let PeerEvent::ChatReceived { from: f, message: m } = next_event(queue).await {
                if f == from && m == message {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_clients_talk_through_relay() {
        let relay = RelayServer::chat("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let server_addr = relay.local_addr().unwrap();
        tokio::spawn(relay.run());

        let ana_queue = DispatchQueue::new();
        let ana = ChatClient::start(
            &ChatConfig {
                server_addr,
                local_port: 0,
                username: "ana".into(),
            },
            ana_queue.sink(),
        )
        .await
        .unwrap();
        // own join is echoed back
        chat_event(&ana_queue, "ana", "ana joined").await;

        let bo_queue = DispatchQueue::new();
        let bo = ChatClient::start(
            &ChatConfig {
                server_addr,
                local_port: 0,
                username: "bo".into(),
            },
            bo_queue.sink(),
        )
        .await
        .unwrap();
        chat_event(&ana_queue, "bo", "bo joined").await;

        ana.send("hi | there").await.unwrap();
        chat_event(&bo_queue, "ana", "hi | there").await;

        bo.shutdown().await;
        chat_event(&ana_queue, "bo", "bo left").await;
    }

    #[tokio::test]
    async fn test_raw_line_without_sender() {
        let relay = RelayServer::chat("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let server_addr = relay.local_addr().unwrap();
        tokio::spawn(relay.run());

        let queue = DispatchQueue::new();
        let client = ChatClient::start(
            &ChatConfig {
                server_addr,
                local_port: 0,
                username: "ana".into(),
            },
            queue.sink(),
        )
        .await
        .unwrap();
        chat_event(&queue, "ana", "ana joined").await;

        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(b"no sender", server_addr).await.unwrap();
        chat_event(&queue, "unknown", "no sender").await;
        assert_eq!(client.username(), "ana");
    }

    #[tokio::test]
    async fn test_username_with_separator_rejected() {
        let config = ChatConfig {
            username: "a|b".into(),
            ..ChatConfig::default()
        };
        let result = ChatClient::start(&config, DispatchQueue::new().sink()).await;
        assert!(matches!(
            result,
            Err(TransportError::Protocol(ProtocolError::InvalidUsername(_)))
        ));
    }
}
