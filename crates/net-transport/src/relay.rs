//! Datagram relays for chat and video

use std::net::SocketAddr;
use std::sync::Arc;

use shared_protocol::ForwardPolicy;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{RegistryHandle, TransportError, TransportResult};

/// Receive buffer large enough for any UDP payload
const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Learns peers from inbound traffic and forwards every datagram to them
pub struct RelayServer {
    name: &'static str,
    socket: Arc<UdpSocket>,
    policy: ForwardPolicy,
    registry: RegistryHandle,
    registry_task: JoinHandle<()>,
}

impl RelayServer {
    pub async fn bind(
        name: &'static str,
        addr: SocketAddr,
        policy: ForwardPolicy,
    ) -> TransportResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::Bind(format!("{}: {}", addr, e)))?;
        let (registry, registry_task) = RegistryHandle::spawn(name, policy);

        info!(relay = name, ?policy, "Relay bound to {}", socket.local_addr()?);

        Ok(Self {
            name,
            socket: Arc::new(socket),
            policy,
            registry,
            registry_task,
        })
    }

    /// Chat relay: every datagram is echoed to all peers, the sender included
    pub async fn chat(addr: SocketAddr) -> TransportResult<Self> {
        Self::bind("chat", addr, ForwardPolicy::IncludeSender).await
    }

    /// Video relay: every datagram goes to all peers except the sender
    pub async fn video(addr: SocketAddr) -> TransportResult<Self> {
        Self::bind("video", addr, ForwardPolicy::ExcludeSender).await
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn policy(&self) -> ForwardPolicy {
        self.policy
    }

    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Forward datagrams until the registry stops. Payloads are never parsed.
    pub async fn run(self) -> TransportResult<()> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let (n, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(relay = self.name, "Receive error: {}", e);
                    continue;
                }
            };

            let targets = self.registry.observe(from).await?;
            debug!(relay = self.name, %from, len = n, targets = targets.len(), "Forwarding");

            for target in targets {
                if let Err(e) = self.socket.send_to(&buf[..n], target).await {
                    warn!(relay = self.name, %target, "Forward failed: {}", e);
                }
            }
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.registry_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn socket() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    /// Read until `expected` arrives or the timeout passes
    async fn received(socket: &UdpSocket, expected: &[u8], timeout: Duration) -> bool {
        let mut buf = [0u8; 1024];
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((n, _))) if &buf[..n] == expected => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    }

    async fn register_all(relay: SocketAddr, registry: &RegistryHandle, peers: &[&UdpSocket]) {
        for peer in peers {
            peer.send_to(b"r", relay).await.unwrap();
        }
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while registry.endpoints().await.unwrap().len() < peers.len() {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_chat_relay_echoes_to_everyone() {
        let relay = RelayServer::chat("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = relay.local_addr().unwrap();
        let registry = relay.registry();
        tokio::spawn(relay.run());

        let (a, b, c) = (socket().await, socket().await, socket().await);
        register_all(addr, &registry, &[&a, &b, &c]).await;

        a.send_to(b"ana|hello", addr).await.unwrap();
        for peer in [&a, &b, &c] {
            assert!(received(peer, b"ana|hello", Duration::from_secs(2)).await);
        }
    }

    #[tokio::test]
    async fn test_video_relay_skips_sender() {
        let relay = RelayServer::video("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = relay.local_addr().unwrap();
        let registry = relay.registry();
        tokio::spawn(relay.run());

        let (a, b, c) = (socket().await, socket().await, socket().await);
        register_all(addr, &registry, &[&a, &b, &c]).await;

        a.send_to(b"chunk", addr).await.unwrap();
        assert!(received(&b, b"chunk", Duration::from_secs(2)).await);
        assert!(received(&c, b"chunk", Duration::from_secs(2)).await);
        assert!(!received(&a, b"chunk", Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_repeat_sender_not_duplicated() {
        let relay = RelayServer::chat("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = relay.local_addr().unwrap();
        let registry = relay.registry();
        tokio::spawn(relay.run());

        let a = socket().await;
        for _ in 0..3 {
            a.send_to(b"x", addr).await.unwrap();
            assert!(received(&a, b"x", Duration::from_secs(2)).await);
        }
        assert_eq!(registry.endpoints().await.unwrap().len(), 1);
    }
}
