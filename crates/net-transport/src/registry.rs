//! Endpoint registry actor
//!
//! A relay's registry is owned by one task; receive loops talk to it over a
//! command channel and get forward sets back on a oneshot.

use std::net::SocketAddr;

use shared_protocol::{DatagramEndpoint, EndpointRegistry, ForwardPolicy};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::{TransportError, TransportResult};

enum Command {
    /// Register the sender and return its forward set
    Observe {
        sender: DatagramEndpoint,
        reply: oneshot::Sender<Vec<SocketAddr>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<DatagramEndpoint>>,
    },
}

/// Cloneable handle to a running registry task
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<Command>,
}

impl RegistryHandle {
    /// Spawn the owning task
    pub fn spawn(name: &'static str, policy: ForwardPolicy) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1024);
        let task = tokio::spawn(run(name, policy, rx));
        (Self { tx }, task)
    }

    /// Record `sender` and return where its datagram must be forwarded
    pub async fn observe(&self, sender: SocketAddr) -> TransportResult<Vec<SocketAddr>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Observe {
                sender: DatagramEndpoint::from(sender),
                reply,
            })
            .await
            .map_err(|_| TransportError::RegistryClosed)?;
        rx.await.map_err(|_| TransportError::RegistryClosed)
    }

    /// Known endpoints in first-seen order
    pub async fn endpoints(&self) -> TransportResult<Vec<DatagramEndpoint>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| TransportError::RegistryClosed)?;
        rx.await.map_err(|_| TransportError::RegistryClosed)
    }
}

async fn run(name: &'static str, policy: ForwardPolicy, mut rx: mpsc::Receiver<Command>) {
    let mut registry = EndpointRegistry::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Observe { sender, reply } => {
                if registry.register(sender) {
                    info!(relay = name, endpoint = %sender, total = registry.len(), "New endpoint");
                }
                let _ = reply.send(registry.targets(sender, policy));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(registry.endpoints().to_vec());
            }
        }
    }

    debug!(relay = name, "Registry task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_observe_registers_once() {
        let (registry, _task) = RegistryHandle::spawn("test", ForwardPolicy::IncludeSender);

        assert_eq!(
            registry.observe(addr("10.0.0.1:1")).await.unwrap(),
            vec![addr("10.0.0.1:1")]
        );
        registry.observe(addr("10.0.0.2:2")).await.unwrap();
        let targets = registry.observe(addr("10.0.0.1:1")).await.unwrap();
        assert_eq!(targets, vec![addr("10.0.0.1:1"), addr("10.0.0.2:2")]);
        assert_eq!(registry.endpoints().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_exclude_sender() {
        let (registry, _task) = RegistryHandle::spawn("test", ForwardPolicy::ExcludeSender);
        registry.observe(addr("10.0.0.1:1")).await.unwrap();
        registry.observe(addr("10.0.0.2:2")).await.unwrap();
        let targets = registry.observe(addr("10.0.0.3:3")).await.unwrap();
        assert_eq!(targets, vec![addr("10.0.0.1:1"), addr("10.0.0.2:2")]);
    }

    #[tokio::test]
    async fn test_stopped_registry() {
        let (registry, task) = RegistryHandle::spawn("test", ForwardPolicy::IncludeSender);
        task.abort();
        let _ = task.await;
        assert!(matches!(
            registry.observe(addr("10.0.0.1:1")).await,
            Err(TransportError::RegistryClosed)
        ));
    }
}
