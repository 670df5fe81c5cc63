//! Datagram endpoints and the add-only relay registry

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// A peer address as seen by a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatagramEndpoint(pub SocketAddr);

impl DatagramEndpoint {
    /// Registry key: the literal `address:port` string
    pub fn key(&self) -> String {
        format!("{}:{}", self.0.ip(), self.0.port())
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for DatagramEndpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for DatagramEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Who receives a relayed datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardPolicy {
    /// Every known endpoint, the sender included (chat echo)
    IncludeSender,
    /// Every known endpoint except the sender (video)
    ExcludeSender,
}

/// Known peers of one relay, in first-seen order.
///
/// Membership only grows; there is no liveness tracking.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    keys: HashSet<String>,
    endpoints: Vec<DatagramEndpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the endpoint was not known before
    pub fn register(&mut self, endpoint: DatagramEndpoint) -> bool {
        if self.keys.insert(endpoint.key()) {
            self.endpoints.push(endpoint);
            true
        } else {
            false
        }
    }

    /// Forward set for a datagram that arrived from `sender`
    pub fn targets(&self, sender: DatagramEndpoint, policy: ForwardPolicy) -> Vec<SocketAddr> {
        let sender_key = sender.key();
        self.endpoints
            .iter()
            .filter(|e| match policy {
                ForwardPolicy::IncludeSender => true,
                ForwardPolicy::ExcludeSender => e.key() != sender_key,
            })
            .map(DatagramEndpoint::addr)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[DatagramEndpoint] {
        &self.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(s: &str) -> DatagramEndpoint {
        DatagramEndpoint(s.parse().unwrap())
    }

    #[test]
    fn test_key_format() {
        assert_eq!(ep("192.168.1.4:5000").key(), "192.168.1.4:5000");
        assert_eq!(ep("[::1]:6000").key(), "::1:6000");
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = EndpointRegistry::new();
        assert!(registry.register(ep("10.0.0.1:5000")));
        assert!(!registry.register(ep("10.0.0.1:5000")));
        assert!(registry.register(ep("10.0.0.1:5001")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_forward_sets() {
        let mut registry = EndpointRegistry::new();
        for addr in ["10.0.0.1:1", "10.0.0.2:2", "10.0.0.3:3"] {
            registry.register(ep(addr));
        }
        let sender = ep("10.0.0.2:2");
        assert_eq!(registry.targets(sender, ForwardPolicy::IncludeSender).len(), 3);

        let others = registry.targets(sender, ForwardPolicy::ExcludeSender);
        assert_eq!(others.len(), 2);
        assert!(!others.contains(&sender.addr()));
    }
}
