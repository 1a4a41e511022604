//! Proxy (data-plane) identity and the listener/route declarations it carries.

use super::upstream::UpstreamRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProxyRef {
    pub namespace: String,
    pub name: String,
}

impl ProxyRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    /// The xDS node key this proxy is addressed by in the snapshot cache.
    pub fn node_key(&self) -> String {
        format!("{}~{}", self.namespace, self.name)
    }
}

/// A data-plane identity: namespace, name, and the listeners it should receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub reference: ProxyRef,
    pub listeners: Vec<ProxyListener>,
}

impl Proxy {
    pub fn node_key(&self) -> String {
        self.reference.node_key()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyListener {
    pub name: String,
    pub bind_address: String,
    pub bind_port: u16,
    pub routes: Vec<ProxyRoute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRoute {
    pub name: String,
    pub path_prefix: String,
    pub destinations: Vec<WeightedDestination>,
    /// Plugins carrying an `early` transformation on this route flip this so
    /// the early-stage filter is actually emitted for the owning listener.
    pub early_transformation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedDestination {
    pub upstream: UpstreamRef,
    pub weight: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_key_joins_namespace_and_name() {
        let r = ProxyRef::new("payments", "edge-1");
        assert_eq!(r.node_key(), "payments~edge-1");
    }

    #[test]
    fn proxy_node_key_delegates_to_reference() {
        let p = Proxy { reference: ProxyRef::new("payments", "edge-1"), listeners: vec![] };
        assert_eq!(p.node_key(), "payments~edge-1");
    }
}
