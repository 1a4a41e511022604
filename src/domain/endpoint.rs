//! Resolved service-registry instances and the live `Endpoint`s derived from them.

use super::upstream::UpstreamRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, SocketAddr};

pub const TAG_LABEL_PREFIX: &str = "tag:";
pub const DC_LABEL_PREFIX: &str = "dc:";

/// One registration tuple as returned by the service-registry backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogService {
    pub service_name: String,
    pub instance_id: String,
    pub node_address: String,
    pub service_address: String,
    pub data_center: String,
    pub tags: BTreeSet<String>,
    pub port: u16,
    pub modify_index: u64,
}

impl CatalogService {
    /// The address actually used to reach this instance: `service_address` when
    /// set, else `node_address`.
    pub fn effective_address(&self) -> &str {
        if self.service_address.is_empty() {
            &self.node_address
        } else {
            &self.service_address
        }
    }
}

/// A resolved (address, port) with labels for subset matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    /// Set iff the original catalog address was a hostname and was resolved
    /// through the DNS resolver; unset when the address was already an IP.
    pub hostname: Option<String>,
    /// Monotone per source (the catalog's modify index, base-10).
    pub resource_version: String,
    pub labels: BTreeMap<String, String>,
    pub upstreams: Vec<UpstreamRef>,
    pub health_check_hint: Option<String>,
    /// Replaces the process-wide TLS marker map: set directly on instances
    /// discovered on port 443.
    pub tls_hint: bool,
}

impl Endpoint {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    pub fn references(&self, upstream: &UpstreamRef) -> bool {
        self.upstreams.iter().any(|u| u == upstream)
    }

    /// An endpoint references an upstream when the upstream's required
    /// instance tags are a (possibly empty) subset of the endpoint's tags.
    pub fn satisfies_instance_tags(&self, required: &BTreeSet<String>) -> bool {
        required.iter().all(|tag| {
            self.labels.get(&format!("{TAG_LABEL_PREFIX}{tag}")).map(|v| v == "1").unwrap_or(false)
        })
    }
}

/// Sanitize a raw string into a valid Envoy resource name. Underscores are
/// dropped outright (not replaced with `-`) and every other non
/// `[a-zA-Z0-9-]` character becomes `-`, matching the service-registry
/// backend's own name-sanitizing convention.
pub fn sanitize_resource_name(raw: &str) -> String {
    raw.chars()
        .filter(|&c| c != '_')
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(labels: BTreeMap<String, String>) -> Endpoint {
        Endpoint {
            name: "10-0-0-1-orders-abc-8080".into(),
            address: "10.0.0.1".parse().unwrap(),
            port: 8080,
            hostname: None,
            resource_version: "42".into(),
            labels,
            upstreams: vec![],
            health_check_hint: None,
            tls_hint: false,
        }
    }

    #[test]
    fn effective_address_prefers_service_address() {
        let svc = CatalogService {
            service_name: "orders".into(),
            instance_id: "orders-1".into(),
            node_address: "10.0.0.2".into(),
            service_address: "10.0.0.5".into(),
            data_center: "dc1".into(),
            tags: BTreeSet::new(),
            port: 8080,
            modify_index: 1,
        };
        assert_eq!(svc.effective_address(), "10.0.0.5");
    }

    #[test]
    fn effective_address_falls_back_to_node_address() {
        let svc = CatalogService {
            service_name: "orders".into(),
            instance_id: "orders-1".into(),
            node_address: "10.0.0.2".into(),
            service_address: String::new(),
            data_center: "dc1".into(),
            tags: BTreeSet::new(),
            port: 8080,
            modify_index: 1,
        };
        assert_eq!(svc.effective_address(), "10.0.0.2");
    }

    #[test]
    fn sanitize_replaces_invalid_characters() {
        assert_eq!(sanitize_resource_name("10.0.0.1-orders-abc:8080"), "10-0-0-1-orders-abc-8080");
    }

    #[test]
    fn sanitize_drops_underscores_rather_than_replacing_them() {
        assert_eq!(sanitize_resource_name("orders_api-svc_1"), "ordersapi-svc1");
    }

    #[test]
    fn satisfies_instance_tags_checks_label_subset() {
        let mut labels = BTreeMap::new();
        labels.insert(format!("{TAG_LABEL_PREFIX}canary"), "1".to_string());
        labels.insert(format!("{TAG_LABEL_PREFIX}primary"), "0".to_string());
        let ep = endpoint(labels);

        assert!(ep.satisfies_instance_tags(&BTreeSet::from(["canary".to_string()])));
        assert!(!ep.satisfies_instance_tags(&BTreeSet::from(["primary".to_string()])));
        assert!(ep.satisfies_instance_tags(&BTreeSet::new()));
    }
}
