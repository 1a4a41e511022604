//! Upstream domain model.
//!
//! An `Upstream` is a declarative, routable service target. It is resolved into
//! live `Endpoint`s by the service-registry watcher (see [`crate::eds`]) and turned
//! into an Envoy `Cluster` plus `ClusterLoadAssignment` by the translator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity of an upstream, unique within a single proxy's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UpstreamRef {
    pub namespace: String,
    pub name: String,
}

impl UpstreamRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    /// Canonical Envoy cluster name for this upstream: `<namespace>~<name>`.
    pub fn cluster_name(&self) -> String {
        format!("{}~{}", self.namespace, self.name)
    }
}

impl fmt::Display for UpstreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.namespace, self.name)
    }
}

/// A routable service target. Exactly one of [`UpstreamKind`]'s variants applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    pub reference: UpstreamRef,
    pub kind: UpstreamKind,
    pub ssl: Option<UpstreamSslConfig>,
}

impl Upstream {
    pub fn new(reference: UpstreamRef, kind: UpstreamKind) -> Self {
        Self { reference, kind, ssl: None }
    }

    pub fn with_ssl(mut self, ssl: UpstreamSslConfig) -> Self {
        self.ssl = Some(ssl);
        self
    }

    pub fn validate(&self) -> Result<(), UpstreamValidationError> {
        if self.reference.name.trim().is_empty() {
            return Err(UpstreamValidationError::EmptyName);
        }
        if !crate::utils::VALID_NAME_REGEX.is_match(&self.reference.name) {
            return Err(UpstreamValidationError::InvalidName(self.reference.name.clone()));
        }
        if let UpstreamKind::ServiceRegistry(spec) = &self.kind {
            if spec.service_name.trim().is_empty() {
                return Err(UpstreamValidationError::MissingServiceName);
            }
        }
        Ok(())
    }

    /// Only service-registry upstreams are tracked by the EDS watcher; other
    /// kinds resolve their endpoints through other means (static config,
    /// Kubernetes EndpointSlices, AWS target groups) that this crate does not
    /// implement.
    pub fn as_service_registry(&self) -> Option<&ServiceRegistrySpec> {
        match &self.kind {
            UpstreamKind::ServiceRegistry(spec) => Some(spec),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UpstreamKind {
    ServiceRegistry(ServiceRegistrySpec),
    Kubernetes(KubernetesSpec),
    Static(StaticSpec),
    Aws(AwsSpec),
}

/// Kind-specific spec for a service tracked through the service-registry backend
/// (Consul-shaped catalog: service name, data centers, instance tags).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceRegistrySpec {
    pub service_name: String,
    pub data_centers: BTreeSet<String>,
    pub instance_tags: BTreeSet<String>,
    /// When set, overrides `instance_tags` for subset-matching purposes. See
    /// `UpstreamRef::tag_union` callers in the EDS watcher for the exact rule:
    /// subset tags if set, otherwise instance tags, unioned across tracked
    /// upstreams with no further reconciliation.
    pub subset_tags: Option<BTreeSet<String>>,
    pub use_tls: bool,
}

impl ServiceRegistrySpec {
    /// The tag set used when building per-endpoint tag labels: `subset_tags` if
    /// set, else `instance_tags`.
    pub fn tag_union(&self) -> &BTreeSet<String> {
        self.subset_tags.as_ref().unwrap_or(&self.instance_tags)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesSpec {
    pub service_name: String,
    pub namespace: String,
    pub port_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticSpec {
    pub endpoints: Vec<StaticEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticEndpoint {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsSpec {
    pub target_group_arn: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSslConfig {
    pub sni: Option<String>,
    pub verify: bool,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamValidationError {
    #[error("upstream name must not be empty")]
    EmptyName,
    #[error("service-registry upstream must name a service")]
    MissingServiceName,
    #[error("upstream name '{0}' is not a valid Envoy resource name")]
    InvalidName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_name_joins_namespace_and_name() {
        let r = UpstreamRef::new("payments", "orders-api");
        assert_eq!(r.cluster_name(), "payments~orders-api");
        assert_eq!(r.to_string(), "payments~orders-api");
    }

    #[test]
    fn validate_rejects_empty_name() {
        let u = Upstream::new(
            UpstreamRef::new("payments", ""),
            UpstreamKind::ServiceRegistry(ServiceRegistrySpec {
                service_name: "orders".into(),
                ..Default::default()
            }),
        );
        assert_eq!(u.validate(), Err(UpstreamValidationError::EmptyName));
    }

    #[test]
    fn validate_rejects_name_starting_with_a_digit() {
        let u = Upstream::new(
            UpstreamRef::new("payments", "9orders"),
            UpstreamKind::ServiceRegistry(ServiceRegistrySpec {
                service_name: "orders".into(),
                ..Default::default()
            }),
        );
        assert_eq!(
            u.validate(),
            Err(UpstreamValidationError::InvalidName("9orders".to_string()))
        );
    }

    #[test]
    fn validate_accepts_a_well_formed_name() {
        let u = Upstream::new(
            UpstreamRef::new("payments", "orders-api"),
            UpstreamKind::ServiceRegistry(ServiceRegistrySpec {
                service_name: "orders".into(),
                ..Default::default()
            }),
        );
        assert!(u.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_service_name() {
        let u = Upstream::new(
            UpstreamRef::new("payments", "orders-api"),
            UpstreamKind::ServiceRegistry(ServiceRegistrySpec::default()),
        );
        assert_eq!(u.validate(), Err(UpstreamValidationError::MissingServiceName));
    }

    #[test]
    fn tag_union_prefers_subset_tags() {
        let mut spec = ServiceRegistrySpec {
            service_name: "orders".into(),
            instance_tags: BTreeSet::from(["canary".to_string()]),
            ..Default::default()
        };
        assert_eq!(spec.tag_union(), &BTreeSet::from(["canary".to_string()]));

        spec.subset_tags = Some(BTreeSet::from(["primary".to_string()]));
        assert_eq!(spec.tag_union(), &BTreeSet::from(["primary".to_string()]));
    }
}
