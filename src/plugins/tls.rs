//! Built-in upstream processor enabling TLS to a service-registry upstream.
//!
//! Grounded in `original_source/`'s `consul/plugin.go` `ProcessUpstream`: the
//! Go original keeps a process-wide `upstreamHttpsMap` guarded by an
//! `RWMutex`, written by the EDS watcher whenever it discovers an instance on
//! port 443 and read here. Per the redesign flag in the specification (§9),
//! that map is gone; the signal now travels as `Endpoint::tls_hint`, folded
//! by the translator into the `tls_hint` argument passed to every
//! [`crate::plugins::UpstreamProcessor`].

use crate::domain::Upstream;
use crate::errors::Result;
use crate::plugins::{Plugin, UpstreamProcessor};
use envoy_types::pb::envoy::config::core::v3::{transport_socket::ConfigType, TransportSocket};
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    CommonTlsContext, UpstreamTlsContext,
};
use envoy_types::pb::google::protobuf::Any;
use prost::Message;

const UPSTREAM_TLS_CONTEXT_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext";

/// Enables a TLS transport socket on a cluster when the upstream requests it
/// (`use_tls`) or `tls_hint` is set (an endpoint was discovered on port 443).
/// Mirrors the Go original's `spec.UseTls || (mapVal && isMapped)` check.
pub struct TlsUpstreamProcessor;

impl UpstreamProcessor for TlsUpstreamProcessor {
    fn process_upstream(&self, upstream: &Upstream, cluster: &mut Cluster, tls_hint: bool) -> Result<()> {
        let use_tls = upstream.as_service_registry().map(|spec| spec.use_tls).unwrap_or(false);
        if cluster.transport_socket.is_none() && (use_tls || tls_hint) {
            cluster.transport_socket = Some(build_upstream_transport_socket());
        }
        Ok(())
    }
}

impl Plugin for TlsUpstreamProcessor {
    fn name(&self) -> &str {
        "tls-upstream"
    }

    fn upstream_processor(&self) -> Option<&dyn UpstreamProcessor> {
        Some(self)
    }
}

fn build_upstream_transport_socket() -> TransportSocket {
    let tls_context =
        UpstreamTlsContext { common_tls_context: Some(CommonTlsContext::default()), ..Default::default() };

    TransportSocket {
        name: "envoy.transport_sockets.tls".to_string(),
        config_type: Some(ConfigType::TypedConfig(Any {
            type_url: UPSTREAM_TLS_CONTEXT_TYPE_URL.to_string(),
            value: tls_context.encode_to_vec(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServiceRegistrySpec, UpstreamKind, UpstreamRef};

    fn upstream(use_tls: bool) -> Upstream {
        Upstream::new(
            UpstreamRef::new("payments", "orders-api"),
            UpstreamKind::ServiceRegistry(ServiceRegistrySpec {
                service_name: "orders".into(),
                use_tls,
                ..Default::default()
            }),
        )
    }

    #[test]
    fn leaves_cluster_untouched_without_tls_signal() {
        let mut cluster = Cluster::default();
        TlsUpstreamProcessor.process_upstream(&upstream(false), &mut cluster, false).unwrap();
        assert!(cluster.transport_socket.is_none());
    }

    #[test]
    fn use_tls_spec_flag_enables_transport_socket() {
        let mut cluster = Cluster::default();
        TlsUpstreamProcessor.process_upstream(&upstream(true), &mut cluster, false).unwrap();
        assert!(cluster.transport_socket.is_some());
    }

    #[test]
    fn tls_hint_from_endpoint_enables_transport_socket() {
        let mut cluster = Cluster::default();
        TlsUpstreamProcessor.process_upstream(&upstream(false), &mut cluster, true).unwrap();
        assert!(cluster.transport_socket.is_some());
    }

    #[test]
    fn does_not_override_an_existing_transport_socket() {
        let mut cluster = Cluster::default();
        cluster.transport_socket =
            Some(TransportSocket { name: "custom".into(), config_type: None });
        TlsUpstreamProcessor.process_upstream(&upstream(true), &mut cluster, true).unwrap();
        assert_eq!(cluster.transport_socket.unwrap().name, "custom");
    }
}
