//! Streaming xDS server fabric: node identity hashing, per-node snapshot
//! cache, and the CDS/EDS/LDS/RDS services bound onto a tonic transport.
//!
//! - ADS (Aggregated Discovery Service) is intentionally not bound here: the
//!   spec only asks for the four type-specific discovery services, each
//!   independently streamed and keyed by the same node identity.
//! - RDS (Route Discovery Service)
//! - CDS/EDS (Cluster/Endpoint Discovery Service)
//! - LDS (Listener Discovery Service)

pub mod cache;
pub mod node_hash;
pub mod server;

pub use cache::SnapshotCache;
pub use node_hash::{NodeHasher, FALLBACK_NODE_KEY};

use crate::config::XdsConfig;
use crate::errors::{Error, Result};
use envoy_types::pb::envoy::service::cluster::v3::cluster_discovery_service_server::ClusterDiscoveryServiceServer;
use envoy_types::pb::envoy::service::endpoint::v3::endpoint_discovery_service_server::EndpointDiscoveryServiceServer;
use envoy_types::pb::envoy::service::listener::v3::listener_discovery_service_server::ListenerDiscoveryServiceServer;
use envoy_types::pb::envoy::service::route::v3::route_discovery_service_server::RouteDiscoveryServiceServer;
use server::{ClusterService, DiscoveryCore, EndpointService, ListenerService, RouteService};
use std::future::Future;
use std::sync::Arc;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tracing::info;

/// Bind CDS/EDS/LDS/RDS onto a tonic server and serve until `shutdown_signal`
/// resolves, per component I. The fallback snapshot must already be preloaded
/// into `cache` under [`FALLBACK_NODE_KEY`] by the caller before this runs —
/// registration is a streaming concern, not a cache-population one.
pub async fn start_server<F>(config: &XdsConfig, cache: Arc<SnapshotCache>, shutdown_signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("invalid xDS bind address: {e}")))?;

    let core = Arc::new(DiscoveryCore::new(cache));

    let mut builder = Server::builder();
    if let Some(tls_config) = build_server_tls_config(config)? {
        builder = builder
            .tls_config(tls_config)
            .map_err(|e| Error::config(format!("failed to apply xDS TLS configuration: {e}")))?;
    }

    info!(address = %addr, "starting xDS streaming server");

    builder
        .add_service(ClusterDiscoveryServiceServer::new(ClusterService::new(core.clone())))
        .add_service(EndpointDiscoveryServiceServer::new(EndpointService::new(core.clone())))
        .add_service(ListenerDiscoveryServiceServer::new(ListenerService::new(core.clone())))
        .add_service(RouteDiscoveryServiceServer::new(RouteService::new(core)))
        .serve_with_shutdown(addr, shutdown_signal)
        .await
        .map_err(|e| Error::xds(format!("xDS server failed: {e}")))?;

    Ok(())
}

fn build_server_tls_config(config: &XdsConfig) -> Result<Option<ServerTlsConfig>> {
    if !config.enable_mtls {
        return Ok(None);
    }

    let cert_path = config
        .cert_file
        .as_ref()
        .ok_or_else(|| Error::config("enable_mtls is set but cert_file is missing"))?;
    let key_path = config
        .key_file
        .as_ref()
        .ok_or_else(|| Error::config("enable_mtls is set but key_file is missing"))?;

    let cert_bytes = std::fs::read(cert_path)
        .map_err(|e| Error::config(format!("failed to read xDS TLS certificate '{cert_path}': {e}")))?;
    let key_bytes = std::fs::read(key_path)
        .map_err(|e| Error::config(format!("failed to read xDS TLS private key '{key_path}': {e}")))?;

    let identity = Identity::from_pem(cert_bytes, key_bytes);
    let mut tls_config = ServerTlsConfig::new().identity(identity);

    if let Some(ca_path) = &config.ca_file {
        let ca_bytes = std::fs::read(ca_path)
            .map_err(|e| Error::config(format!("failed to read xDS client CA '{ca_path}': {e}")))?;
        tls_config = tls_config.client_ca_root(Certificate::from_pem(ca_bytes));
    }

    Ok(Some(tls_config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_config_is_none_when_mtls_disabled() {
        let config = XdsConfig::default();
        assert!(build_server_tls_config(&config).unwrap().is_none());
    }

    #[test]
    fn tls_config_requires_cert_and_key_when_mtls_enabled() {
        let config = XdsConfig { enable_mtls: true, ..XdsConfig::default() };
        assert!(build_server_tls_config(&config).is_err());
    }
}
