//! Declarative snapshot → per-proxy xDS snapshot.
//!
//! `Translate` builds one cluster and load assignment per upstream and one
//! listener/route pair per proxy listener, running the plugin registry's
//! processors over each, and reports translation outcomes per resource.
//! Grounded in the teacher's `xds/cluster.rs`/`xds/route.rs`/`xds/listener.rs`
//! conversion shape; see [`resources`] for the envoy-types builders.

pub mod resources;

use crate::domain::{Proxy, Report, ReportSet, UpstreamRef, XdsSnapshot};
use crate::plugins::PluginRegistry;
use crate::store::ApiSnapshot;

/// Per-proxy translation outcome.
pub struct Translation {
    pub snapshot: XdsSnapshot,
    pub reports: ReportSet,
    pub proxy_report: Report,
}

/// Builds xDS snapshots from a declarative input snapshot, one proxy at a
/// time.
pub struct Translator<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> Translator<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Translate one proxy against the given declarative snapshot.
    ///
    /// Determinism: upstreams and listeners are iterated in the order the
    /// caller provides — the syncer is responsible for handing in a stably
    /// sorted `ApiSnapshot` (e.g. `BTreeMap`-backed, as
    /// [`crate::store::ApiSnapshot`] already is) so repeated calls on
    /// unchanged input produce byte-identical snapshots.
    pub fn translate(&self, input: &ApiSnapshot, proxy: &Proxy) -> Translation {
        let mut snapshot = XdsSnapshot::default();
        let mut reports = ReportSet::new();
        let mut proxy_report = Report::default();

        let referenced_upstreams = proxy_referenced_upstreams(proxy);

        for upstream in &input.upstreams {
            if !referenced_upstreams.contains(&upstream.reference) {
                continue;
            }

            let mut report = Report::default();
            if let Err(e) = upstream.validate() {
                report.add_error(e.to_string());
            }

            let endpoints = input.endpoints_for(&upstream.reference);
            let tls_hint = endpoints.iter().any(|e| e.tls_hint);

            match resources::build_cluster(upstream, self.registry, tls_hint) {
                Ok(cluster) => {
                    let cla = resources::build_cluster_load_assignment(&upstream.reference, endpoints);
                    snapshot.clusters.insert(upstream.reference.cluster_name(), cluster);
                    snapshot.endpoints.insert(upstream.reference.cluster_name(), cla);
                }
                Err(e) => report.add_error(e.to_string()),
            }

            reports.insert(upstream.reference.to_string(), report);
        }

        for listener in &proxy.listeners {
            match resources::build_listener_and_routes(listener, self.registry) {
                Ok((envoy_listener, route_config)) => {
                    snapshot.listeners.insert(listener.name.clone(), envoy_listener);
                    snapshot.routes.insert(route_config.name.clone(), route_config);
                }
                Err(e) => {
                    proxy_report.add_error(format!("listener {}: {e}", listener.name));
                }
            }
        }

        Translation { snapshot, reports, proxy_report }
    }
}

fn proxy_referenced_upstreams(proxy: &Proxy) -> std::collections::BTreeSet<UpstreamRef> {
    proxy
        .listeners
        .iter()
        .flat_map(|l| l.routes.iter())
        .flat_map(|r| r.destinations.iter())
        .map(|d| d.upstream.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ProxyListener, ProxyRef, ProxyRoute, ServiceRegistrySpec, Upstream, UpstreamKind,
        WeightedDestination,
    };
    use prost::Message;

    fn sample_proxy() -> Proxy {
        Proxy {
            reference: ProxyRef::new("payments", "edge-1"),
            listeners: vec![ProxyListener {
                name: "http".into(),
                bind_address: "0.0.0.0".into(),
                bind_port: 10000,
                routes: vec![ProxyRoute {
                    name: "default".into(),
                    path_prefix: "/".into(),
                    destinations: vec![WeightedDestination {
                        upstream: UpstreamRef::new("payments", "orders-api"),
                        weight: 100,
                    }],
                    early_transformation: false,
                }],
            }],
        }
    }

    fn sample_upstream() -> Upstream {
        Upstream::new(
            UpstreamRef::new("payments", "orders-api"),
            UpstreamKind::ServiceRegistry(ServiceRegistrySpec {
                service_name: "orders".into(),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn translate_builds_one_cluster_and_one_listener() {
        let registry = PluginRegistry::new();
        let translator = Translator::new(&registry);
        let input = ApiSnapshot {
            proxies: vec![sample_proxy()],
            upstreams: vec![sample_upstream()],
            endpoints: Default::default(),
        };

        let translation = translator.translate(&input, &sample_proxy());

        assert_eq!(translation.snapshot.clusters.len(), 1);
        assert_eq!(translation.snapshot.listeners.len(), 1);
        assert!(translation.snapshot.clusters.contains_key("payments~orders-api"));
        assert!(translation.proxy_report.errors.is_empty());
    }

    #[test]
    fn unreferenced_upstreams_are_skipped() {
        let registry = PluginRegistry::new();
        let translator = Translator::new(&registry);
        let mut extra = sample_upstream();
        extra.reference = UpstreamRef::new("payments", "unused-api");

        let input = ApiSnapshot {
            proxies: vec![sample_proxy()],
            upstreams: vec![sample_upstream(), extra],
            endpoints: Default::default(),
        };

        let translation = translator.translate(&input, &sample_proxy());
        assert_eq!(translation.snapshot.clusters.len(), 1);
    }

    #[test]
    fn invalid_upstream_is_reported_as_error() {
        let registry = PluginRegistry::new();
        let translator = Translator::new(&registry);
        let mut bad = sample_upstream();
        bad.kind = UpstreamKind::ServiceRegistry(ServiceRegistrySpec::default());

        let input = ApiSnapshot {
            proxies: vec![sample_proxy()],
            upstreams: vec![bad],
            endpoints: Default::default(),
        };

        let translation = translator.translate(&input, &sample_proxy());
        let report = &translation.reports["payments~orders-api"];
        assert!(!report.errors.is_empty());
    }

    #[test]
    fn translation_is_deterministic_across_repeated_calls() {
        let registry = PluginRegistry::new();
        let translator = Translator::new(&registry);
        let input = ApiSnapshot {
            proxies: vec![sample_proxy()],
            upstreams: vec![sample_upstream()],
            endpoints: Default::default(),
        };

        let first = translator.translate(&input, &sample_proxy());
        let second = translator.translate(&input, &sample_proxy());

        assert_eq!(
            first.snapshot.clusters["payments~orders-api"].encode_to_vec(),
            second.snapshot.clusters["payments~orders-api"].encode_to_vec(),
        );
    }

    #[test]
    fn endpoint_tls_hint_reaches_the_cluster_via_upstream_processor() {
        use crate::domain::Endpoint;
        use crate::plugins::tls::TlsUpstreamProcessor;
        use std::sync::Arc;

        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(TlsUpstreamProcessor));
        let translator = Translator::new(&registry);

        let upstream_ref = UpstreamRef::new("payments", "orders-api");
        let secure_endpoint = Endpoint {
            name: "10-0-0-1-orders-1-443".into(),
            address: "10.0.0.1".parse().unwrap(),
            port: 443,
            hostname: None,
            resource_version: "1".into(),
            labels: Default::default(),
            upstreams: vec![upstream_ref.clone()],
            health_check_hint: None,
            tls_hint: true,
        };

        let mut endpoints = std::collections::BTreeMap::new();
        endpoints.insert(upstream_ref, vec![secure_endpoint]);

        let input = ApiSnapshot {
            proxies: vec![sample_proxy()],
            upstreams: vec![sample_upstream()],
            endpoints,
        };

        let translation = translator.translate(&input, &sample_proxy());
        assert!(translation.snapshot.clusters["payments~orders-api"].transport_socket.is_some());
    }
}
