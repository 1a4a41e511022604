//! Pure envoy-types builders: one upstream becomes a `Cluster` plus a
//! `ClusterLoadAssignment`, one proxy listener becomes a `Listener` plus a
//! `RouteConfiguration`. Grounded in the teacher's `xds/cluster.rs`
//! `to_envoy_cluster`/`create_cluster_load_assignment` and `xds/listener.rs`/
//! `xds/route.rs` conversion shape, generalized from static REST config onto
//! the live domain model.

use crate::domain::{
    Endpoint as DomainEndpoint, ProxyListener, ProxyRoute, Upstream, UpstreamRef,
    WeightedDestination,
};
use crate::plugins::PluginRegistry;
use envoy_types::pb::envoy::config::cluster::v3::cluster::{
    ClusterDiscoveryType, DiscoveryType, LbPolicy,
};
use envoy_types::pb::envoy::config::cluster::v3::{Cluster, EdsClusterConfig};
use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressKind, config_source::ConfigSourceSpecifier, socket_address,
    AggregatedConfigSource, Address, ConfigSource, SocketAddress,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint::HostIdentifier, ClusterLoadAssignment, Endpoint as EnvoyEndpoint, LbEndpoint,
    LocalityLbEndpoints,
};
use envoy_types::pb::envoy::config::listener::v3::{Filter, FilterChain, Listener};
use envoy_types::pb::envoy::config::route::v3::route::Action as RouteAction3;
use envoy_types::pb::envoy::config::route::v3::route_action::ClusterSpecifier;
use envoy_types::pb::envoy::config::route::v3::route_match::PathSpecifier;
use envoy_types::pb::envoy::config::route::v3::weighted_cluster::ClusterWeight;
use envoy_types::pb::envoy::config::route::v3::{
    DirectResponseAction, Route, RouteAction, RouteConfiguration, RouteMatch, VirtualHost,
    WeightedCluster,
};
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router as RouterFilter;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::RouteSpecifier, http_filter::ConfigType as HttpFilterConfigType,
    HttpConnectionManager, HttpFilter, Rds,
};
use envoy_types::pb::google::protobuf::{Any, Duration, UInt32Value};
use prost::Message;

const ROUTER_FILTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
const HCM_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";

/// `<namespace>~<name>-routes`, the route configuration name the listener's
/// HTTP connection manager asks RDS for.
pub fn route_config_name(listener_name: &str) -> String {
    format!("{listener_name}-routes")
}

/// Build a cluster wired for EDS discovery via ADS — the live endpoint list
/// is delivered out-of-band through the same streaming connection rather
/// than embedded in the cluster itself.
pub fn build_cluster(
    upstream: &Upstream,
    registry: &PluginRegistry,
    tls_hint: bool,
) -> crate::errors::Result<Cluster> {
    let mut cluster = Cluster {
        name: upstream.reference.cluster_name(),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        eds_cluster_config: Some(EdsClusterConfig {
            eds_config: Some(ads_config_source()),
            service_name: String::new(),
        }),
        lb_policy: LbPolicy::RoundRobin as i32,
        connect_timeout: Some(Duration { seconds: 5, nanos: 0 }),
        ..Default::default()
    };

    for processor in registry.upstream_processors() {
        processor.process_upstream(upstream, &mut cluster, tls_hint)?;
    }

    Ok(cluster)
}

/// Build a cluster's load assignment from the endpoints currently resolved
/// for it.
pub fn build_cluster_load_assignment(
    upstream_ref: &UpstreamRef,
    endpoints: &[DomainEndpoint],
) -> ClusterLoadAssignment {
    let lb_endpoints = endpoints.iter().map(endpoint_to_lb_endpoint).collect();

    ClusterLoadAssignment {
        cluster_name: upstream_ref.cluster_name(),
        endpoints: vec![LocalityLbEndpoints { lb_endpoints, ..Default::default() }],
        ..Default::default()
    }
}

fn endpoint_to_lb_endpoint(endpoint: &DomainEndpoint) -> LbEndpoint {
    let socket_address = SocketAddress {
        address: endpoint.address.to_string(),
        port_specifier: Some(socket_address::PortSpecifier::PortValue(endpoint.port as u32)),
        ..Default::default()
    };

    let envoy_endpoint = EnvoyEndpoint {
        address: Some(Address { address: Some(AddressKind::SocketAddress(socket_address)) }),
        ..Default::default()
    };

    LbEndpoint {
        host_identifier: Some(HostIdentifier::Endpoint(envoy_endpoint)),
        ..Default::default()
    }
}

fn ads_config_source() -> ConfigSource {
    ConfigSource {
        config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource::default())),
        ..Default::default()
    }
}

/// Build one listener plus its (RDS-fetched) route configuration from a
/// proxy's declared listener, running route/vhost/weighted-destination
/// processors and aggregating HTTP filters via the plugin registry.
pub fn build_listener_and_routes(
    listener: &ProxyListener,
    registry: &PluginRegistry,
) -> crate::errors::Result<(Listener, RouteConfiguration)> {
    let route_config_name = route_config_name(&listener.name);
    let early = listener.routes.iter().any(|r| r.early_transformation);

    let mut vhost = VirtualHost {
        name: format!("{}-vhost", listener.name),
        domains: vec!["*".to_string()],
        routes: listener
            .routes
            .iter()
            .map(|route| build_route(route, registry))
            .collect::<crate::errors::Result<_>>()?,
        ..Default::default()
    };

    for route in &mut vhost.routes {
        for processor in registry.route_processors() {
            let proxy_route = listener
                .routes
                .iter()
                .find(|r| r.name == route.name)
                .expect("route built from this listener's own routes");
            processor.process_route(proxy_route, route)?;
        }
    }

    for processor in registry.virtual_host_processors() {
        processor.process_virtual_host(listener, &mut vhost)?;
    }

    let route_configuration = RouteConfiguration {
        name: route_config_name.clone(),
        virtual_hosts: vec![vhost],
        ..Default::default()
    };

    let http_filters = registry
        .http_filters(early)
        .into_iter()
        .map(|spec| HttpFilter {
            name: spec.name,
            is_optional: false,
            disabled: false,
            config_type: Some(HttpFilterConfigType::TypedConfig(spec.typed_config)),
        })
        .chain(std::iter::once(router_http_filter()))
        .collect();

    let hcm = HttpConnectionManager {
        stat_prefix: listener.name.clone(),
        route_specifier: Some(RouteSpecifier::Rds(Rds {
            route_config_name: route_config_name.clone(),
            config_source: Some(ads_config_source()),
        })),
        http_filters,
        ..Default::default()
    };

    let envoy_listener = Listener {
        name: listener.name.clone(),
        address: Some(Address {
            address: Some(AddressKind::SocketAddress(SocketAddress {
                address: listener.bind_address.clone(),
                port_specifier: Some(socket_address::PortSpecifier::PortValue(
                    listener.bind_port as u32,
                )),
                ..Default::default()
            })),
        }),
        filter_chains: vec![FilterChain {
            filters: vec![Filter {
                name: "envoy.filters.network.http_connection_manager".to_string(),
                config_type: Some(
                    envoy_types::pb::envoy::config::listener::v3::filter::ConfigType::TypedConfig(
                        Any { type_url: HCM_TYPE_URL.to_string(), value: hcm.encode_to_vec() },
                    ),
                ),
            }],
            ..Default::default()
        }],
        ..Default::default()
    };

    Ok((envoy_listener, route_configuration))
}

fn router_http_filter() -> HttpFilter {
    HttpFilter {
        name: "envoy.filters.http.router".to_string(),
        is_optional: false,
        disabled: false,
        config_type: Some(HttpFilterConfigType::TypedConfig(Any {
            type_url: ROUTER_FILTER_TYPE_URL.to_string(),
            value: RouterFilter::default().encode_to_vec(),
        })),
    }
}

fn build_route(route: &ProxyRoute, registry: &PluginRegistry) -> crate::errors::Result<Route> {
    let action = if route.destinations.len() == 1 {
        RouteAction3::Route(RouteAction {
            cluster_specifier: Some(ClusterSpecifier::Cluster(
                route.destinations[0].upstream.cluster_name(),
            )),
            ..Default::default()
        })
    } else {
        let clusters = route
            .destinations
            .iter()
            .map(|destination| weighted_cluster_entry(destination, registry))
            .collect::<crate::errors::Result<_>>()?;
        RouteAction3::Route(RouteAction {
            cluster_specifier: Some(ClusterSpecifier::WeightedClusters(WeightedCluster {
                clusters,
                ..Default::default()
            })),
            ..Default::default()
        })
    };

    Ok(Route {
        name: route.name.clone(),
        r#match: Some(RouteMatch {
            path_specifier: Some(PathSpecifier::Prefix(route.path_prefix.clone())),
            ..Default::default()
        }),
        action: Some(action),
        ..Default::default()
    })
}

fn weighted_cluster_entry(
    destination: &WeightedDestination,
    registry: &PluginRegistry,
) -> crate::errors::Result<ClusterWeight> {
    let mut cluster_weight = ClusterWeight {
        name: destination.upstream.cluster_name(),
        weight: Some(UInt32Value { value: destination.weight }),
        ..Default::default()
    };

    for processor in registry.weighted_destination_processors() {
        processor.process_weighted_destination(destination, &mut cluster_weight)?;
    }

    Ok(cluster_weight)
}

/// One listener bound on the configured fallback address/port, responding
/// 500 to every request. Preloaded into the snapshot cache under the
/// fallback node key so a misconfigured/unidentified proxy still gets a
/// coherent (if unhelpful) configuration rather than nothing.
pub fn build_fallback_listener(address: &str, port: u16, status_code: u32) -> Listener {
    let filter = Filter {
        name: "envoy.filters.network.http_connection_manager".to_string(),
        config_type: Some(envoy_types::pb::envoy::config::listener::v3::filter::ConfigType::TypedConfig(
            Any {
                type_url: HCM_TYPE_URL.to_string(),
                value: fallback_http_connection_manager(status_code).encode_to_vec(),
            },
        )),
    };

    Listener {
        name: "fallback-listener".to_string(),
        address: Some(Address {
            address: Some(AddressKind::SocketAddress(SocketAddress {
                address: address.to_string(),
                port_specifier: Some(socket_address::PortSpecifier::PortValue(port as u32)),
                ..Default::default()
            })),
        }),
        filter_chains: vec![FilterChain { filters: vec![filter], ..Default::default() }],
        ..Default::default()
    }
}

fn fallback_http_connection_manager(status_code: u32) -> HttpConnectionManager {
    let route = Route {
        name: "fallback".to_string(),
        r#match: Some(RouteMatch {
            path_specifier: Some(PathSpecifier::Prefix(String::new())),
            ..Default::default()
        }),
        action: Some(RouteAction3::DirectResponse(DirectResponseAction {
            status: status_code,
            body: None,
        })),
        ..Default::default()
    };

    HttpConnectionManager {
        stat_prefix: "fallback".to_string(),
        route_specifier: Some(RouteSpecifier::RouteConfig(RouteConfiguration {
            name: "fallback-routes".to_string(),
            virtual_hosts: vec![VirtualHost {
                name: "fallback-vhost".to_string(),
                domains: vec!["*".to_string()],
                routes: vec![route],
                ..Default::default()
            }],
            ..Default::default()
        })),
        http_filters: vec![router_http_filter()],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServiceRegistrySpec, UpstreamKind, UpstreamRef};
    use std::collections::BTreeMap;

    fn upstream() -> Upstream {
        Upstream::new(
            UpstreamRef::new("payments", "orders-api"),
            UpstreamKind::ServiceRegistry(ServiceRegistrySpec {
                service_name: "orders".into(),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn cluster_is_eds_discovered_over_ads() {
        let registry = PluginRegistry::new();
        let cluster = build_cluster(&upstream(), &registry, false).unwrap();
        assert_eq!(cluster.name, "payments~orders-api");
        match cluster.cluster_discovery_type {
            Some(ClusterDiscoveryType::Type(t)) => assert_eq!(t, DiscoveryType::Eds as i32),
            other => panic!("expected EDS discovery type, got {other:?}"),
        }
    }

    #[test]
    fn cla_carries_one_lb_endpoint_per_resolved_endpoint() {
        let upstream_ref = UpstreamRef::new("payments", "orders-api");
        let endpoints = vec![DomainEndpoint {
            name: "10-0-0-1-orders-1-8080".into(),
            address: "10.0.0.1".parse().unwrap(),
            port: 8080,
            hostname: None,
            resource_version: "1".into(),
            labels: BTreeMap::new(),
            upstreams: vec![upstream_ref.clone()],
            health_check_hint: None,
            tls_hint: false,
        }];

        let cla = build_cluster_load_assignment(&upstream_ref, &endpoints);
        assert_eq!(cla.cluster_name, "payments~orders-api");
        assert_eq!(cla.endpoints[0].lb_endpoints.len(), 1);
    }

    #[test]
    fn single_destination_route_uses_plain_cluster_specifier() {
        let route = ProxyRoute {
            name: "default".into(),
            path_prefix: "/".into(),
            destinations: vec![WeightedDestination {
                upstream: UpstreamRef::new("payments", "orders-api"),
                weight: 100,
            }],
            early_transformation: false,
        };

        let built = build_route(&route, &PluginRegistry::new()).unwrap();
        match built.action {
            Some(RouteAction3::Route(RouteAction {
                cluster_specifier: Some(ClusterSpecifier::Cluster(name)),
                ..
            })) => assert_eq!(name, "payments~orders-api"),
            other => panic!("expected plain cluster specifier, got {other:?}"),
        }
    }

    #[test]
    fn multi_destination_route_uses_weighted_clusters() {
        let route = ProxyRoute {
            name: "canary".into(),
            path_prefix: "/".into(),
            destinations: vec![
                WeightedDestination { upstream: UpstreamRef::new("payments", "stable"), weight: 90 },
                WeightedDestination { upstream: UpstreamRef::new("payments", "canary"), weight: 10 },
            ],
            early_transformation: false,
        };

        let built = build_route(&route, &PluginRegistry::new()).unwrap();
        match built.action {
            Some(RouteAction3::Route(RouteAction {
                cluster_specifier: Some(ClusterSpecifier::WeightedClusters(wc)),
                ..
            })) => assert_eq!(wc.clusters.len(), 2),
            other => panic!("expected weighted clusters, got {other:?}"),
        }
    }

    #[test]
    fn fallback_listener_responds_with_configured_status() {
        let listener = build_fallback_listener("::", 19000, 500);
        assert_eq!(listener.name, "fallback-listener");
        assert_eq!(listener.filter_chains.len(), 1);
    }

    struct TaggingWeightedDestinationPlugin;

    impl crate::plugins::Plugin for TaggingWeightedDestinationPlugin {
        fn name(&self) -> &str {
            "tagging-weighted-destination"
        }

        fn weighted_destination_processor(
            &self,
        ) -> Option<&dyn crate::plugins::WeightedDestinationProcessor> {
            Some(self)
        }
    }

    impl crate::plugins::WeightedDestinationProcessor for TaggingWeightedDestinationPlugin {
        fn process_weighted_destination(
            &self,
            _destination: &WeightedDestination,
            cluster_weight: &mut ClusterWeight,
        ) -> crate::errors::Result<()> {
            cluster_weight.name = format!("{}-tagged", cluster_weight.name);
            Ok(())
        }
    }

    #[test]
    fn weighted_destination_processor_runs_per_cluster_weight_entry() {
        let mut registry = PluginRegistry::new();
        registry.register(std::sync::Arc::new(TaggingWeightedDestinationPlugin));

        let route = ProxyRoute {
            name: "canary".into(),
            path_prefix: "/".into(),
            destinations: vec![
                WeightedDestination { upstream: UpstreamRef::new("payments", "stable"), weight: 90 },
                WeightedDestination { upstream: UpstreamRef::new("payments", "canary"), weight: 10 },
            ],
            early_transformation: false,
        };

        let built = build_route(&route, &registry).unwrap();
        match built.action {
            Some(RouteAction3::Route(RouteAction {
                cluster_specifier: Some(ClusterSpecifier::WeightedClusters(wc)),
                ..
            })) => {
                assert!(wc.clusters.iter().all(|c| c.name.ends_with("-tagged")));
            }
            other => panic!("expected weighted clusters, got {other:?}"),
        }
    }
}
