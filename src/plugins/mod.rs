//! Plugin capability model.
//!
//! A plugin is polymorphic over a capability set — upstream, route,
//! virtual-host, and weighted-destination processors, plus an HTTP filter
//! provider — mirroring the teacher's `xds/filters/mod.rs` split between
//! typed configuration and wire `Any`, generalized from concrete filter
//! structs into a trait a caller can implement once per cross-cutting
//! concern (auth, rate limiting, header mutation, ...).

pub mod tls;

use crate::domain::{ProxyListener, ProxyRoute, Upstream, WeightedDestination};
use crate::errors::Result;
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::route::v3::weighted_cluster::ClusterWeight;
use envoy_types::pb::envoy::config::route::v3::{Route as EnvoyRoute, VirtualHost};
use envoy_types::pb::google::protobuf::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Named points in the HTTP filter chain a plugin's filter can be ordered
/// relative to. Declaration order is the tiebreak within the same `Stage`
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WellKnownFilterStage {
    Fault,
    Cors,
    Route,
    AuthZ,
    RateLimit,
}

/// Total order over filter placement: `Before` < `During` < `After` for a
/// given stage, with ties broken by the wrapped [`WellKnownFilterStage`]'s
/// own declaration order. Never derived from map iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Before(WellKnownFilterStage),
    During(WellKnownFilterStage),
    After(WellKnownFilterStage),
}

/// An HTTP filter a plugin wants attached to the owning listener's HTTP
/// connection manager.
#[derive(Debug, Clone)]
pub struct HttpFilterSpec {
    pub name: String,
    pub stage: Stage,
    pub typed_config: Any,
}

/// Mutates one upstream's generated `Cluster` before it's added to the
/// snapshot. `tls_hint` is true when either the upstream's own spec requests
/// TLS (`use_tls`) or any endpoint currently resolved for it was discovered
/// on port 443 — the translator computes this from the live endpoint list so
/// a processor never has to reach for process-wide state to answer it.
pub trait UpstreamProcessor: Send + Sync {
    fn process_upstream(&self, upstream: &Upstream, cluster: &mut Cluster, tls_hint: bool) -> Result<()>;
}

/// Mutates one route's generated envoy `Route`.
pub trait RouteProcessor: Send + Sync {
    fn process_route(&self, route: &ProxyRoute, envoy_route: &mut EnvoyRoute) -> Result<()>;
}

/// Mutates one listener's generated `VirtualHost`.
pub trait VirtualHostProcessor: Send + Sync {
    fn process_virtual_host(&self, listener: &ProxyListener, vhost: &mut VirtualHost) -> Result<()>;
}

/// Mutates one weighted destination's generated `ClusterWeight` entry.
pub trait WeightedDestinationProcessor: Send + Sync {
    fn process_weighted_destination(
        &self,
        destination: &WeightedDestination,
        cluster_weight: &mut ClusterWeight,
    ) -> Result<()>;
}

/// A registrable cross-cutting concern. All capability methods are optional;
/// a plugin implements only the ones it needs. `http_filters` is the one
/// required method — even a plugin that contributes no processors can still
/// install a filter (e.g. a pure observability filter).
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn upstream_processor(&self) -> Option<&dyn UpstreamProcessor> {
        None
    }

    fn route_processor(&self) -> Option<&dyn RouteProcessor> {
        None
    }

    fn virtual_host_processor(&self) -> Option<&dyn VirtualHostProcessor> {
        None
    }

    fn weighted_destination_processor(&self) -> Option<&dyn WeightedDestinationProcessor> {
        None
    }

    /// HTTP filters this plugin contributes for the current listener.
    /// `early` is set when some route or vhost on that listener carries an
    /// early transformation flag, letting a plugin install its early-stage
    /// filter only where it's actually needed.
    fn http_filters(&self, _early: bool) -> Vec<HttpFilterSpec> {
        Vec::new()
    }
}

struct RegisteredPlugin {
    order: u32,
    plugin: Arc<dyn Plugin>,
}

/// Ordered collection of plugins. Registration order is preserved and used
/// as the tiebreak wherever stage order alone doesn't disambiguate.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        let order = self.plugins.len() as u32;
        self.plugins.push(RegisteredPlugin { order, plugin });
    }

    pub fn upstream_processors(&self) -> impl Iterator<Item = &dyn UpstreamProcessor> {
        self.plugins.iter().filter_map(|r| r.plugin.upstream_processor())
    }

    pub fn route_processors(&self) -> impl Iterator<Item = &dyn RouteProcessor> {
        self.plugins.iter().filter_map(|r| r.plugin.route_processor())
    }

    pub fn virtual_host_processors(&self) -> impl Iterator<Item = &dyn VirtualHostProcessor> {
        self.plugins.iter().filter_map(|r| r.plugin.virtual_host_processor())
    }

    pub fn weighted_destination_processors(
        &self,
    ) -> impl Iterator<Item = &dyn WeightedDestinationProcessor> {
        self.plugins.iter().filter_map(|r| r.plugin.weighted_destination_processor())
    }

    /// Every plugin's HTTP filters for this listener, ordered by stage then
    /// registration order, deduplicated by `(name, stage, typed_config)`.
    pub fn http_filters(&self, early: bool) -> Vec<HttpFilterSpec> {
        let mut collected: Vec<(u32, HttpFilterSpec)> = self
            .plugins
            .iter()
            .flat_map(|r| r.plugin.http_filters(early).into_iter().map(move |spec| (r.order, spec)))
            .collect();
        collected.sort_by(|a, b| a.1.stage.cmp(&b.1.stage).then(a.0.cmp(&b.0)));

        let mut seen = BTreeSet::new();
        collected
            .into_iter()
            .filter_map(|(_, spec)| {
                let key = (spec.name.clone(), spec.stage, spec.typed_config.value.clone());
                seen.insert(key).then_some(spec)
            })
            .collect()
    }
}
