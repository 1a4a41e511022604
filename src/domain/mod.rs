//! Domain layer
//!
//! Pure domain entities for the gateway control plane, with zero infrastructure
//! dependencies. These types describe upstreams, resolved endpoints, proxies,
//! the per-node xDS snapshot, and the report set the translator and sanitizers
//! write to — the vocabulary every other module (EDS watcher, translator,
//! sanitizer chain, syncer) is built against.

pub mod endpoint;
pub mod proxy;
pub mod report;
pub mod snapshot;
pub mod upstream;

pub use endpoint::{CatalogService, Endpoint, DC_LABEL_PREFIX, TAG_LABEL_PREFIX};
pub use proxy::{Proxy, ProxyListener, ProxyRef, ProxyRoute, WeightedDestination};
pub use report::{Report, ReportSet, ReportStatus};
pub use snapshot::XdsSnapshot;
pub use upstream::{
    AwsSpec, KubernetesSpec, ServiceRegistrySpec, StaticEndpoint, StaticSpec, Upstream,
    UpstreamKind, UpstreamRef, UpstreamSslConfig, UpstreamValidationError,
};
