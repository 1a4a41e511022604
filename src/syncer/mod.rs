//! Translator syncer: orchestrates translate → sanitize → publish → report
//! for every declared proxy, plus any extension syncers, and garbage-collects
//! snapshot-cache entries that no longer correspond to anything declared.
//! Grounded in `translator_syncer.go`'s `Sync`.

use crate::domain::Report;
use crate::errors::{Error, Result};
use crate::plugins::PluginRegistry;
use crate::sanitizer::SanitizerChain;
use crate::store::{ApiSnapshot, SharedResourceStore};
use crate::translator::Translator;
use crate::xds::cache::SnapshotCache;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A syncer for a resource kind outside the proxy/upstream/listener model
/// (e.g. secrets, auth configs) that still needs to publish into the shared
/// snapshot cache and participate in key garbage collection.
pub trait ExtensionSyncer: Send + Sync {
    /// Run this extension's sync against the current declarative snapshot,
    /// returning the node key it published under.
    fn sync(&self, declared: &ApiSnapshot) -> Result<String>;
}

/// Aggregates heterogeneous per-proxy/per-extension failures without
/// hiding earlier ones, matching the original's use of
/// `hashicorp/go-multierror` in `translator_syncer.go`. The one place in the
/// crate that reaches for `anyhow` over `thiserror` — aggregation of
/// unrelated causes, not a single typed failure.
#[derive(Debug, Default)]
pub struct MultiError(pub Vec<anyhow::Error>);

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        write!(f, "{joined}")
    }
}

impl MultiError {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Attribution written alongside every report, matching `reportedBy` in the
/// original.
const REPORTED_BY: &str = "translator-syncer";

pub struct TranslatorSyncer {
    store: SharedResourceStore,
    cache: Arc<SnapshotCache>,
    registry: PluginRegistry,
    sanitizers: SanitizerChain,
    extension_syncers: Vec<Box<dyn ExtensionSyncer>>,
}

impl TranslatorSyncer {
    pub fn new(
        store: SharedResourceStore,
        cache: Arc<SnapshotCache>,
        registry: PluginRegistry,
        sanitizers: SanitizerChain,
    ) -> Self {
        Self { store, cache, registry, sanitizers, extension_syncers: Vec::new() }
    }

    pub fn with_extension_syncer(mut self, syncer: Box<dyn ExtensionSyncer>) -> Self {
        self.extension_syncers.push(syncer);
        self
    }

    /// Translate, sanitize, publish, and report for every declared proxy,
    /// then garbage-collect stale cache keys. Returns a combined error if any
    /// proxy or extension sync failed, but every other proxy still runs to
    /// completion — one bad upstream never blocks the rest of the fleet.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<()> {
        let declared = self.store.get_snapshot_input().await?;
        let translator = Translator::new(&self.registry);
        let mut errors = Vec::new();
        let mut proxy_keys = BTreeSet::new();

        for proxy in &declared.proxies {
            let node_key = proxy.node_key();
            proxy_keys.insert(node_key.clone());

            if let Err(e) = self.sync_one_proxy(&declared, &translator, &node_key).await {
                warn!(node_key = %node_key, error = %e, "proxy sync failed");
                errors.push(anyhow::anyhow!("proxy {node_key}: {e}"));
            }
        }

        let mut extension_keys = BTreeSet::new();
        for extension in &self.extension_syncers {
            match extension.sync(&declared) {
                Ok(key) => {
                    extension_keys.insert(key);
                }
                Err(e) => errors.push(anyhow::anyhow!("extension syncer failed: {e}")),
            }
        }

        let valid: BTreeSet<&String> = proxy_keys.iter().chain(extension_keys.iter()).collect();
        for key in self.cache.keys() {
            if !valid.contains(&key) {
                info!(node_key = %key, "clearing stale snapshot cache entry");
                self.cache.clear(&key);
            }
        }

        let combined = MultiError(errors);
        if combined.is_empty() {
            Ok(())
        } else {
            Err(Error::internal(combined.to_string()))
        }
    }

    async fn sync_one_proxy(
        &self,
        declared: &ApiSnapshot,
        translator: &Translator<'_>,
        node_key: &str,
    ) -> Result<()> {
        let proxy = declared
            .proxies
            .iter()
            .find(|p| p.node_key() == node_key)
            .expect("node_key derived from this proxy list");

        let translation = translator.translate(declared, proxy);
        let mut reports = translation.reports;

        if !translation.proxy_report.errors.is_empty() {
            // Fatal translator error: abort the sync for this proxy only,
            // leaving its previously published snapshot (if any) untouched.
            reports.insert(node_key.to_string(), translation.proxy_report.clone());
            self.store.write_report(node_key, REPORTED_BY, reports).await?;
            return Err(Error::translation_for(
                translation.proxy_report.errors.join("; "),
                node_key.to_string(),
            ));
        }

        let snapshot =
            match self.sanitizers.sanitize(declared, translation.snapshot.clone(), &mut reports) {
                Ok(sanitized) => sanitized,
                Err(e) => {
                    warn!(node_key = %node_key, error = %e, "sanitizer rejected snapshot, falling back to previous listeners/routes");
                    let previous = self.cache.get(node_key);
                    let mut fallback = translation.snapshot;
                    fallback.listeners = previous.listeners.clone();
                    fallback.routes = previous.routes.clone();
                    let mut proxy_report = Report::default();
                    proxy_report.add_warning(format!("sanitizer rejected publish: {e}"));
                    reports.insert(node_key.to_string(), proxy_report);
                    fallback
                }
            };

        self.cache.set(node_key, snapshot);
        self.store.write_report(node_key, REPORTED_BY, reports).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Proxy, ProxyListener, ProxyRef, ProxyRoute, ServiceRegistrySpec, Upstream, UpstreamKind,
        UpstreamRef, WeightedDestination,
    };
    use crate::sanitizer::UpstreamRemovingSanitizer;
    use crate::store::InMemoryResourceStore;

    fn proxy() -> Proxy {
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

    fn upstream() -> Upstream {
        Upstream::new(
            UpstreamRef::new("payments", "orders-api"),
            UpstreamKind::ServiceRegistry(ServiceRegistrySpec {
                service_name: "orders".into(),
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn sync_publishes_snapshot_and_writes_report() {
        let store: SharedResourceStore =
            Arc::new(InMemoryResourceStore::with_resources(vec![proxy()], vec![upstream()]));
        let cache = Arc::new(SnapshotCache::new());
        let syncer = TranslatorSyncer::new(
            store.clone(),
            cache.clone(),
            PluginRegistry::new(),
            SanitizerChain::new().push(Box::new(UpstreamRemovingSanitizer)),
        );

        syncer.sync().await.unwrap();

        let published = cache.get("payments~edge-1");
        assert!(published.clusters.contains_key("payments~orders-api"));
    }

    #[tokio::test]
    async fn gc_clears_keys_for_removed_proxies() {
        let store = Arc::new(InMemoryResourceStore::with_resources(vec![proxy()], vec![upstream()]));
        let cache = Arc::new(SnapshotCache::new());
        cache.set("stale~gone", crate::domain::XdsSnapshot::default());

        let syncer = TranslatorSyncer::new(
            store.clone() as SharedResourceStore,
            cache.clone(),
            PluginRegistry::new(),
            SanitizerChain::new(),
        );

        syncer.sync().await.unwrap();

        assert!(!cache.keys().contains(&"stale~gone".to_string()));
        assert!(cache.keys().contains(&"payments~edge-1".to_string()));
    }

    struct RejectingSanitizer;
    impl crate::sanitizer::XdsSanitizer for RejectingSanitizer {
        fn sanitize(
            &self,
            _declared: &ApiSnapshot,
            _snapshot: crate::domain::XdsSnapshot,
            _reports: &mut crate::domain::ReportSet,
        ) -> Result<crate::domain::XdsSnapshot> {
            Err(Error::sanitizer("deliberately rejecting"))
        }
    }

    #[tokio::test]
    async fn sanitizer_failure_falls_back_to_previous_listeners_and_routes() {
        let store: SharedResourceStore =
            Arc::new(InMemoryResourceStore::with_resources(vec![proxy()], vec![upstream()]));
        let cache = Arc::new(SnapshotCache::new());

        // First sync publishes normally, establishing listener L1/route for the node.
        let good_syncer = TranslatorSyncer::new(
            store.clone(),
            cache.clone(),
            PluginRegistry::new(),
            SanitizerChain::new(),
        );
        good_syncer.sync().await.unwrap();
        let previous = cache.get("payments~edge-1");
        assert!(previous.listeners.contains_key("http"));
        assert!(previous.clusters.contains_key("payments~orders-api"));

        // Second sync's sanitizer rejects; listeners/routes must fall back to
        // the previous publish while clusters/endpoints from this run stay.
        let rejecting_syncer = TranslatorSyncer::new(
            store.clone(),
            cache.clone(),
            PluginRegistry::new(),
            SanitizerChain::new().push(Box::new(RejectingSanitizer)),
        );
        rejecting_syncer.sync().await.unwrap();

        let after = cache.get("payments~edge-1");
        assert!(after.listeners.contains_key("http"), "fallback listener must be preserved");
        assert!(after.routes.contains_key("http-routes"), "fallback route must be preserved");
        assert!(
            after.clusters.contains_key("payments~orders-api"),
            "clusters from the rejected run are still retained"
        );
    }

    struct FailingExtensionSyncer;
    impl ExtensionSyncer for FailingExtensionSyncer {
        fn sync(&self, _declared: &ApiSnapshot) -> Result<String> {
            Err(Error::internal("extension boom"))
        }
    }

    #[tokio::test]
    async fn extension_syncer_failure_is_aggregated_but_proxies_still_sync() {
        let store = Arc::new(InMemoryResourceStore::with_resources(vec![proxy()], vec![upstream()]));
        let cache = Arc::new(SnapshotCache::new());
        let syncer = TranslatorSyncer::new(
            store.clone() as SharedResourceStore,
            cache.clone(),
            PluginRegistry::new(),
            SanitizerChain::new(),
        )
        .with_extension_syncer(Box::new(FailingExtensionSyncer));

        let result = syncer.sync().await;
        assert!(result.is_err());
        // the proxy sync itself still completed despite the extension failure
        assert!(cache.get("payments~edge-1").clusters.contains_key("payments~orders-api"));
    }
}
