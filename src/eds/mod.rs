//! Endpoint Discovery for the service-registry backend (EDS).
//!
//! Watches the catalog for a set of tracked, service-registry-kind upstreams
//! across multiple data centers. On every catalog change it refreshes every
//! tracked `(service, datacenter)` pair in parallel, resolves hostname
//! addresses through a [`crate::dns::DnsResolver`], and emits a sorted,
//! label-tagged endpoint batch. A DNS poll tick catches hostname changes that
//! don't surface as catalog changes.

pub mod catalog;
mod labels;

pub use catalog::{CatalogClient, InMemoryCatalogClient};

use crate::domain::{CatalogService, Endpoint, Upstream, UpstreamRef};
use crate::dns::DnsResolver;
use crate::errors::Error;
use crate::store::SharedResourceStore;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Thread-safe accumulator for one refresh generation's catalog results.
/// Only appended to during the generation that owns it; a new generation
/// starts with a fresh collector.
#[derive(Default)]
pub struct SpecCollector {
    items: Mutex<Vec<CatalogService>>,
}

impl SpecCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, mut batch: Vec<CatalogService>) {
        self.items.lock().expect("spec collector lock poisoned").append(&mut batch);
    }

    pub fn get(&self) -> Vec<CatalogService> {
        self.items.lock().expect("spec collector lock poisoned").clone()
    }
}

/// Default DNS poll tick, per the spec.
pub const DEFAULT_DNS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Watches one write namespace's tracked service-registry upstreams.
pub struct ServiceRegistryWatcher {
    tracked: Vec<Upstream>,
    catalog: Arc<dyn CatalogClient>,
    resolver: Arc<dyn DnsResolver>,
    store: SharedResourceStore,
    dns_poll_interval: Duration,
}

impl ServiceRegistryWatcher {
    /// Only service-registry-kind upstreams are retained; others are ignored,
    /// per the spec.
    pub fn new(
        tracked: Vec<Upstream>,
        catalog: Arc<dyn CatalogClient>,
        resolver: Arc<dyn DnsResolver>,
        store: SharedResourceStore,
    ) -> Self {
        let tracked: Vec<Upstream> =
            tracked.into_iter().filter(|u| u.as_service_registry().is_some()).collect();
        Self { tracked, catalog, resolver, store, dns_poll_interval: DEFAULT_DNS_POLL_INTERVAL }
    }

    pub fn with_dns_poll_interval(mut self, interval: Duration) -> Self {
        self.dns_poll_interval = interval;
        self
    }

    /// Group tracked upstreams by service name.
    fn upstreams_by_service(&self) -> BTreeMap<String, Vec<Upstream>> {
        let mut grouped: BTreeMap<String, Vec<Upstream>> = BTreeMap::new();
        for upstream in &self.tracked {
            if let Some(spec) = upstream.as_service_registry() {
                grouped.entry(spec.service_name.clone()).or_default().push(upstream.clone());
            }
        }
        grouped
    }

    /// Start the watcher's main loop as a background task. Setup is
    /// synchronous up to and including the first catalog probe being
    /// scheduled; the returned receivers then carry every subsequent batch.
    #[instrument(skip(self, cancel), fields(tracked = self.tracked.len()))]
    pub async fn spawn(
        self,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<Vec<Endpoint>>, mpsc::Receiver<Error>) {
        let (endpoint_tx, endpoint_rx) = mpsc::channel(16);
        let (err_tx, err_rx) = mpsc::channel(16);

        let upstreams_by_service = self.upstreams_by_service();
        let tracked_refs: Vec<UpstreamRef> =
            self.tracked.iter().map(|u| u.reference.clone()).collect();

        let datacenters = match self.catalog.datacenters().await {
            Ok(dcs) => dcs,
            Err(e) => {
                let _ = err_tx.send(e).await;
                return (endpoint_rx, err_rx);
            }
        };

        let catalog = self.catalog.clone();
        let resolver = self.resolver.clone();
        let store = self.store.clone();
        let dns_poll_interval = self.dns_poll_interval;

        tokio::spawn(async move {
            run_watch_loop(
                cancel,
                upstreams_by_service,
                tracked_refs,
                datacenters,
                catalog,
                resolver,
                store,
                dns_poll_interval,
                endpoint_tx,
                err_tx,
            )
            .await;
        });

        (endpoint_rx, err_rx)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_watch_loop(
    cancel: CancellationToken,
    upstreams_by_service: BTreeMap<String, Vec<Upstream>>,
    tracked_refs: Vec<UpstreamRef>,
    datacenters: Vec<String>,
    catalog: Arc<dyn CatalogClient>,
    resolver: Arc<dyn DnsResolver>,
    store: SharedResourceStore,
    dns_poll_interval: Duration,
    endpoint_tx: mpsc::Sender<Vec<Endpoint>>,
    err_tx: mpsc::Sender<Error>,
) {
    let (mut meta_rx, mut catalog_err_rx) = catalog.watch_services(cancel.child_token(), datacenters);

    let mut previous_specs: Vec<CatalogService> = Vec::new();
    let mut previous_hash: Option<u64> = None;
    let mut refresh_cancel = cancel.child_token();
    let mut ticker = tokio::time::interval(dns_poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("EDS watcher cancelled, draining");
                break;
            }

            meta = meta_rx.recv() => {
                let Some(()) = meta else {
                    debug!("catalog watch closed, stopping EDS watcher");
                    break;
                };

                refresh_cancel.cancel();
                refresh_cancel = cancel.child_token();

                let (specs, first_err) =
                    refresh_all(&upstreams_by_service, &catalog, &refresh_cancel).await;
                if let Some(e) = first_err {
                    let _ = err_tx.try_send(e);
                }

                let endpoints =
                    build_endpoints(&upstreams_by_service, &specs, &*resolver, &refresh_cancel).await;
                previous_hash = Some(hash_endpoints(&endpoints));
                previous_specs = specs;

                if !cancel.is_cancelled() {
                    publish_to_store(&store, &tracked_refs, &endpoints).await;
                    let _ = endpoint_tx.try_send(endpoints);
                }
            }

            Some(e) = catalog_err_rx.recv() => {
                let _ = err_tx.try_send(e);
            }

            _ = ticker.tick() => {
                if previous_specs.is_empty() {
                    continue;
                }
                let endpoints = build_endpoints(
                    &upstreams_by_service,
                    &previous_specs,
                    &*resolver,
                    &cancel.child_token(),
                )
                .await;
                let new_hash = hash_endpoints(&endpoints);
                if Some(new_hash) == previous_hash {
                    continue;
                }
                previous_hash = Some(new_hash);

                if !cancel.is_cancelled() {
                    publish_to_store(&store, &tracked_refs, &endpoints).await;
                    let _ = endpoint_tx.try_send(endpoints);
                }
            }
        }
    }
}

/// Fan out one backend query per `(service, datacenter)` pair, bounded by the
/// number of pairs, and join before returning. On any individual error, only
/// the first is returned — the accumulated successful subset is still
/// published.
async fn refresh_all(
    upstreams_by_service: &BTreeMap<String, Vec<Upstream>>,
    catalog: &Arc<dyn CatalogClient>,
    cancel: &CancellationToken,
) -> (Vec<CatalogService>, Option<Error>) {
    let collector = Arc::new(SpecCollector::new());
    let mut set: JoinSet<Result<Vec<CatalogService>, Error>> = JoinSet::new();

    for (service_name, dcs) in per_service_datacenters(upstreams_by_service) {
        for dc in dcs {
            let catalog = catalog.clone();
            let cancel = cancel.clone();
            let service_name = service_name.clone();
            set.spawn(async move { catalog.service(&cancel, &service_name, &dc).await });
        }
    }

    let mut first_err = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(specs)) => collector.add(specs),
            Ok(Err(e)) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
            Err(join_err) => {
                if first_err.is_none() {
                    first_err = Some(Error::internal(format!("refresh task panicked: {join_err}")));
                }
            }
        }
    }

    (collector.get(), first_err)
}

/// Each tracked upstream names its own data-center list; a `(service, dc)`
/// pair is queried for every dc any upstream tracking that service names.
fn per_service_datacenters(
    upstreams_by_service: &BTreeMap<String, Vec<Upstream>>,
) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    for (service_name, upstreams) in upstreams_by_service {
        let mut dcs: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for upstream in upstreams {
            if let Some(spec) = upstream.as_service_registry() {
                dcs.extend(spec.data_centers.iter().cloned());
            }
        }
        out.insert(service_name.clone(), dcs.into_iter().collect());
    }
    out
}

/// Builds the sorted, labeled endpoint batch for one refresh generation. A
/// service whose address fails to resolve is logged and skipped rather than
/// aborting the whole batch.
async fn build_endpoints(
    upstreams_by_service: &BTreeMap<String, Vec<Upstream>>,
    specs: &[CatalogService],
    resolver: &dyn DnsResolver,
    cancel: &CancellationToken,
) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();

    for service in specs {
        let upstreams = match upstreams_by_service.get(&service.service_name) {
            Some(u) => u,
            None => continue,
        };

        let address = service.effective_address();
        let ips: Vec<(IpAddr, Option<String>)> = match address.parse::<IpAddr>() {
            Ok(ip) => vec![(ip, None)],
            Err(_) => match resolver.resolve(cancel, address).await {
                Ok(resolved) => {
                    resolved.into_iter().map(|ip| (ip, Some(address.to_string()))).collect()
                }
                Err(e) => {
                    warn!(
                        service = %service.service_name,
                        instance = %service.instance_id,
                        address,
                        error = %e,
                        "failed to resolve service address, skipping instance"
                    );
                    continue;
                }
            },
        };

        let (tag_labels, dc_labels) = labels::build_labels(upstreams, service);
        let referenced: Vec<UpstreamRef> = upstreams
            .iter()
            .filter(|u| {
                u.as_service_registry()
                    .map(|spec| spec.instance_tags.is_subset(&service.tags))
                    .unwrap_or(false)
            })
            .map(|u| u.reference.clone())
            .collect();

        for (ip, hostname) in ips {
            let mut labels = tag_labels.clone();
            labels.extend(dc_labels.clone());

            let name = crate::domain::endpoint::sanitize_resource_name(&format!(
                "{ip}-{}-{}-{}",
                service.service_name, service.instance_id, service.port
            ));

            endpoints.push(Endpoint {
                name,
                address: ip,
                port: service.port,
                hostname: hostname.clone(),
                resource_version: service.modify_index.to_string(),
                labels,
                upstreams: referenced.clone(),
                health_check_hint: None,
                tls_hint: service.port == 443,
            });
        }
    }

    endpoints.sort_by(|a, b| a.name.cmp(&b.name));
    endpoints
}

fn hash_endpoints(endpoints: &[Endpoint]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for endpoint in endpoints {
        endpoint.name.hash(&mut hasher);
        endpoint.address.hash(&mut hasher);
        endpoint.port.hash(&mut hasher);
        endpoint.hostname.hash(&mut hasher);
        endpoint.resource_version.hash(&mut hasher);
        for (k, v) in &endpoint.labels {
            k.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        endpoint.tls_hint.hash(&mut hasher);
    }
    hasher.finish()
}

async fn publish_to_store(store: &SharedResourceStore, tracked: &[UpstreamRef], endpoints: &[Endpoint]) {
    for upstream_ref in tracked {
        let matching: Vec<Endpoint> =
            endpoints.iter().filter(|e| e.references(upstream_ref)).cloned().collect();
        if let Err(e) = store.set_endpoints(upstream_ref.clone(), matching).await {
            info!(upstream = %upstream_ref, error = %e, "failed to publish endpoints to resource store");
        }
    }
}
