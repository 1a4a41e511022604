//! Application bootstrap.
//!
//! Loads configuration, initializes observability, and wires the resource
//! store, EDS watcher, translator syncer, and xDS server together into one
//! running control plane. `main.rs` is a thin `#[tokio::main]` wrapper around
//! [`run`].

use crate::config::{load_config_from_env, load_config_from_file, AppConfig};
use crate::dns::SystemDnsResolver;
use crate::domain::XdsSnapshot;
use crate::eds::catalog::InMemoryCatalogClient;
use crate::eds::{CatalogClient, ServiceRegistryWatcher};
use crate::errors::Result;
use crate::observability::health::EdsWatcherHealthProvider;
use crate::observability::metrics::SystemMetricsCollector;
use crate::observability::{init_observability, log_config_info};
use crate::plugins::{tls::TlsUpstreamProcessor, PluginRegistry};
use crate::sanitizer::{SanitizerChain, UpstreamRemovingSanitizer};
use crate::store::{InMemoryResourceStore, ResourceStore, SharedResourceStore};
use crate::syncer::TranslatorSyncer;
use crate::translator::resources::build_fallback_listener;
use crate::xds::cache::SnapshotCache;
use crate::xds::{start_server, FALLBACK_NODE_KEY};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Status code the fallback listener answers every request with. A hard
/// contract per the specification — never configurable, unlike the
/// fallback address/port.
const FALLBACK_STATUS_CODE: u32 = 500;

/// Load configuration from an optional file path, falling back to env vars
/// and defaults alone.
pub fn load_config<P: AsRef<Path>>(config_path: Option<P>) -> Result<AppConfig> {
    match config_path {
        Some(path) => load_config_from_file(path),
        None => load_config_from_env(),
    }
}

/// Run the control plane until `shutdown` resolves (typically ctrl-c).
pub async fn run(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    let (health_checker, tracer_provider) = init_observability(&config.observability).await?;
    log_config_info(&config);

    let store: SharedResourceStore = Arc::new(InMemoryResourceStore::new());

    let last_eds_error = Arc::new(RwLock::new(None));
    health_checker
        .register_provider(
            "eds_watcher",
            Box::new(EdsWatcherHealthProvider::new(last_eds_error.clone())),
        )
        .await;

    let cache = Arc::new(SnapshotCache::new());
    preload_fallback_snapshot(&cache, &config);

    spawn_eds_watcher(&config, store.clone(), last_eds_error, shutdown.child_token()).await?;
    spawn_sync_loop(store.clone(), cache.clone(), shutdown.child_token());
    spawn_system_metrics_collector(shutdown.child_token());

    let server_shutdown = shutdown.clone();
    let xds_config = config.xds.clone();
    let server_cache = cache.clone();
    tokio::spawn(async move {
        if let Err(e) = start_server(&xds_config, server_cache, async move {
            server_shutdown.cancelled().await;
        })
        .await
        {
            error!(error = %e, "xDS server exited with an error");
        }
    });

    shutdown.cancelled().await;
    info!("shutdown signal received, draining");

    if let Some(provider) = tracer_provider {
        crate::observability::shutdown_tracing(provider);
    }

    Ok(())
}

/// Preload the FALLBACK snapshot so an unidentified or misconfigured proxy
/// gets a coherent configuration instead of an empty one on its first
/// request.
fn preload_fallback_snapshot(cache: &Arc<SnapshotCache>, config: &AppConfig) {
    let listener = build_fallback_listener(
        &config.xds.fallback_address,
        config.xds.fallback_port,
        FALLBACK_STATUS_CODE,
    );

    let mut snapshot = XdsSnapshot::default();
    snapshot.listeners.insert(listener.name.clone(), listener);
    cache.set(FALLBACK_NODE_KEY, snapshot);
}

/// Start the EDS watcher against the configured service-registry backend.
///
/// No production catalog backend client exists yet in this crate (the
/// specification treats the backend as an external collaborator); the
/// in-memory reference double stands in until one is implemented against
/// `config.catalog.address`.
async fn spawn_eds_watcher(
    config: &AppConfig,
    store: SharedResourceStore,
    last_error: Arc<RwLock<Option<String>>>,
    cancel: CancellationToken,
) -> Result<()> {
    let tracked = store.list_upstreams().await?;
    let catalog: Arc<dyn CatalogClient> = Arc::new(InMemoryCatalogClient::new(Vec::new()));
    let resolver = Arc::new(SystemDnsResolver);

    let watcher = ServiceRegistryWatcher::new(tracked, catalog, resolver, store)
        .with_dns_poll_interval(config.catalog.dns_poll_interval());

    let (mut endpoint_rx, mut err_rx) = watcher.spawn(cancel).await;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(batch) = endpoint_rx.recv() => {
                    info!(endpoint_count = batch.len(), "EDS watcher published an endpoint batch");
                    *last_error.write().await = None;
                }
                Some(e) = err_rx.recv() => {
                    warn!(error = %e, "EDS watcher reported an error");
                    *last_error.write().await = Some(e.to_string());
                }
                else => break,
            }
        }
    });

    Ok(())
}

/// Periodically refresh the uptime gauge until cancelled.
fn spawn_system_metrics_collector(cancel: CancellationToken) {
    let collector = SystemMetricsCollector::new();
    tokio::spawn(async move {
        tokio::select! {
            _ = collector.start(Duration::from_secs(15)) => {}
            _ = cancel.cancelled() => {}
        }
    });
}

/// Drive the translator syncer: resync whenever the resource store changes
/// or the EDS watcher republishes endpoints, until cancelled.
fn spawn_sync_loop(store: SharedResourceStore, cache: Arc<SnapshotCache>, cancel: CancellationToken) {
    let mut changes = store.watch();
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(TlsUpstreamProcessor));
    let sanitizers = SanitizerChain::new().push(Box::new(UpstreamRemovingSanitizer));
    let syncer = TranslatorSyncer::new(store, cache, registry, sanitizers);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = changes.recv() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let started = Instant::now();
            let result = syncer.sync().await;
            let elapsed = started.elapsed().as_secs_f64();
            let error_count = usize::from(result.is_err());
            crate::observability::metrics::record_sync_duration(elapsed, error_count).await;

            if let Err(e) = result {
                warn!(error = %e, "translator syncer reported errors for one or more proxies");
            }
        }
    });
}
