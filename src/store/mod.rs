//! The declarative resource store.
//!
//! The specification treats the resource store as an external collaborator: a
//! typed key/value store with list/watch semantics holding proxies, upstreams,
//! endpoints, secrets, and their reports. This module models that contract as
//! a trait, [`ResourceStore`], so the translator syncer and EDS watcher can be
//! exercised against an in-memory double in tests while a real backend (etcd,
//! Kubernetes CRDs, Consul KV) implements the same trait in production.

use crate::domain::{Endpoint, Proxy, ReportSet, Upstream, UpstreamRef};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// The declarative snapshot of gateway resources handed to the translator:
/// every proxy and upstream currently known to the store, plus the live
/// endpoints the EDS watcher has resolved for each upstream so far.
#[derive(Debug, Clone, Default)]
pub struct ApiSnapshot {
    pub proxies: Vec<Proxy>,
    pub upstreams: Vec<Upstream>,
    pub endpoints: BTreeMap<UpstreamRef, Vec<Endpoint>>,
}

impl ApiSnapshot {
    pub fn endpoints_for(&self, upstream: &UpstreamRef) -> &[Endpoint] {
        self.endpoints.get(upstream).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// The external resource store contract.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// The current declarative snapshot: proxies, upstreams, and the latest
    /// endpoints resolved for each upstream.
    async fn get_snapshot_input(&self) -> Result<ApiSnapshot>;

    async fn list_upstreams(&self) -> Result<Vec<Upstream>>;

    async fn list_proxies(&self) -> Result<Vec<Proxy>>;

    /// Replace the endpoint list for one upstream. Called by the EDS watcher
    /// on every catalog change or DNS poll tick; old lists are replaced whole.
    async fn set_endpoints(&self, upstream: UpstreamRef, endpoints: Vec<Endpoint>) -> Result<()>;

    /// Write the translator/sanitizer report set for one node back to the
    /// store, attributed to `reported_by`.
    async fn write_report(&self, node_key: &str, reported_by: &str, reports: ReportSet)
        -> Result<()>;

    /// Subscribe to "something changed" notifications (proxy/upstream added,
    /// removed, or modified). Consumers re-read `get_snapshot_input` on
    /// receipt; the notification itself carries no payload.
    fn watch(&self) -> broadcast::Receiver<()>;
}

/// In-memory `ResourceStore`, the crate's reference collaborator: backs unit
/// and integration tests, and doubles as the shape a real backend would
/// implement against.
pub struct InMemoryResourceStore {
    inner: RwLock<InMemoryState>,
    change_tx: broadcast::Sender<()>,
}

#[derive(Default)]
struct InMemoryState {
    proxies: Vec<Proxy>,
    upstreams: Vec<Upstream>,
    endpoints: BTreeMap<UpstreamRef, Vec<Endpoint>>,
    reports: BTreeMap<String, (String, ReportSet)>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(128);
        Self { inner: RwLock::new(InMemoryState::default()), change_tx }
    }

    pub fn with_resources(proxies: Vec<Proxy>, upstreams: Vec<Upstream>) -> Self {
        let store = Self::new();
        {
            let mut state = store.inner.write().expect("resource store lock poisoned");
            state.proxies = proxies;
            state.upstreams = upstreams;
        }
        store
    }

    pub fn set_proxies(&self, proxies: Vec<Proxy>) {
        self.inner.write().expect("resource store lock poisoned").proxies = proxies;
        let _ = self.change_tx.send(());
    }

    pub fn set_upstreams(&self, upstreams: Vec<Upstream>) {
        self.inner.write().expect("resource store lock poisoned").upstreams = upstreams;
        let _ = self.change_tx.send(());
    }

    /// Read back a previously written report, for test assertions.
    pub fn report_for(&self, node_key: &str) -> Option<(String, ReportSet)> {
        self.inner.read().expect("resource store lock poisoned").reports.get(node_key).cloned()
    }
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get_snapshot_input(&self) -> Result<ApiSnapshot> {
        let state = self.inner.read().expect("resource store lock poisoned");
        Ok(ApiSnapshot {
            proxies: state.proxies.clone(),
            upstreams: state.upstreams.clone(),
            endpoints: state.endpoints.clone(),
        })
    }

    async fn list_upstreams(&self) -> Result<Vec<Upstream>> {
        Ok(self.inner.read().expect("resource store lock poisoned").upstreams.clone())
    }

    async fn list_proxies(&self) -> Result<Vec<Proxy>> {
        Ok(self.inner.read().expect("resource store lock poisoned").proxies.clone())
    }

    async fn set_endpoints(&self, upstream: UpstreamRef, endpoints: Vec<Endpoint>) -> Result<()> {
        self.inner.write().expect("resource store lock poisoned").endpoints.insert(upstream, endpoints);
        let _ = self.change_tx.send(());
        Ok(())
    }

    async fn write_report(
        &self,
        node_key: &str,
        reported_by: &str,
        reports: ReportSet,
    ) -> Result<()> {
        self.inner
            .write()
            .expect("resource store lock poisoned")
            .reports
            .insert(node_key.to_string(), (reported_by.to_string(), reports));
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<()> {
        self.change_tx.subscribe()
    }
}

/// Shared handle alias used throughout the syncer/EDS wiring.
pub type SharedResourceStore = Arc<dyn ResourceStore>;
