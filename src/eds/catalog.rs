//! The service-registry backend contract and an in-memory double for tests.
//!
//! A real backend (Consul, or anything speaking the same catalog shape) lists
//! data centers, answers point queries for one `(service, datacenter)` pair,
//! and streams a notification whenever anything in the watched data centers
//! changes. This module models that contract as [`CatalogClient`].

use crate::domain::CatalogService;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// The list of data centers known to the backend, queried once at watcher
    /// startup.
    async fn datacenters(&self) -> Result<Vec<String>>;

    /// Point query for one service in one data center, consistency required.
    async fn service(
        &self,
        cancel: &CancellationToken,
        name: &str,
        datacenter: &str,
    ) -> Result<Vec<CatalogService>>;

    /// Starts a background watch over `datacenters`; the returned receivers
    /// carry change notifications (no payload — consumers re-query) and
    /// backend errors respectively.
    fn watch_services(
        &self,
        cancel: CancellationToken,
        datacenters: Vec<String>,
    ) -> (mpsc::Receiver<()>, mpsc::Receiver<Error>);
}

/// In-memory catalog for tests: a fixed set of data centers, a mutable table
/// of `(service, datacenter) -> [CatalogService]`, and a way to inject both
/// meta-update notifications and simulated per-pair backend errors.
pub struct InMemoryCatalogClient {
    datacenters: Vec<String>,
    table: Mutex<HashMap<(String, String), Vec<CatalogService>>>,
    failures: Mutex<HashMap<(String, String), String>>,
    meta_tx: broadcast::Sender<()>,
}

impl InMemoryCatalogClient {
    pub fn new(datacenters: Vec<String>) -> Self {
        let (meta_tx, _) = broadcast::channel(64);
        Self { datacenters, table: Mutex::new(HashMap::new()), failures: Mutex::new(HashMap::new()), meta_tx }
    }

    pub fn set_services(&self, service: &str, dc: &str, specs: Vec<CatalogService>) {
        self.table
            .lock()
            .expect("catalog table lock poisoned")
            .insert((service.to_string(), dc.to_string()), specs);
    }

    /// Makes the next (and all subsequent, until cleared) queries for this
    /// pair fail with `message`.
    pub fn fail_service(&self, service: &str, dc: &str, message: &str) {
        self.failures
            .lock()
            .expect("catalog failures lock poisoned")
            .insert((service.to_string(), dc.to_string()), message.to_string());
    }

    /// Simulates a catalog change: notifies every active `watch_services`
    /// subscriber.
    pub fn trigger_update(&self) {
        let _ = self.meta_tx.send(());
    }
}

#[async_trait]
impl CatalogClient for InMemoryCatalogClient {
    async fn datacenters(&self) -> Result<Vec<String>> {
        Ok(self.datacenters.clone())
    }

    async fn service(
        &self,
        _cancel: &CancellationToken,
        name: &str,
        datacenter: &str,
    ) -> Result<Vec<CatalogService>> {
        let key = (name.to_string(), datacenter.to_string());
        if let Some(message) = self.failures.lock().expect("catalog failures lock poisoned").get(&key) {
            return Err(Error::catalog(message.clone()));
        }
        Ok(self.table.lock().expect("catalog table lock poisoned").get(&key).cloned().unwrap_or_default())
    }

    fn watch_services(
        &self,
        cancel: CancellationToken,
        _datacenters: Vec<String>,
    ) -> (mpsc::Receiver<()>, mpsc::Receiver<Error>) {
        let (meta_out_tx, meta_out_rx) = mpsc::channel(64);
        let (_err_tx, err_rx) = mpsc::channel::<Error>(16);
        let mut meta_rx = self.meta_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    event = meta_rx.recv() => {
                        match event {
                            Ok(()) => {
                                if meta_out_tx.send(()).await.is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });

        (meta_out_rx, err_rx)
    }
}

/// Shared handle alias for wiring into the watcher.
pub type SharedCatalogClient = Arc<dyn CatalogClient>;
