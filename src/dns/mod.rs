//! DNS resolution for service-registry addresses that name a host rather than
//! an IP literal.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Resolves a hostname to a sorted list of IPs. Implementations MUST honor
/// cancellation and MUST return a deterministic (sorted) order so downstream
/// hashing in the EDS watcher is stable across polls.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn resolve(&self, cancel: &CancellationToken, host: &str) -> Result<Vec<IpAddr>>;
}

/// Resolves through the system resolver via `tokio::net::lookup_host`.
pub struct SystemDnsResolver;

#[async_trait]
impl DnsResolver for SystemDnsResolver {
    async fn resolve(&self, cancel: &CancellationToken, host: &str) -> Result<Vec<IpAddr>> {
        // lookup_host requires a host:port pair; the port is discarded.
        let lookup = tokio::net::lookup_host((host, 0));
        let addrs = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::dns(host, "cancelled")),
            result = lookup => result.map_err(|e| Error::dns(host, e.to_string()))?,
        };

        let mut ips: Vec<IpAddr> = addrs.map(|socket_addr| socket_addr.ip()).collect();
        ips.sort();
        ips.dedup();
        Ok(ips)
    }
}

/// A `HashMap`-backed resolver for tests and local development: returns a
/// fixed, pre-sorted answer per host, or a DNS error for unknown hosts.
pub struct StaticDnsResolver {
    records: RwLock<HashMap<String, Vec<IpAddr>>>,
}

impl StaticDnsResolver {
    pub fn new() -> Self {
        Self { records: RwLock::new(HashMap::new()) }
    }

    pub fn with_records(records: HashMap<String, Vec<IpAddr>>) -> Self {
        Self { records: RwLock::new(records) }
    }

    /// Replace the answer for `host`, simulating a DNS change between polls.
    pub fn set(&self, host: impl Into<String>, mut ips: Vec<IpAddr>) {
        ips.sort();
        self.records.write().expect("dns record lock poisoned").insert(host.into(), ips);
    }
}

impl Default for StaticDnsResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsResolver for StaticDnsResolver {
    async fn resolve(&self, cancel: &CancellationToken, host: &str) -> Result<Vec<IpAddr>> {
        if cancel.is_cancelled() {
            return Err(Error::dns(host, "cancelled"));
        }
        self.records
            .read()
            .expect("dns record lock poisoned")
            .get(host)
            .cloned()
            .ok_or_else(|| Error::dns(host, "no such host"))
    }
}

/// One cached answer plus the instant it was recorded.
struct CacheEntry {
    ips: Vec<IpAddr>,
    recorded_at: Instant,
}

/// Wraps any [`DnsResolver`] with a TTL-bounded cache, per §4.D's
/// "implementations may cache" clause. A cache hit never consults the
/// wrapped resolver (and so can't observe cancellation); a miss delegates
/// and caches the (already sorted) answer.
pub struct CachingDnsResolver {
    inner: Arc<dyn DnsResolver>,
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl CachingDnsResolver {
    pub fn new(inner: Arc<dyn DnsResolver>, ttl: Duration) -> Self {
        Self { inner, ttl, cache: RwLock::new(HashMap::new()) }
    }

    fn cached(&self, host: &str) -> Option<Vec<IpAddr>> {
        let cache = self.cache.read().expect("dns cache lock poisoned");
        cache.get(host).filter(|entry| entry.recorded_at.elapsed() < self.ttl).map(|entry| entry.ips.clone())
    }
}

#[async_trait]
impl DnsResolver for CachingDnsResolver {
    async fn resolve(&self, cancel: &CancellationToken, host: &str) -> Result<Vec<IpAddr>> {
        if let Some(ips) = self.cached(host) {
            return Ok(ips);
        }

        let ips = self.inner.resolve(cancel, host).await?;
        self.cache
            .write()
            .expect("dns cache lock poisoned")
            .insert(host.to_string(), CacheEntry { ips: ips.clone(), recorded_at: Instant::now() });
        Ok(ips)
    }
}
