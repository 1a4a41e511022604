//! # Metrics Collection
//!
//! Prometheus metrics for the control plane's own operation: the xDS
//! streaming server, the EDS watcher, the service-registry backend, DNS
//! resolution, and the translator/sanitizer/syncer pipeline.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Metrics recorder that tracks application metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record an xDS stream connection event for one node.
    pub fn record_xds_connection(&self, node_id: &str, connected: bool) {
        let labels = [("node_id", node_id.to_string())];
        if connected {
            gauge!("xds_connections_total", &labels).increment(1.0);
        } else {
            gauge!("xds_connections_total", &labels).decrement(1.0);
        }
    }

    /// Record an xDS request/response outcome for one type URL and node.
    pub fn record_xds_request(&self, type_url: &str, node_id: &str, success: bool) {
        let request_labels = [("type_url", type_url.to_string()), ("node_id", node_id.to_string())];
        counter!("xds_requests_total", &request_labels).increment(1);

        let status_label = if success { "success" } else { "error" };
        let response_labels =
            [("type_url", type_url.to_string()), ("status", status_label.to_string())];
        counter!("xds_responses_total", &response_labels).increment(1);
    }

    /// Record xDS stream duration in seconds.
    pub fn record_xds_stream_duration(&self, node_id: &str, duration: f64) {
        let labels = [("node_id", node_id.to_string())];
        histogram!("xds_stream_duration_seconds", &labels).record(duration);
    }

    /// Update the snapshot-cache version gauge for one node key.
    pub fn update_snapshot_cache_version(&self, node_key: &str, version: u64) {
        let labels = [("node_key", node_key.to_string())];
        gauge!("xds_snapshot_cache_version", &labels).set(version as f64);
    }

    /// Update the total number of cached snapshot-cache keys.
    pub fn update_snapshot_cache_keys(&self, count: usize) {
        gauge!("xds_snapshot_cache_keys_total").set(count as f64);
    }

    /// Record one EDS publish: endpoint count for one upstream after a
    /// catalog refresh or DNS poll.
    pub fn record_eds_publish(&self, service: &str, endpoint_count: usize) {
        let labels = [("service", service.to_string())];
        counter!("eds_publishes_total", &labels).increment(1);
        gauge!("eds_endpoints_total", &labels).set(endpoint_count as f64);
    }

    /// Record a catalog backend query outcome for one `(service, datacenter)`
    /// pair.
    pub fn record_catalog_query(&self, service: &str, datacenter: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels = [
            ("service", service.to_string()),
            ("datacenter", datacenter.to_string()),
            ("status", status.to_string()),
        ];
        counter!("catalog_queries_total", &labels).increment(1);
    }

    /// Record a DNS resolution outcome for one hostname.
    pub fn record_dns_resolution(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels = [("status", status.to_string())];
        counter!("dns_resolutions_total", &labels).increment(1);
    }

    /// Record one DNS poll tick: whether it detected a change worth
    /// republishing.
    pub fn record_dns_poll_tick(&self, changed: bool) {
        let labels = [("changed", changed.to_string())];
        counter!("dns_poll_ticks_total", &labels).increment(1);
    }

    /// Record a translator/sanitizer report outcome for one resource.
    pub fn record_report_outcome(&self, status: &str) {
        let labels = [("status", status.to_string())];
        counter!("translation_reports_total", &labels).increment(1);
    }

    /// Record one translator-syncer sync pass's duration and error count.
    pub fn record_sync_duration(&self, duration: f64, error_count: usize) {
        histogram!("syncer_sync_duration_seconds").record(duration);
        if error_count > 0 {
            counter!("syncer_sync_errors_total").increment(error_count as u64);
        }
    }

    /// Update the active uptime gauge.
    pub fn update_uptime(&self, uptime_seconds: f64) {
        gauge!("system_uptime_seconds").set(uptime_seconds);
    }

    /// Register baseline descriptions and zeroed series so Prometheus exports
    /// appear before the first event occurs.
    pub fn register_descriptions(&self) {
        describe_gauge!("xds_connections_total", Unit::Count, "Active xDS stream connections per node");
        describe_counter!("xds_requests_total", Unit::Count, "xDS discovery requests received per type URL and node");
        describe_counter!("xds_responses_total", Unit::Count, "xDS discovery responses sent per type URL and outcome");
        describe_histogram!("xds_stream_duration_seconds", Unit::Seconds, "Duration of an xDS stream connection");
        describe_gauge!("xds_snapshot_cache_version", Unit::Count, "Current snapshot-cache version per node key");
        describe_gauge!("xds_snapshot_cache_keys_total", Unit::Count, "Total number of cached snapshot-cache keys");
        describe_counter!("eds_publishes_total", Unit::Count, "Endpoint batches published per service");
        describe_gauge!("eds_endpoints_total", Unit::Count, "Current endpoint count per service");
        describe_counter!("catalog_queries_total", Unit::Count, "Service-registry backend queries per (service, datacenter, outcome)");
        describe_counter!("dns_resolutions_total", Unit::Count, "DNS resolution attempts per outcome");
        describe_counter!("dns_poll_ticks_total", Unit::Count, "DNS poll ticks per whether they detected a change");
        describe_counter!("translation_reports_total", Unit::Count, "Translator/sanitizer report outcomes per status");
        describe_histogram!("syncer_sync_duration_seconds", Unit::Seconds, "Duration of one translator-syncer sync pass");
        describe_counter!("syncer_sync_errors_total", Unit::Count, "Per-proxy/extension sync failures");
        describe_gauge!("system_uptime_seconds", Unit::Seconds, "Process uptime");

        counter!("eds_publishes_total", "service" => "").absolute(0);
        gauge!("xds_snapshot_cache_keys_total").set(0.0);
    }
}

/// Global metrics recorder instance.
static METRICS: once_cell::sync::Lazy<Arc<RwLock<Option<MetricsRecorder>>>> =
    once_cell::sync::Lazy::new(|| Arc::new(RwLock::new(None)));

/// Initialize metrics collection and the Prometheus exporter.
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr
        .parse()
        .map_err(|e| Error::config(format!("invalid metrics bind address '{metrics_addr}': {e}")))?;

    let builder = PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name);

    builder
        .install()
        .map_err(|e| Error::config(format!("failed to initialize metrics exporter: {e}")))?;

    let recorder = MetricsRecorder::new();
    {
        let mut metrics = METRICS.write().await;
        *metrics = Some(recorder.clone());
    }

    recorder.register_descriptions();

    info!(metrics_addr = %metrics_addr, service_name = %config.service_name, "metrics collection initialized");

    Ok(())
}

/// Get the global metrics recorder.
pub async fn get_metrics() -> Option<MetricsRecorder> {
    METRICS.read().await.clone()
}

/// Record an xDS discovery request/response outcome via the global recorder.
pub async fn record_xds_operation(type_url: &str, node_id: &str, success: bool) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_xds_request(type_url, node_id, success);
    }
}

/// Record an EDS publish via the global recorder.
pub async fn record_eds_publish(service: &str, endpoint_count: usize) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_eds_publish(service, endpoint_count);
    }
}

/// Record a translator-syncer sync pass via the global recorder.
pub async fn record_sync_duration(duration: f64, error_count: usize) {
    if let Some(metrics) = get_metrics().await {
        metrics.record_sync_duration(duration, error_count);
    }
}

/// System metrics collector that runs periodically, updating uptime.
pub struct SystemMetricsCollector {
    start_time: std::time::Instant,
}

impl Default for SystemMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMetricsCollector {
    pub fn new() -> Self {
        Self { start_time: std::time::Instant::now() }
    }

    /// Periodically update the uptime gauge until cancelled.
    pub async fn start(&self, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        let start_time = self.start_time;

        loop {
            ticker.tick().await;
            if let Some(metrics) = get_metrics().await {
                metrics.update_uptime(start_time.elapsed().as_secs_f64());
            }
        }
    }
}
