//! # Structured Logging
//!
//! Structured logging macros and utilities using the tracing ecosystem.
//!
//! # Trace-Log Correlation
//!
//! When OpenTelemetry tracing is enabled, all log entries automatically include
//! trace context (trace ID and span ID) for correlation. This is handled by the
//! `tracing-opentelemetry` layer which bridges `#[instrument]` spans to OpenTelemetry.
//!
//! In JSON logging mode, trace context is included as fields in the JSON output:
//! - `trace_id`: W3C trace ID (32 hex characters)
//! - `span_id`: Span ID (16 hex characters)

/// Create a tracing span for an xDS discovery operation.
#[macro_export]
macro_rules! xds_span {
    ($operation:expr, $node_id:expr) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $node_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "xds_operation",
            operation = %$operation,
            node_id = %$node_id,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for a service-registry catalog operation.
#[macro_export]
macro_rules! catalog_span {
    ($operation:expr, $service:expr, $datacenter:expr) => {
        tracing::debug_span!(
            "catalog_operation",
            operation = %$operation,
            service = %$service,
            datacenter = %$datacenter,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
}

/// Log the effective configuration at startup.
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        xds_address = %config.xds.bind_address(),
        fallback_address = %config.xds.fallback_address,
        fallback_port = config.xds.fallback_port,
        catalog_address = %config.catalog.address,
        write_namespace = %config.catalog.write_namespace,
        dns_poll_interval_seconds = config.catalog.dns_poll_interval_seconds,
        metrics_enabled = %config.observability.enable_metrics,
        tracing_enabled = %config.observability.enable_tracing,
        "gateway control plane configuration"
    );
}
