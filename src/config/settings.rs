//! # Configuration Settings
//!
//! Typed configuration for the gateway control plane: the xDS server's bind
//! address, the service-registry backend's address and poll cadence, and the
//! observability stack.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    #[validate(nested)]
    pub xds: XdsConfig,

    #[validate(nested)]
    pub catalog: CatalogConfig,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration, including cross-field rules the
    /// `validator` derive can't express.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.xds.port == self.observability.metrics_port && self.observability.metrics_port != 0
        {
            return Err(Error::validation("xDS port and metrics port cannot be the same"));
        }
        Ok(())
    }
}

/// xDS gRPC server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct XdsConfig {
    #[validate(length(min = 1, message = "xDS host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "xDS port must be between 1 and 65535"))]
    pub port: u16,

    /// Address the FALLBACK snapshot's listener binds to (defaults to `::`,
    /// matching the spec's "binds on `::`" contract).
    pub fallback_address: String,

    #[validate(range(min = 1, max = 65535, message = "fallback port must be between 1 and 65535"))]
    pub fallback_port: u16,

    pub enable_mtls: bool,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ca_file: Option<String>,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18000,
            fallback_address: "::".to_string(),
            fallback_port: 19000,
            enable_mtls: false,
            cert_file: None,
            key_file: None,
            ca_file: None,
        }
    }
}

impl XdsConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_tls_config(&self) -> bool {
        self.cert_file.is_some() && self.key_file.is_some()
    }
}

/// Service-registry backend configuration consumed by the EDS watcher.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CatalogConfig {
    #[validate(length(min = 1, message = "catalog address cannot be empty"))]
    pub address: String,

    /// Write namespace passed to the EDS watcher.
    #[validate(length(min = 1, message = "write namespace cannot be empty"))]
    pub write_namespace: String,

    /// DNS poll tick, default 5s per the spec.
    #[validate(range(min = 1, max = 3600, message = "DNS poll interval must be between 1 and 3600 seconds"))]
    pub dns_poll_interval_seconds: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8500".to_string(),
            write_namespace: "default".to_string(),
            dns_poll_interval_seconds: 5,
        }
    }
}

impl CatalogConfig {
    pub fn dns_poll_interval(&self) -> Duration {
        Duration::from_secs(self.dns_poll_interval_seconds)
    }
}

/// Observability configuration for metrics, tracing, and logging.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    pub enable_metrics: bool,

    #[validate(range(max = 65535, message = "metrics port must be <= 65535"))]
    pub metrics_port: u16,

    pub enable_tracing: bool,
    pub otlp_endpoint: Option<String>,

    /// Fraction of traces sampled when tracing is enabled, `TraceIdRatioBased`.
    #[validate(range(min = 0.0, max = 1.0, message = "trace sampling ratio must be between 0.0 and 1.0"))]
    pub trace_sampling_ratio: f64,

    #[validate(length(min = 1, message = "service name cannot be empty"))]
    pub service_name: String,

    #[validate(length(min = 1, message = "log level cannot be empty"))]
    pub log_level: String,

    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_port: 9090,
            enable_tracing: false,
            otlp_endpoint: None,
            trace_sampling_ratio: 1.0,
            service_name: "gateway-control-plane".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}
