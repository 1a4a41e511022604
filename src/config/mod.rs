//! # Configuration Management
//!
//! Loads the control plane's typed [`AppConfig`] from layered sources: built-in
//! defaults, an optional YAML file, then `GATEWAY_`-prefixed environment
//! variables, in that precedence order (later sources win).

pub mod settings;

pub use settings::{AppConfig, CatalogConfig, ObservabilityConfig, XdsConfig};

use crate::errors::{Error, Result};
use config::{Config, Environment, File};
use std::path::Path;

/// Load application configuration from defaults, an optional file, and env vars.
pub fn load_config<P: AsRef<Path>>(config_path: Option<P>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    builder = builder
        .add_source(Config::try_from(&AppConfig::default()).map_err(|e| {
            Error::config_with_source("failed to seed config defaults", Box::new(e))
        })?);

    if let Some(path) = config_path {
        let path = path.as_ref();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(Error::config(format!("configuration file not found: {}", path.display())));
        }
    }

    builder = builder
        .add_source(Environment::with_prefix("GATEWAY").separator("_").try_parsing(true));

    let built = builder
        .build()
        .map_err(|e| Error::config_with_source("failed to build configuration", Box::new(e)))?;

    let app_config: AppConfig = built.try_deserialize().map_err(|e| {
        Error::config_with_source("failed to deserialize configuration", Box::new(e))
    })?;

    app_config.validate()?;
    Ok(app_config)
}

/// Load configuration from environment variables and defaults only.
pub fn load_config_from_env() -> Result<AppConfig> {
    load_config::<&str>(None)
}

/// Load configuration from a YAML file, layered over defaults and env vars.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    load_config(Some(path))
}
