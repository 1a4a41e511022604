//! # pathwarden
//!
//! An infrastructure-agnostic Envoy xDS control plane. It watches a
//! declarative resource store for upstreams and proxies, resolves upstream
//! endpoints from a service-registry backend and DNS, translates the result
//! into Envoy configuration, and serves it to proxies over the xDS gRPC
//! protocol.
//!
//! ## Architecture
//!
//! ```text
//! Resource Store  →  EDS Watcher  →  Translator/Sanitizer  →  Snapshot Cache  →  xDS Server  →  Envoy Proxies
//!  (proxies,          (catalog +        (domain types           (per-node          (gRPC
//!   upstreams)         DNS poll)         → Envoy config)          watch cache)       discovery)
//! ```
//!
//! ## Core Components
//!
//! - **xDS Server** (`xds`): tonic-based gRPC server implementing the four
//!   state-of-the-world Envoy discovery services (CDS, EDS, LDS, RDS).
//! - **Snapshot Cache** (`xds::cache`): per-node watch-based cache handed to
//!   the xDS server and written by the translator syncer.
//! - **Resource Store** (`store`): the declarative input — proxies and
//!   upstreams — modeled as an external collaborator trait.
//! - **EDS Watcher** (`eds`): resolves upstream endpoints from a
//!   service-registry backend and DNS, republishing on change.
//! - **Translator/Sanitizer/Syncer** (`translator`, `sanitizer`, `syncer`):
//!   turns the declarative snapshot into Envoy configuration and writes it
//!   into the snapshot cache.
//! - **Plugins** (`plugins`): pluggable per-route/per-listener extensions.
//! - **Observability Stack** (`observability`): structured logging,
//!   distributed tracing, metrics, and health checking.

pub mod config;
pub mod dns;
pub mod domain;
pub mod eds;
pub mod errors;
pub mod observability;
pub mod plugins;
pub mod sanitizer;
pub mod startup;
pub mod store;
pub mod syncer;
pub mod translator;
pub mod utils;
pub mod xds;

pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
