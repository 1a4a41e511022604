//! # Error Handling
//!
//! Typed errors for the gateway control plane, using `thiserror` for all
//! operations. Every variant maps to one of the error kinds in the
//! specification's error-handling design: configuration, I/O, serialization,
//! validation, DNS, catalog (service-registry backend), translation,
//! sanitization, xDS transport, and an internal catch-all.

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the control plane.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors: missing/invalid settings, bad config files.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors with additional context.
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors.
    #[error("serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Validation errors against a domain invariant (e.g. `Upstream::validate`).
    #[error("validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// DNS resolution failures.
    #[error("DNS resolution error for '{host}': {message}")]
    Dns { host: String, message: String },

    /// Service-registry / catalog backend errors (watch RPC failure, query
    /// failure for a single `(service, datacenter)` pair).
    #[error("catalog backend error: {message}")]
    Catalog { message: String },

    /// Translator errors that are fatal to a single proxy's sync (not the
    /// whole snapshot).
    #[error("translation error: {message}")]
    Translation { message: String, resource: Option<String> },

    /// Sanitizer chain aborted the publish.
    #[error("sanitizer error: {message}")]
    Sanitizer { message: String },

    /// xDS transport/protocol errors.
    #[error("xDS protocol error: {message}")]
    Xds { message: String, node_id: Option<String> },

    /// Internal invariant violations / unexpected states.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io { source, context: context.into() }
    }

    pub fn serialization<S: Into<String>>(context: S, source: serde_json::Error) -> Self {
        Self::Serialization { source, context: context.into() }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn dns<H: Into<String>, S: Into<String>>(host: H, message: S) -> Self {
        Self::Dns { host: host.into(), message: message.into() }
    }

    pub fn catalog<S: Into<String>>(message: S) -> Self {
        Self::Catalog { message: message.into() }
    }

    pub fn translation<S: Into<String>>(message: S) -> Self {
        Self::Translation { message: message.into(), resource: None }
    }

    pub fn translation_for<S: Into<String>, R: Into<String>>(message: S, resource: R) -> Self {
        Self::Translation { message: message.into(), resource: Some(resource.into()) }
    }

    pub fn sanitizer<S: Into<String>>(message: S) -> Self {
        Self::Sanitizer { message: message.into() }
    }

    pub fn xds<S: Into<String>>(message: S) -> Self {
        Self::Xds { message: message.into(), node_id: None }
    }

    pub fn xds_with_node<S: Into<String>, N: Into<String>>(message: S, node_id: N) -> Self {
        Self::Xds { message: message.into(), node_id: Some(node_id.into()) }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialization { source, context: "JSON (de)serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::validation(errors.to_string())
    }
}
