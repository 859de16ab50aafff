//! Error types for the exporter.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use crate::client::Resource;
use thiserror::Error;

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Main error type for the exporter.
#[derive(Error, Debug)]
pub enum ExporterError {
    // Fetch errors (transient, counted per appliance)
    #[error("Request for {resource} to {server} failed: {source}")]
    Request {
        server: String,
        resource: Resource,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} fetching {resource} from {server}")]
    UnexpectedStatus { server: String, resource: Resource, status: u16 },

    #[error("Failed to decode {resource} from {server}: {reason}")]
    Decode { server: String, resource: Resource, reason: String },

    #[error("Failed to fetch {resource} from {server}: {reason}")]
    FetchFailed { server: String, resource: Resource, reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Registry errors
    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExporterError {
    /// Shorthand for a configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig { reason: reason.into() }
    }

    /// The resource a fetch error relates to, if any.
    pub fn resource(&self) -> Option<Resource> {
        match self {
            Self::Request { resource, .. }
            | Self::UnexpectedStatus { resource, .. }
            | Self::Decode { resource, .. }
            | Self::FetchFailed { resource, .. } => Some(*resource),
            _ => None,
        }
    }
}
