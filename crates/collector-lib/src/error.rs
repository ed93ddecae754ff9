//! Error types for the collector
//!
//! Errors are grouped by how far a failure reaches:
//! - [`HypervisorError`] comes from the hypervisor connection
//! - [`ExtractionError`] drops a single domain's record
//! - [`DescriptorError`] only blanks out device-level metrics
//! - [`SinkError`] is logged per domain and never aborts a pass

use thiserror::Error;

/// Failure reported by the hypervisor connection
#[derive(Debug, Error)]
pub enum HypervisorError {
    /// Opening the connection failed
    #[error("failed to connect to hypervisor at {uri}: {message}")]
    Connect { uri: String, message: String },

    /// Listing active domains failed; aborts the current pass
    #[error("failed to list active domains: {0}")]
    Enumeration(String),

    /// A domain ID could not be resolved to a handle
    #[error("failed to look up domain {id}: {message}")]
    Lookup { id: u32, message: String },

    /// A query against a resolved domain failed
    #[error("{operation} failed: {message}")]
    Query {
        operation: &'static str,
        message: String,
    },
}

impl HypervisorError {
    pub fn query(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Query {
            operation,
            message: message.into(),
        }
    }
}

/// A domain's core info block could not be read
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {field} for domain: {source}")]
    Core {
        field: &'static str,
        #[source]
        source: HypervisorError,
    },
}

/// The domain descriptor document is not well-formed XML
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("malformed domain descriptor: {0}")]
    Malformed(#[from] roxmltree::Error),
}

/// Failure inside the metrics sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to register gauge: {0}")]
    Registration(#[source] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encode(#[source] prometheus::Error),

    #[error("push gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("push gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid push gateway endpoint: {0}")]
    InvalidEndpoint(String),
}
