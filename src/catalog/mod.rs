//! Service-discovery catalog access
//!
//! - `consul` - HTTP client for the Consul catalog and health APIs
//! - `transport` - plaintext or mutual-TLS HTTP client construction
//!
//! The waiters only ever see the [`Catalog`] trait.

mod consul;
mod transport;

#[cfg(test)]
pub(crate) mod scripted;
#[cfg(test)]
pub(crate) mod test_pki;

pub use consul::ConsulCatalog;
pub use transport::{build_http_client, TlsMaterial, TransportError, TransportMode};

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

/// The only provider status that counts as healthy
pub const PASSING_STATUS: &str = "passing";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("catalog returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("failed to parse catalog response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("invalid catalog URL: {0}")]
    InvalidUrl(String),

    #[error("catalog host {host} could not be resolved: {source}")]
    Unresolvable {
        host: String,
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    /// Whether waiting and asking again could possibly produce a different answer
    ///
    /// Network failures, timeouts, non-2xx answers and malformed bodies are
    /// transient. A URL that cannot be built never will be.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::Request(_) | CatalogError::Status { .. } | CatalogError::Decode { .. }
        )
    }
}

/// One health check as reported for a registered service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResult {
    pub name: String,
    pub passing: bool,
}

impl HealthCheckResult {
    /// Map a provider status string onto the passing flag
    ///
    /// Allow-list: anything other than exactly `"passing"` is failing,
    /// including statuses this tool has never heard of.
    pub fn from_status(name: impl Into<String>, status: &str) -> Self {
        Self {
            name: name.into(),
            passing: status == PASSING_STATUS,
        }
    }
}

/// Read-only view of the service-discovery catalog
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Names of every service currently registered
    async fn list_services(&self) -> Result<BTreeSet<String>, CatalogError>;

    /// Every health check currently known for `service`
    async fn list_health_checks(&self, service: &str)
        -> Result<Vec<HealthCheckResult>, CatalogError>;
}
