//! Consul HTTP API client
//!
//! Only the two read endpoints the gate needs:
//! - `GET /v1/catalog/services` - object keyed by service name
//! - `GET /v1/health/checks/{service}` - array of checks with `Name` and `Status`

use super::{Catalog, CatalogError, HealthCheckResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::time::Duration;
use tokio::net::lookup_host;
use tracing::debug;
use url::{Host, Url};

/// Wire shape of one entry returned by `/v1/health/checks/{service}`
///
/// Consul sends many more fields (`Node`, `CheckID`, `Output`, ...); only
/// these two matter here.
#[derive(Debug, Deserialize)]
struct CheckEntry {
    #[serde(rename = "Name")]
    name: String,

    #[serde(rename = "Status")]
    status: String,
}

/// Catalog backed by a Consul agent or server
#[derive(Debug, Clone)]
pub struct ConsulCatalog {
    client: reqwest::Client,
    base_url: Url,
}

impl ConsulCatalog {
    /// Create a client for the Consul API rooted at `base_url`
    ///
    /// `base_url` may carry a path prefix (e.g. behind a proxy); the API
    /// paths are appended below it.
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve the catalog host once, giving up after `timeout`
    ///
    /// Used as a startup check: a host that does not resolve is a
    /// misconfiguration, not something to wait out.
    pub async fn resolve_host(&self, timeout: Duration) -> Result<(), CatalogError> {
        let port = self.base_url.port_or_known_default().unwrap_or(80);

        let domain = match self.base_url.host() {
            Some(Host::Domain(domain)) => domain,
            Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => return Ok(()),
            None => return Err(CatalogError::InvalidUrl(self.base_url.to_string())),
        };
        let unresolvable = |source: io::Error| CatalogError::Unresolvable {
            host: domain.to_string(),
            source,
        };

        let mut addrs = match tokio::time::timeout(timeout, lookup_host((domain, port))).await {
            Ok(result) => result.map_err(unresolvable)?,
            Err(_) => {
                return Err(unresolvable(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("lookup timed out after {:?}", timeout),
                )))
            }
        };

        match addrs.next() {
            Some(addr) => {
                debug!(host = domain, addr = %addr, "Catalog host resolved");
                Ok(())
            }
            None => Err(unresolvable(io::Error::new(
                io::ErrorKind::NotFound,
                "no addresses returned",
            ))),
        }
    }

    /// Build `{base}/{segments...}`, percent-encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CatalogError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        debug!(url = %url, "Querying catalog");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| CatalogError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Catalog for ConsulCatalog {
    async fn list_services(&self) -> Result<BTreeSet<String>, CatalogError> {
        let url = self.endpoint(&["v1", "catalog", "services"])?;
        let services: BTreeMap<String, serde_json::Value> = self.get_json(url).await?;
        Ok(services.into_keys().collect())
    }

    async fn list_health_checks(
        &self,
        service: &str,
    ) -> Result<Vec<HealthCheckResult>, CatalogError> {
        let url = self.endpoint(&["v1", "health", "checks", service])?;
        let checks: Vec<CheckEntry> = self.get_json(url).await?;
        Ok(checks
            .into_iter()
            .map(|check| HealthCheckResult::from_status(check.name, &check.status))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "consul_test.rs"]
mod tests;
