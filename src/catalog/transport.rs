//! HTTP client construction for the two catalog transport modes
//!
//! - `Plaintext` - unauthenticated HTTP, the local agent port (8500)
//! - `MutualTls` - verified HTTPS with a client certificate (8501)
//!
//! Certificate verification is never switched off. A private CA bundle can
//! be added on top of the built-in roots.

use reqwest::{Certificate, Identity};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("svcgate/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS material in {path}: {source}")]
    InvalidMaterial {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Client credential material for mutual TLS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    /// PEM client certificate (chain)
    pub client_cert: PathBuf,
    /// PEM private key for `client_cert`
    pub client_key: PathBuf,
    /// Extra PEM root certificate(s), e.g. the cluster's private CA
    pub ca_cert: Option<PathBuf>,
}

/// How the catalog is reached
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    Plaintext,
    MutualTls(TlsMaterial),
}

impl TransportMode {
    /// URL scheme this mode talks
    pub fn scheme(&self) -> &'static str {
        match self {
            TransportMode::Plaintext => "http",
            TransportMode::MutualTls(_) => "https",
        }
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|source| TransportError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Build the HTTP client used for every catalog query
///
/// `query_timeout` bounds each individual request end to end, so a hung
/// catalog cannot stall a retry budget.
pub fn build_http_client(
    mode: &TransportMode,
    query_timeout: Duration,
) -> Result<reqwest::Client, TransportError> {
    let builder = reqwest::Client::builder()
        .timeout(query_timeout)
        .user_agent(USER_AGENT);

    let builder = match mode {
        TransportMode::Plaintext => builder,
        TransportMode::MutualTls(material) => {
            // rustls wants certificate and key in a single PEM buffer
            let mut pem = read_pem(&material.client_cert)?;
            pem.push(b'\n');
            pem.extend(read_pem(&material.client_key)?);

            let identity =
                Identity::from_pem(&pem).map_err(|source| TransportError::InvalidMaterial {
                    path: material.client_cert.clone(),
                    source,
                })?;

            let mut builder = builder.use_rustls_tls().identity(identity).https_only(true);

            if let Some(ca_path) = &material.ca_cert {
                let ca = Certificate::from_pem(&read_pem(ca_path)?).map_err(|source| {
                    TransportError::InvalidMaterial {
                        path: ca_path.clone(),
                        source,
                    }
                })?;
                builder = builder.add_root_certificate(ca);
            }

            builder
        }
    };

    Ok(builder.build()?)
}
