//! Gate configuration
//!
//! Three layers, highest precedence first:
//! - command-line flags (most with a `SVCGATE_*` environment fallback)
//! - an optional TOML file given with `--config`
//! - built-in defaults
//!
//! Everything is validated up front so a misconfiguration fails before any
//! retry loop starts.

use crate::catalog::{TlsMaterial, TransportMode};
use crate::target::PrefixSource;
use crate::waiter::{RetryPolicy, ServiceScope};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Local Consul agent, plaintext port
pub const DEFAULT_CATALOG_URL: &str = "http://consul.service.consul:8500";
/// Local Consul agent, TLS port
pub const DEFAULT_TLS_CATALOG_URL: &str = "https://consul.service.consul:8501";
pub const DEFAULT_READINESS_RETRIES: u32 = 20;
pub const DEFAULT_HEALTH_RETRIES: u32 = 100;
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid catalog URL {url:?}: {reason}")]
    CatalogUrl { url: String, reason: String },

    #[error("mutual-tls transport requires --{0}")]
    MissingTlsMaterial(&'static str),

    #[error("query timeout must be greater than zero")]
    ZeroQueryTimeout,
}

/// Named transport modes accepted on the command line and in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Unauthenticated HTTP
    #[default]
    Plaintext,
    /// Verified HTTPS with a client certificate
    MutualTls,
}

impl TransportKind {
    /// Catalog URL used when none is configured
    pub fn default_catalog_url(self) -> &'static str {
        match self {
            TransportKind::Plaintext => DEFAULT_CATALOG_URL,
            TransportKind::MutualTls => DEFAULT_TLS_CATALOG_URL,
        }
    }
}

#[derive(Debug, Default, Parser)]
#[command(
    name = "svcgate",
    about = "Wait until services are registered in the catalog and all their health checks pass",
    version
)]
pub struct Args {
    /// TOML config file; flags override its values
    #[arg(short, long, env = "SVCGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog base URL
    #[arg(long, env = "SVCGATE_CATALOG_URL")]
    pub catalog_url: Option<String>,

    /// How to reach the catalog
    #[arg(long, value_enum, env = "SVCGATE_TRANSPORT")]
    pub transport: Option<TransportKind>,

    /// PEM client certificate (mutual-tls)
    #[arg(long, env = "SVCGATE_CLIENT_CERT")]
    pub client_cert: Option<PathBuf>,

    /// PEM client private key (mutual-tls)
    #[arg(long, env = "SVCGATE_CLIENT_KEY")]
    pub client_key: Option<PathBuf>,

    /// Extra PEM CA bundle to trust (mutual-tls)
    #[arg(long, env = "SVCGATE_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Deployment service to wait for; qualified with the prefix (repeatable)
    #[arg(long = "service", value_name = "NAME")]
    pub services: Vec<String>,

    /// Cluster-wide service to wait for; never prefixed (repeatable)
    #[arg(long = "global-service", value_name = "NAME")]
    pub global_services: Vec<String>,

    /// Deployment prefix, e.g. the branch name; wins over --prefix-file
    #[arg(long, env = "SVCGATE_PREFIX")]
    pub prefix: Option<String>,

    /// File whose content is the deployment prefix
    #[arg(long, env = "SVCGATE_PREFIX_FILE")]
    pub prefix_file: Option<PathBuf>,

    /// Retries allowed while waiting for registration
    #[arg(long)]
    pub readiness_retries: Option<u32>,

    /// Retries allowed while waiting for health checks
    #[arg(long)]
    pub health_retries: Option<u32>,

    /// Seconds to sleep between attempts
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub query_timeout_secs: Option<u64>,

    /// Which services the health phase polls
    #[arg(long, value_enum)]
    pub service_scope: Option<ServiceScope>,

    /// Write Prometheus textfile metrics here on exit
    #[arg(long, env = "SVCGATE_METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,
}

/// Contents of a `--config` TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub catalog_url: Option<String>,
    pub transport: Option<TransportKind>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub global_services: Vec<String>,
    pub prefix: Option<String>,
    pub prefix_file: Option<PathBuf>,
    pub readiness_retries: Option<u32>,
    pub health_retries: Option<u32>,
    pub interval_secs: Option<u64>,
    pub query_timeout_secs: Option<u64>,
    pub service_scope: Option<ServiceScope>,
    pub metrics_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Validated configuration for one gate run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub catalog_url: Url,
    pub transport: TransportMode,
    /// Per-deployment names, qualified with the prefix
    pub services: Vec<String>,
    /// Cluster-wide names, used as-is
    pub global_services: Vec<String>,
    pub prefix: PrefixSource,
    pub readiness: RetryPolicy,
    pub health: RetryPolicy,
    pub query_timeout: Duration,
    pub service_scope: ServiceScope,
    pub metrics_file: Option<PathBuf>,
}

impl Config {
    /// Load the optional file named by `args` and merge it under the flags
    pub fn load(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    /// Merge flags over file values over defaults, then validate
    pub fn resolve(args: Args, file: FileConfig) -> Result<Self, ConfigError> {
        let kind = args.transport.or(file.transport).unwrap_or_default();
        let raw_url = args
            .catalog_url
            .or(file.catalog_url)
            .unwrap_or_else(|| kind.default_catalog_url().to_string());

        let transport = match kind {
            TransportKind::Plaintext => TransportMode::Plaintext,
            TransportKind::MutualTls => TransportMode::MutualTls(TlsMaterial {
                client_cert: args
                    .client_cert
                    .or(file.client_cert)
                    .ok_or(ConfigError::MissingTlsMaterial("client-cert"))?,
                client_key: args
                    .client_key
                    .or(file.client_key)
                    .ok_or(ConfigError::MissingTlsMaterial("client-key"))?,
                ca_cert: args.ca_cert.or(file.ca_cert),
            }),
        };

        let catalog_url = parse_catalog_url(&raw_url, &transport)?;

        // Resolved per layer: any prefix setting on the command line shadows
        // both file settings; within a layer the literal wins
        let prefix = prefix_source(args.prefix, args.prefix_file)
            .or_else(|| prefix_source(file.prefix, file.prefix_file))
            .unwrap_or(PrefixSource::None);

        // A non-empty list on the command line replaces the file's list
        let services = if args.services.is_empty() {
            file.services
        } else {
            args.services
        };
        let global_services = if args.global_services.is_empty() {
            file.global_services
        } else {
            args.global_services
        };

        let interval = Duration::from_secs(
            args.interval_secs
                .or(file.interval_secs)
                .unwrap_or(DEFAULT_INTERVAL_SECS),
        );

        let query_timeout_secs = args
            .query_timeout_secs
            .or(file.query_timeout_secs)
            .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS);
        if query_timeout_secs == 0 {
            return Err(ConfigError::ZeroQueryTimeout);
        }

        Ok(Config {
            catalog_url,
            transport,
            services,
            global_services,
            prefix,
            readiness: RetryPolicy::new(
                args.readiness_retries
                    .or(file.readiness_retries)
                    .unwrap_or(DEFAULT_READINESS_RETRIES),
                interval,
            ),
            health: RetryPolicy::new(
                args.health_retries
                    .or(file.health_retries)
                    .unwrap_or(DEFAULT_HEALTH_RETRIES),
                interval,
            ),
            query_timeout: Duration::from_secs(query_timeout_secs),
            service_scope: args
                .service_scope
                .or(file.service_scope)
                .unwrap_or_default(),
            metrics_file: args.metrics_file.or(file.metrics_file),
        })
    }
}

fn prefix_source(literal: Option<String>, file: Option<PathBuf>) -> Option<PrefixSource> {
    match (literal, file) {
        (Some(literal), _) => Some(PrefixSource::Literal(literal)),
        (None, Some(path)) => Some(PrefixSource::File(path)),
        (None, None) => None,
    }
}

/// Parse the base URL and check its scheme matches the transport mode
fn parse_catalog_url(raw: &str, transport: &TransportMode) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::CatalogUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    let expected = transport.scheme();
    if url.scheme() != expected {
        return Err(invalid(format!(
            "{} transport requires a {}:// URL",
            match transport {
                TransportMode::Plaintext => "plaintext",
                TransportMode::MutualTls(_) => "mutual-tls",
            },
            expected
        )));
    }

    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "config_test.rs"]
mod tests;
