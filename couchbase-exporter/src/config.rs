//! Configuration for the Couchbase exporter.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use couchbase_exporter_common::{LoggingConfig, load_config, parse_config};
use couchbase_exporter_core::naming::{is_valid_label_name, is_valid_metric_name};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] couchbase_exporter_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Paths served by the HTTP server itself.
pub const RESERVED_PATHS: &[&str] = &["/health", "/ready"];

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Metrics endpoint settings.
    #[serde(default)]
    pub web: WebConfig,

    /// Couchbase connection settings.
    #[serde(default)]
    pub db: DbConfig,

    /// Which domains to scrape.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Metric naming, definitions and filtering.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Address to listen on (default: "127.0.0.1:9191").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Request timeout in seconds, covering the whole scrape.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_listen() -> String {
    "127.0.0.1:9191".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Couchbase REST API connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Base URI of a cluster node (default: "http://127.0.0.1:8091").
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Username for basic auth. Empty disables authentication.
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on concurrent requests when fetching per-bucket routes.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_uri() -> String {
    "http://127.0.0.1:8091".to_string()
}

fn default_max_concurrent_fetches() -> usize {
    8
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: String::new(),
            password: String::new(),
            timeout_secs: default_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            tls: TlsConfig::default(),
        }
    }
}

impl DbConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// TLS settings for the Couchbase connection. Ignored unless `enabled`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Accept self-signed or otherwise unverifiable certificates.
    #[serde(default)]
    pub skip_insecure: bool,

    /// PEM root certificate to trust.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,

    /// PEM client certificate; requires `client_key`.
    #[serde(default)]
    pub client_cert: Option<PathBuf>,

    /// PEM client private key; requires `client_cert`.
    #[serde(default)]
    pub client_key: Option<PathBuf>,
}

/// Domain toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "enabled")]
    pub cluster: bool,
    #[serde(default = "enabled")]
    pub node: bool,
    #[serde(default = "enabled")]
    pub bucket: bool,
    #[serde(default = "enabled")]
    pub xdcr: bool,
}

fn enabled() -> bool {
    true
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            cluster: true,
            node: true,
            bucket: true,
            xdcr: true,
        }
    }
}

impl ScrapeConfig {
    /// Names of the enabled domains, in scrape order.
    pub fn enabled_domains(&self) -> Vec<&'static str> {
        [
            ("cluster", self.cluster),
            ("node", self.node),
            ("bucket", self.bucket),
            ("xdcr", self.xdcr),
        ]
        .into_iter()
        .filter_map(|(name, on)| on.then_some(name))
        .collect()
    }
}

/// Metric naming and filtering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Metric name prefix (default: "cb").
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Directory holding `{domain}.json` files overriding the bundled
    /// definitions. Domains without a file fall back to the bundled one.
    #[serde(default)]
    pub definitions_dir: Option<PathBuf>,

    /// Glob patterns for metric names to include (empty = all).
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns for metric names to exclude.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Labels added to every exported series.
    #[serde(default)]
    pub const_labels: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    "cb".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            definitions_dir: None,
            include: Vec::new(),
            exclude: Vec::new(),
            const_labels: BTreeMap::new(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.web.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.web.listen
            )));
        }

        if !self.web.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if RESERVED_PATHS.contains(&self.web.path.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is reserved",
                self.web.path
            )));
        }

        if self.web.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "web.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.db.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "db.timeout_secs must be > 0".to_string(),
            ));
        }

        if self.db.max_concurrent_fetches == 0 {
            return Err(ConfigError::Validation(
                "db.max_concurrent_fetches must be > 0".to_string(),
            ));
        }

        match reqwest::Url::parse(&self.db.uri) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Invalid Couchbase URI: {}",
                    self.db.uri
                )));
            }
        }

        let tls = &self.db.tls;
        if tls.enabled && tls.client_cert.is_some() != tls.client_key.is_some() {
            return Err(ConfigError::Validation(
                "TLS client_cert and client_key must be set together".to_string(),
            ));
        }

        if !self.metrics.namespace.is_empty() && !is_valid_metric_name(&self.metrics.namespace) {
            return Err(ConfigError::Validation(format!(
                "Invalid metric namespace: {}",
                self.metrics.namespace
            )));
        }

        for pattern in self.metrics.include.iter().chain(&self.metrics.exclude) {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::Validation(format!(
                    "Invalid metric pattern '{}': {}",
                    pattern, e
                )));
            }
        }

        if let Some(name) = self
            .metrics
            .const_labels
            .keys()
            .find(|name| !is_valid_label_name(name))
        {
            return Err(ConfigError::Validation(format!(
                "Invalid constant label name: {}",
                name
            )));
        }

        Ok(())
    }
}

/// Parse a duration given as plain seconds or with an `ms`, `s` or `m` suffix.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => value.split_at(idx),
        None => (value, "s"),
    };

    let amount: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}'", value))?;

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        _ => Err(format!("invalid duration unit in '{}'", value)),
    }
}

/// Parse a timeout for the `*_secs` settings. Accepts the [`parse_duration`]
/// forms but rejects zero and sub-second remainders.
pub fn parse_timeout_secs(value: &str) -> Result<u64, String> {
    let duration = parse_duration(value)?;
    if duration.subsec_nanos() != 0 {
        return Err(format!("timeout '{}' must be a whole number of seconds", value.trim()));
    }
    if duration.is_zero() {
        return Err("timeout must be > 0".to_string());
    }
    Ok(duration.as_secs())
}
