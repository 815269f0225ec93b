//! Prometheus exporter for Couchbase clusters.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use couchbase_exporter_common::{LogFormat, init_tracing};
use tokio::sync::watch;
use tracing::{error, info};

use couchbase_exporter::config::parse_timeout_secs;
use couchbase_exporter::{Exporter, ExporterConfig, HttpFetcher, HttpServer};

/// Prometheus exporter for Couchbase clusters.
///
/// Command-line flags and environment variables override the configuration file.
#[derive(Parser, Debug)]
#[command(name = "couchbase-exporter")]
#[command(about = "Export Couchbase cluster metrics for Prometheus")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, env = "CB_EXPORTER_CONFIG")]
    config: Option<String>,

    /// Address to listen on for HTTP requests.
    #[arg(long = "web.listen-address", env = "CB_EXPORTER_LISTEN_ADDR")]
    listen: Option<String>,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", env = "CB_EXPORTER_TELEMETRY_PATH")]
    telemetry_path: Option<String>,

    /// Scrape request timeout in whole seconds (e.g. "10s").
    #[arg(long = "web.timeout", env = "CB_EXPORTER_SERVER_TIMEOUT", value_parser = parse_timeout_secs)]
    web_timeout: Option<u64>,

    /// Base URI of a Couchbase node.
    #[arg(long = "db.uri", env = "CB_EXPORTER_DB_URI")]
    db_uri: Option<String>,

    /// Couchbase username.
    #[arg(long = "db.user", env = "CB_EXPORTER_DB_USER")]
    db_user: Option<String>,

    /// Couchbase password.
    #[arg(long = "db.password", env = "CB_EXPORTER_DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// Per-request timeout against Couchbase in whole seconds (e.g. "10s").
    #[arg(long = "db.timeout", env = "CB_EXPORTER_DB_TIMEOUT", value_parser = parse_timeout_secs)]
    db_timeout: Option<u64>,

    /// Enable TLS for the Couchbase connection.
    #[arg(long = "tls.enabled", env = "CB_EXPORTER_TLS_ENABLED")]
    tls_enabled: Option<bool>,

    /// Skip server certificate verification.
    #[arg(long = "tls.skip-insecure", env = "CB_EXPORTER_TLS_SKIP_INSECURE")]
    tls_skip_insecure: Option<bool>,

    /// Root certificate (PEM).
    #[arg(long = "tls.ca-cert", env = "CB_EXPORTER_TLS_CA_CERT")]
    tls_ca_cert: Option<String>,

    /// Client certificate (PEM).
    #[arg(long = "tls.client-cert", env = "CB_EXPORTER_TLS_CLIENT_CERT")]
    tls_client_cert: Option<String>,

    /// Client private key (PEM).
    #[arg(long = "tls.client-key", env = "CB_EXPORTER_TLS_CLIENT_KEY")]
    tls_client_key: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long = "log.level", env = "CB_EXPORTER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json).
    #[arg(long = "log.format", env = "CB_EXPORTER_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Scrape cluster metrics.
    #[arg(long = "scrape.cluster", env = "CB_EXPORTER_SCRAPE_CLUSTER")]
    scrape_cluster: Option<bool>,

    /// Scrape node metrics.
    #[arg(long = "scrape.node", env = "CB_EXPORTER_SCRAPE_NODE")]
    scrape_node: Option<bool>,

    /// Scrape bucket metrics.
    #[arg(long = "scrape.bucket", env = "CB_EXPORTER_SCRAPE_BUCKET")]
    scrape_bucket: Option<bool>,

    /// Scrape XDCR metrics.
    #[arg(long = "scrape.xdcr", env = "CB_EXPORTER_SCRAPE_XDCR")]
    scrape_xdcr: Option<bool>,
}

impl Args {
    /// Apply command-line and environment overrides on top of `config`.
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(listen) = self.listen {
            config.web.listen = listen;
        }
        if let Some(path) = self.telemetry_path {
            config.web.path = path;
        }
        if let Some(timeout) = self.web_timeout {
            config.web.timeout_secs = timeout;
        }
        if let Some(uri) = self.db_uri {
            config.db.uri = uri;
        }
        if let Some(user) = self.db_user {
            config.db.user = user;
        }
        if let Some(password) = self.db_password {
            config.db.password = password;
        }
        if let Some(timeout) = self.db_timeout {
            config.db.timeout_secs = timeout;
        }
        if let Some(enabled) = self.tls_enabled {
            config.db.tls.enabled = enabled;
        }
        if let Some(skip) = self.tls_skip_insecure {
            config.db.tls.skip_insecure = skip;
        }
        if let Some(path) = self.tls_ca_cert {
            config.db.tls.ca_cert = Some(path.into());
        }
        if let Some(path) = self.tls_client_cert {
            config.db.tls.client_cert = Some(path.into());
        }
        if let Some(path) = self.tls_client_key {
            config.db.tls.client_key = Some(path.into());
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(on) = self.scrape_cluster {
            config.scrape.cluster = on;
        }
        if let Some(on) = self.scrape_node {
            config.scrape.node = on;
        }
        if let Some(on) = self.scrape_bucket {
            config.scrape.bucket = on;
        }
        if let Some(on) = self.scrape_xdcr {
            config.scrape.xdcr = on;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    args.apply(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Couchbase exporter"
    );
    info!(
        listen = %config.web.listen,
        path = %config.web.path,
        timeout_secs = config.web.timeout_secs,
        "Web settings"
    );
    info!(
        uri = %config.db.uri,
        user = %config.db.user,
        timeout_secs = config.db.timeout_secs,
        tls = config.db.tls.enabled,
        tls_skip_insecure = config.db.tls.skip_insecure,
        "Couchbase settings"
    );
    info!(
        domains = ?config.scrape.enabled_domains(),
        namespace = %config.metrics.namespace,
        "Scrape settings"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let fetcher = Arc::new(HttpFetcher::new(&config.db)?);
    let exporter = Arc::new(Exporter::new(&config, fetcher)?);

    let listen_addr: SocketAddr = config
        .web
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let http_server = HttpServer::new(
        exporter.clone(),
        listen_addr,
        config.web.path.clone(),
        Duration::from_secs(config.web.timeout_secs),
    );

    let mut http_task = tokio::spawn(http_server.run(shutdown_rx));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
        result = &mut http_task => {
            let err = match result {
                Ok(Ok(())) => anyhow::anyhow!("HTTP server stopped unexpectedly"),
                Ok(Err(e)) => e,
                Err(e) => anyhow::anyhow!("HTTP server task failed: {}", e),
            };
            error!("{:#}", err);
            return Err(err);
        }
    }

    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(5), http_task).await {
        Ok(Ok(Err(e))) => error!("HTTP server error: {}", e),
        Ok(Err(e)) => error!("HTTP server task failed: {}", e),
        Err(_) => error!("HTTP server did not stop within 5s"),
        Ok(Ok(Ok(()))) => {}
    }

    let stats = exporter.stats();
    info!(
        scrapes = stats.scrapes,
        domain_failures = ?stats.domain_failures,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
