//! Authenticated access to the Couchbase REST API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use reqwest::{Certificate, Client, Identity};
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::DbConfig;

/// Errors raised while fetching a route.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {route} failed: {source}")]
    Request {
        route: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {route} timed out")]
    Timeout { route: String },

    #[error("Request to {route} returned HTTP {status}")]
    Status { route: String, status: u16 },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    fn from_request(route: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout {
                route: route.to_string(),
            }
        } else {
            FetchError::Request {
                route: route.to_string(),
                source,
            }
        }
    }
}

/// Source of raw API responses, addressed by route relative to the base URI.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch one route and return the response body.
    async fn fetch(&self, route: &str) -> Result<Bytes, FetchError>;

    /// Upper bound on requests issued concurrently by [`Fetch::fetch_many`].
    fn max_concurrency(&self) -> usize {
        8
    }

    /// Fetch several routes concurrently. Every route gets its own result;
    /// one failure never affects the others.
    async fn fetch_many(&self, routes: Vec<String>) -> HashMap<String, Result<Bytes, FetchError>> {
        let limit = self.max_concurrency().max(1);

        stream::iter(routes)
            .map(|route| async move {
                let result = self.fetch(&route).await;
                (route, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }
}

/// [`Fetch`] implementation over HTTP(S) with basic auth.
pub struct HttpFetcher {
    client: Client,
    base: String,
    credentials: Option<(String, String)>,
    max_concurrency: usize,
}

impl HttpFetcher {
    /// Build a fetcher from the connection settings.
    pub fn new(config: &DbConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder().timeout(config.timeout());

        let tls = &config.tls;
        if tls.enabled {
            if tls.skip_insecure {
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(path) = &tls.ca_cert {
                let pem = read_pem(path)?;
                let certificate =
                    Certificate::from_pem(&pem).map_err(|e| FetchError::Tls(e.to_string()))?;
                builder = builder.add_root_certificate(certificate);
            }

            if let (Some(cert), Some(key)) = (&tls.client_cert, &tls.client_key) {
                let mut pem = read_pem(cert)?;
                pem.push(b'\n');
                pem.extend(read_pem(key)?);
                let identity =
                    Identity::from_pem(&pem).map_err(|e| FetchError::Tls(e.to_string()))?;
                builder = builder.identity(identity);
            }
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        let credentials =
            (!config.user.is_empty()).then(|| (config.user.clone(), config.password.clone()));

        debug!(
            uri = %config.uri,
            tls = tls.enabled,
            authenticated = credentials.is_some(),
            "HTTP fetcher ready"
        );

        Ok(Self {
            client,
            base: config.uri.trim_end_matches('/').to_string(),
            credentials,
            max_concurrency: config.max_concurrent_fetches,
        })
    }

    /// Absolute URL for a route.
    pub fn url(&self, route: &str) -> String {
        if route.starts_with('/') {
            format!("{}{}", self.base, route)
        } else {
            format!("{}/{}", self.base, route)
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, route: &str) -> Result<Bytes, FetchError> {
        let url = self.url(route);
        trace!(url = %url, "GET");

        let mut request = self.client.get(&url);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_request(route, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                route: route.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::from_request(route, e))
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, FetchError> {
    std::fs::read(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetch for Echo {
        async fn fetch(&self, route: &str) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if route.contains("broken") {
                return Err(FetchError::Status {
                    route: route.to_string(),
                    status: 500,
                });
            }
            Ok(Bytes::from(route.to_string()))
        }

        fn max_concurrency(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_fetch_many_isolates_failures() {
        let fetcher = Echo {
            calls: AtomicUsize::new(0),
        };
        let routes = vec![
            "/a".to_string(),
            "/broken".to_string(),
            "/c".to_string(),
        ];

        let results = fetcher.fetch_many(routes).await;

        assert_eq!(results.len(), 3);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(results["/a"].as_ref().unwrap(), &Bytes::from("/a"));
        assert_eq!(results["/c"].as_ref().unwrap(), &Bytes::from("/c"));
        assert!(matches!(
            results["/broken"],
            Err(FetchError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_many_empty() {
        let fetcher = Echo {
            calls: AtomicUsize::new(0),
        };
        assert!(fetcher.fetch_many(Vec::new()).await.is_empty());
    }

    #[test]
    fn test_url_joining() {
        let config = DbConfig {
            uri: "http://cb1:8091/".to_string(),
            ..DbConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();

        assert_eq!(fetcher.url("/pools/default"), "http://cb1:8091/pools/default");
        assert_eq!(fetcher.url("pools/default"), "http://cb1:8091/pools/default");
        assert!(fetcher.credentials.is_none());
    }

    #[test]
    fn test_missing_ca_cert() {
        let mut config = DbConfig::default();
        config.tls.enabled = true;
        config.tls.ca_cert = Some(PathBuf::from("/nonexistent/ca.pem"));

        assert!(matches!(
            HttpFetcher::new(&config),
            Err(FetchError::Io { .. })
        ));
    }

    #[test]
    fn test_tls_settings_ignored_when_disabled() {
        let mut config = DbConfig::default();
        config.tls.ca_cert = Some(PathBuf::from("/nonexistent/ca.pem"));
        config.user = "monitor".to_string();

        let fetcher = HttpFetcher::new(&config).unwrap();
        assert!(fetcher.credentials.is_some());
    }
}
