//! Scrape domains: how each group of metrics is fetched and split into
//! labelled documents.
//!
//! Each domain knows the shape of the API responses for its route and the
//! label it uses to tell documents apart. Metric selection and naming live
//! in the definitions; a domain only produces flattened documents.

mod bucket;
mod cluster;
mod node;
mod xdcr;

pub use bucket::{BucketDomain, bucket_info_schema, bucket_stats_schema, stats_route};
pub use cluster::{ClusterDomain, cluster_schema};
pub use node::{NodeDomain, node_schema};
pub use xdcr::{XdcrDomain, xdcr_schema};

use async_trait::async_trait;
use couchbase_exporter_core::FlattenedResponse;
use serde_json::Value;
use thiserror::Error;

use crate::fetch::{Fetch, FetchError};

/// Errors that abort a whole domain for one scrape.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Failed to fetch {route}: {source}")]
    Fetch {
        route: String,
        #[source]
        source: FetchError,
    },

    #[error("Malformed JSON from {route}: {source}")]
    Parse {
        route: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected response from {route}: {message}")]
    Shape { route: String, message: String },
}

/// One flattened response document plus the label values identifying it.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Values for the domain's label names, in order.
    pub labels: Vec<String>,
    pub flat: FlattenedResponse,
}

impl Document {
    pub fn new(labels: Vec<String>, flat: FlattenedResponse) -> Self {
        Self { labels, flat }
    }
}

/// A group of metrics scraped from one API route.
#[async_trait]
pub trait Domain: Send + Sync {
    /// Domain name, matching the definition set it is paired with.
    fn name(&self) -> &'static str;

    /// Label names every metric of this domain carries.
    fn label_names(&self) -> &'static [&'static str];

    /// Fetch `route` and produce one document per labelled entity.
    async fn documents(&self, fetch: &dyn Fetch, route: &str)
    -> Result<Vec<Document>, CollectError>;
}

/// Look up a domain implementation by name.
pub fn domain_for(name: &str) -> Option<Box<dyn Domain>> {
    match name {
        "cluster" => Some(Box::new(ClusterDomain::new())),
        "node" => Some(Box::new(NodeDomain::new())),
        "bucket" => Some(Box::new(BucketDomain::new())),
        "xdcr" => Some(Box::new(XdcrDomain::new())),
        _ => None,
    }
}

/// Fetch a route and parse the body as JSON.
pub(crate) async fn fetch_json(fetch: &dyn Fetch, route: &str) -> Result<Value, CollectError> {
    let body = fetch
        .fetch(route)
        .await
        .map_err(|source| CollectError::Fetch {
            route: route.to_string(),
            source,
        })?;
    parse_json(route, &body)
}

pub(crate) fn parse_json(route: &str, body: &[u8]) -> Result<Value, CollectError> {
    serde_json::from_slice(body).map_err(|source| CollectError::Parse {
        route: route.to_string(),
        source,
    })
}

/// The array found at `pointer` (empty pointer = the document itself).
pub(crate) fn array_at<'a>(
    route: &str,
    document: &'a Value,
    pointer: &str,
) -> Result<&'a [Value], CollectError> {
    document
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| CollectError::Shape {
            route: route.to_string(),
            message: if pointer.is_empty() {
                "expected a JSON array".to_string()
            } else {
                format!("expected a JSON array at {}", pointer)
            },
        })
}

/// Require the document to be a JSON object.
pub(crate) fn expect_object(route: &str, document: &Value) -> Result<(), CollectError> {
    if document.is_object() {
        Ok(())
    } else {
        Err(CollectError::Shape {
            route: route.to_string(),
            message: "expected a JSON object".to_string(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubFetch;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_domain_for() {
        for name in couchbase_exporter_core::BUNDLED_DOMAINS {
            let domain = domain_for(name).unwrap();
            assert_eq!(domain.name(), *name);
        }
        assert!(domain_for("query").is_none());
    }

    #[tokio::test]
    async fn test_fetch_json_errors() {
        let fetch = StubFetch::new().with("/bad", "{not json").failing("/down", 503);

        assert!(matches!(
            fetch_json(&fetch, "/bad").await,
            Err(CollectError::Parse { .. })
        ));
        assert!(matches!(
            fetch_json(&fetch, "/down").await,
            Err(CollectError::Fetch { .. })
        ));
    }

    #[test]
    fn test_array_at() {
        let doc = json!({"nodes": [1, 2], "name": "x"});

        assert_eq!(array_at("/r", &doc, "/nodes").unwrap().len(), 2);
        assert!(array_at("/r", &doc, "/name").is_err());
        assert!(array_at("/r", &doc, "").is_err());
        assert_eq!(array_at("/r", &json!([]), "").unwrap().len(), 0);
    }
}
