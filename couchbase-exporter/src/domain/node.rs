//! Per-node metrics from the `nodes` array of `/pools/default`.

use async_trait::async_trait;
use couchbase_exporter_core::{ResponseSchema, flatten};
use serde_json::Value;
use tracing::warn;

use super::{CollectError, Document, Domain, array_at, fetch_json};
use crate::fetch::Fetch;

/// Response schema for one entry of the `nodes` array.
pub fn node_schema() -> ResponseSchema {
    ResponseSchema::new("node")
        .equals("healthy", "/status", "healthy")
        .equals("active", "/clusterMembership", "active")
        .field("uptime", "/uptime")
        .field("memory_total", "/memoryTotal")
        .field("memory_free", "/memoryFree")
        .field("mcd_memory_reserved", "/mcdMemoryReserved")
        .field("mcd_memory_allocated", "/mcdMemoryAllocated")
        .members("/systemStats")
        .members("/interestingStats")
}

/// One document per cluster node, labelled by hostname.
pub struct NodeDomain {
    schema: ResponseSchema,
}

impl NodeDomain {
    pub fn new() -> Self {
        Self {
            schema: node_schema(),
        }
    }
}

impl Default for NodeDomain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Domain for NodeDomain {
    fn name(&self) -> &'static str {
        "node"
    }

    fn label_names(&self) -> &'static [&'static str] {
        &["node"]
    }

    async fn documents(
        &self,
        fetch: &dyn Fetch,
        route: &str,
    ) -> Result<Vec<Document>, CollectError> {
        let document = fetch_json(fetch, route).await?;
        let nodes = array_at(route, &document, "/nodes")?;

        let mut documents = Vec::with_capacity(nodes.len());
        for node in nodes {
            let Some(hostname) = node.get("hostname").and_then(Value::as_str) else {
                warn!(route, "Node entry without hostname skipped");
                continue;
            };
            documents.push(Document::new(
                vec![hostname.to_string()],
                flatten(&self.schema, node),
            ));
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::StubFetch;
    use couchbase_exporter_core::Leaf;

    #[tokio::test]
    async fn test_one_document_per_node() {
        let body = r#"{
            "nodes": [
                {
                    "hostname": "10.0.0.1:8091",
                    "status": "healthy",
                    "clusterMembership": "active",
                    "uptime": "3600",
                    "systemStats": {"cpu_utilization_rate": 12.5, "swap_used": 0},
                    "interestingStats": {"curr_items": 1000}
                },
                {"status": "healthy"},
                {
                    "hostname": "10.0.0.2:8091",
                    "status": "warmup",
                    "clusterMembership": "inactiveFailed"
                }
            ]
        }"#;
        let fetch = StubFetch::new().with("/pools/default", body);

        let docs = NodeDomain::new()
            .documents(&fetch, "/pools/default")
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].labels, vec!["10.0.0.1:8091"]);
        assert_eq!(docs[0].flat.get("healthy"), Some(&Leaf::Scalar(1.0)));
        assert_eq!(docs[0].flat.get("uptime").unwrap().current_value(), Some(3600.0));
        assert_eq!(docs[0].flat.get("cpu_utilization_rate"), Some(&Leaf::Scalar(12.5)));
        assert_eq!(docs[0].flat.get("curr_items"), Some(&Leaf::Scalar(1000.0)));

        assert_eq!(docs[1].labels, vec!["10.0.0.2:8091"]);
        assert_eq!(docs[1].flat.get("healthy"), Some(&Leaf::Scalar(0.0)));
        assert_eq!(docs[1].flat.get("active"), Some(&Leaf::Scalar(0.0)));
    }

    #[tokio::test]
    async fn test_missing_nodes_array() {
        let fetch = StubFetch::new().with("/pools/default", r#"{"name": "default"}"#);

        let result = NodeDomain::new().documents(&fetch, "/pools/default").await;
        assert!(matches!(result, Err(CollectError::Shape { .. })));
    }
}
