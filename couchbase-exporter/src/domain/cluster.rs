//! Cluster-wide metrics from `/pools/default`.

use async_trait::async_trait;
use couchbase_exporter_core::{ResponseSchema, flatten};

use super::{CollectError, Document, Domain, expect_object, fetch_json};
use crate::fetch::Fetch;

/// Response schema for the cluster overview document.
pub fn cluster_schema() -> ResponseSchema {
    ResponseSchema::new("cluster")
        .field("ram_total", "/storageTotals/ram/total")
        .field("ram_used", "/storageTotals/ram/used")
        .field("ram_used_by_data", "/storageTotals/ram/usedByData")
        .field("ram_quota_total", "/storageTotals/ram/quotaTotal")
        .field("ram_quota_used", "/storageTotals/ram/quotaUsed")
        .field("ram_quota_total_per_node", "/storageTotals/ram/quotaTotalPerNode")
        .field("ram_quota_used_per_node", "/storageTotals/ram/quotaUsedPerNode")
        .field("hdd_total", "/storageTotals/hdd/total")
        .field("hdd_used", "/storageTotals/hdd/used")
        .field("hdd_used_by_data", "/storageTotals/hdd/usedByData")
        .field("hdd_quota_total", "/storageTotals/hdd/quotaTotal")
        .field("hdd_free", "/storageTotals/hdd/free")
        .field("memory_quota", "/memoryQuota")
        .field("index_memory_quota", "/indexMemoryQuota")
        .field("fts_memory_quota", "/ftsMemoryQuota")
        .field("cbas_memory_quota", "/cbasMemoryQuota")
        .field("eventing_memory_quota", "/eventingMemoryQuota")
        .field("max_bucket_count", "/maxBucketCount")
        .count("node_count", "/nodes")
        .field("balanced", "/balanced")
        .equals("rebalance_running", "/rebalanceStatus", "running")
        .members("/counters")
}

/// Single unlabelled document describing the whole cluster.
pub struct ClusterDomain {
    schema: ResponseSchema,
}

impl ClusterDomain {
    pub fn new() -> Self {
        Self {
            schema: cluster_schema(),
        }
    }
}

impl Default for ClusterDomain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Domain for ClusterDomain {
    fn name(&self) -> &'static str {
        "cluster"
    }

    fn label_names(&self) -> &'static [&'static str] {
        &[]
    }

    async fn documents(
        &self,
        fetch: &dyn Fetch,
        route: &str,
    ) -> Result<Vec<Document>, CollectError> {
        let document = fetch_json(fetch, route).await?;
        expect_object(route, &document)?;

        Ok(vec![Document::new(Vec::new(), flatten(&self.schema, &document))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::StubFetch;
    use couchbase_exporter_core::Leaf;

    const POOLS_DEFAULT: &str = r#"{
        "storageTotals": {
            "ram": {"total": 16000000000, "used": 9000000000, "quotaTotal": 8000000000},
            "hdd": {"total": 100000000000, "free": 60000000000}
        },
        "memoryQuota": 4096,
        "balanced": true,
        "rebalanceStatus": "none",
        "nodes": [{"hostname": "a"}, {"hostname": "b"}],
        "counters": {"rebalance_start": 4, "failover_node": 1}
    }"#;

    #[tokio::test]
    async fn test_cluster_document() {
        let fetch = StubFetch::new().with("/pools/default", POOLS_DEFAULT);

        let docs = ClusterDomain::new()
            .documents(&fetch, "/pools/default")
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        let flat = &docs[0].flat;
        assert!(docs[0].labels.is_empty());
        assert_eq!(flat.get("ram_total"), Some(&Leaf::Scalar(16_000_000_000.0)));
        assert_eq!(flat.get("hdd_free"), Some(&Leaf::Scalar(60_000_000_000.0)));
        assert_eq!(flat.get("node_count"), Some(&Leaf::Scalar(2.0)));
        assert_eq!(flat.get("balanced"), Some(&Leaf::Scalar(1.0)));
        assert_eq!(flat.get("rebalance_running"), Some(&Leaf::Scalar(0.0)));
        assert_eq!(flat.get("rebalance_start"), Some(&Leaf::Scalar(4.0)));
        assert!(!flat.contains("failover"));
        assert!(!flat.contains("hdd_used"));
    }

    #[tokio::test]
    async fn test_cluster_rejects_non_object() {
        let fetch = StubFetch::new().with("/pools/default", "[]");

        let result = ClusterDomain::new()
            .documents(&fetch, "/pools/default")
            .await;
        assert!(matches!(result, Err(CollectError::Shape { .. })));
    }
}
