//! Per-bucket metrics.
//!
//! Buckets are discovered from the bucket list route. Each entry already
//! carries basic quota and usage figures; the detailed operation statistics
//! come from a second request per bucket to `{route}/{name}/stats`, issued
//! concurrently. A failed stats request only loses that bucket's stats.

use async_trait::async_trait;
use couchbase_exporter_core::{ResponseSchema, SampleOrder, flatten};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;
use tracing::{debug, warn};

use super::{CollectError, Document, Domain, array_at, fetch_json, parse_json};
use crate::fetch::Fetch;

/// Characters left unescaped in a bucket name path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.');

/// Response schema for one entry of the bucket list.
pub fn bucket_info_schema() -> ResponseSchema {
    ResponseSchema::new("bucket_info")
        .field("basic_quota_percent_used", "/basicStats/quotaPercentUsed")
        .field("basic_ops_per_sec", "/basicStats/opsPerSec")
        .field("basic_disk_fetches", "/basicStats/diskFetches")
        .field("basic_item_count", "/basicStats/itemCount")
        .field("basic_disk_used", "/basicStats/diskUsed")
        .field("basic_data_used", "/basicStats/dataUsed")
        .field("basic_mem_used", "/basicStats/memUsed")
        .field("quota_ram", "/quota/ram")
        .field("quota_raw_ram", "/quota/rawRAM")
        .field("replica_number", "/replicaNumber")
}

/// Response schema for a bucket stats document. Sample windows are
/// returned oldest first.
pub fn bucket_stats_schema() -> ResponseSchema {
    ResponseSchema::new("bucket_stats")
        .with_order(SampleOrder::OldestFirst)
        .members("/op/samples")
}

/// Stats route for a bucket discovered under `route`.
pub fn stats_route(route: &str, bucket: &str) -> String {
    format!(
        "{}/{}/stats",
        route.trim_end_matches('/'),
        utf8_percent_encode(bucket, PATH_SEGMENT)
    )
}

/// One document per bucket, labelled by bucket name.
pub struct BucketDomain {
    info: ResponseSchema,
    stats: ResponseSchema,
}

impl BucketDomain {
    pub fn new() -> Self {
        Self {
            info: bucket_info_schema(),
            stats: bucket_stats_schema(),
        }
    }
}

impl Default for BucketDomain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Domain for BucketDomain {
    fn name(&self) -> &'static str {
        "bucket"
    }

    fn label_names(&self) -> &'static [&'static str] {
        &["bucket"]
    }

    async fn documents(
        &self,
        fetch: &dyn Fetch,
        route: &str,
    ) -> Result<Vec<Document>, CollectError> {
        let listing = fetch_json(fetch, route).await?;
        let entries = array_at(route, &listing, "")?;

        let buckets: Vec<(&str, &Value)> = entries
            .iter()
            .filter_map(|entry| match entry.get("name").and_then(Value::as_str) {
                Some(name) => Some((name, entry)),
                None => {
                    warn!(route, "Bucket entry without name skipped");
                    None
                }
            })
            .collect();

        let routes: Vec<String> = buckets
            .iter()
            .map(|(name, _)| stats_route(route, name))
            .collect();
        let mut responses = fetch.fetch_many(routes).await;

        let mut documents = Vec::with_capacity(buckets.len());
        for (name, entry) in buckets {
            let mut flat = flatten(&self.info, entry);

            let stats_path = stats_route(route, name);
            match responses.remove(&stats_path) {
                Some(Ok(body)) => match parse_json(&stats_path, &body) {
                    Ok(stats) => flat.merge(flatten(&self.stats, &stats)),
                    Err(e) => warn!(bucket = name, error = %e, "Bucket stats skipped"),
                },
                Some(Err(e)) => warn!(bucket = name, error = %e, "Bucket stats skipped"),
                None => warn!(bucket = name, route = %stats_path, "No stats response"),
            }

            documents.push(Document::new(vec![name.to_string()], flat));
        }

        debug!(buckets = documents.len(), "Buckets read");
        Ok(documents)
    }
}
