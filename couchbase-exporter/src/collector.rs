//! Per-domain scrape: fetch, flatten, match.

use std::sync::Arc;
use std::time::{Duration, Instant};

use couchbase_exporter_core::naming::build_fq_name;
use couchbase_exporter_core::{LoadError, MetricDescriptor, MetricKind, Registry, Sample};
use tracing::{debug, error};

use crate::domain::Domain;
use crate::fetch::Fetch;

/// Outcome of scraping one domain.
#[derive(Debug, Clone)]
pub struct DomainScrape {
    pub domain: String,
    /// Matched samples followed by the `up` and `scrape_duration_seconds` gauges.
    pub samples: Vec<Sample>,
    pub success: bool,
    pub duration: Duration,
}

/// Pairs a [`Domain`] with the registry built from its definitions.
pub struct DomainCollector {
    domain: Box<dyn Domain>,
    registry: Registry,
    up: Arc<MetricDescriptor>,
    duration: Arc<MetricDescriptor>,
}

impl DomainCollector {
    /// Create a collector, checking that every definition carries the
    /// labels the domain produces.
    pub fn new(
        domain: Box<dyn Domain>,
        registry: Registry,
        namespace: &str,
    ) -> Result<Self, LoadError> {
        registry.check_labels(domain.label_names())?;

        let subsystem = registry.domain().to_string();
        let up = MetricDescriptor::new(
            "up",
            build_fq_name(namespace, &subsystem, "up"),
            format!("Whether the last {} scrape succeeded", subsystem),
            Vec::new(),
            MetricKind::Gauge,
        );
        let duration = MetricDescriptor::new(
            "scrape_duration_seconds",
            build_fq_name(namespace, &subsystem, "scrape_duration_seconds"),
            format!("Time spent scraping the {} domain", subsystem),
            Vec::new(),
            MetricKind::Gauge,
        );

        Ok(Self {
            domain,
            registry,
            up: Arc::new(up),
            duration: Arc::new(duration),
        })
    }

    pub fn name(&self) -> &str {
        self.registry.domain()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Every descriptor this collector may emit.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<MetricDescriptor>> {
        self.registry
            .descriptors()
            .iter()
            .chain([&self.up, &self.duration])
    }

    /// Scrape the domain once.
    ///
    /// A domain-level failure is logged and reported through `up = 0`; it
    /// never propagates to the caller.
    pub async fn collect(&self, fetch: &dyn Fetch) -> DomainScrape {
        let started = Instant::now();
        let result = self.domain.documents(fetch, self.registry.route()).await;

        let mut samples = Vec::new();
        let success = match result {
            Ok(documents) => {
                for document in &documents {
                    samples.extend(self.registry.samples(&document.flat, &document.labels));
                }
                debug!(
                    domain = self.name(),
                    documents = documents.len(),
                    samples = samples.len(),
                    "Domain scraped"
                );
                true
            }
            Err(e) => {
                error!(domain = self.name(), error = %e, "Domain scrape failed");
                false
            }
        };

        let duration = started.elapsed();
        samples.push(Sample::new(
            self.up.clone(),
            if success { 1.0 } else { 0.0 },
            Vec::new(),
        ));
        samples.push(Sample::new(
            self.duration.clone(),
            duration.as_secs_f64(),
            Vec::new(),
        ));

        DomainScrape {
            domain: self.name().to_string(),
            samples,
            success,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::StubFetch;
    use crate::domain::{BucketDomain, ClusterDomain, stats_route};
    use couchbase_exporter_core::parse_definitions;

    fn bucket_registry() -> Registry {
        let set = parse_definitions(
            "bucket",
            r#"{
                "name": "bucket",
                "route": "/pools/default/buckets",
                "metrics": [
                    {"id": "basic_item_count", "name": "basic_item_count", "description": "Items", "labels": ["bucket"]},
                    {"id": "cmd_get", "name": "cmd_get", "description": "Gets", "labels": ["bucket"]}
                ]
            }"#,
        )
        .unwrap();
        Registry::new(set, "cb")
    }

    fn value_of(scrape: &DomainScrape, name: &str, label: Option<&str>) -> Option<f64> {
        scrape
            .samples
            .iter()
            .find(|s| {
                s.descriptor.name == name
                    && label.is_none_or(|l| s.label_values.first().map(String::as_str) == Some(l))
            })
            .map(|s| s.value)
    }

    #[test]
    fn test_label_mismatch_rejected() {
        let result = DomainCollector::new(Box::new(ClusterDomain::new()), bucket_registry(), "cb");
        assert!(matches!(result, Err(LoadError::LabelMismatch { .. })));
    }

    #[test]
    fn test_descriptors_include_scrape_gauges() {
        let collector =
            DomainCollector::new(Box::new(BucketDomain::new()), bucket_registry(), "cb").unwrap();

        let names: Vec<_> = collector.descriptors().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "cb_bucket_basic_item_count",
                "cb_bucket_cmd_get",
                "cb_bucket_up",
                "cb_bucket_scrape_duration_seconds"
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_partial_failure() {
        let route = "/pools/default/buckets";
        let fetch = StubFetch::new()
            .with(
                route,
                r#"[
                    {"name": "a", "basicStats": {"itemCount": 1}},
                    {"name": "b", "basicStats": {"itemCount": 2}},
                    {"name": "c", "basicStats": {"itemCount": 3}}
                ]"#,
            )
            .with(&stats_route(route, "a"), r#"{"op": {"samples": {"cmd_get": [1, 2, 5]}}}"#)
            .failing(&stats_route(route, "b"), 502)
            .with(&stats_route(route, "c"), r#"{"op": {"samples": {"cmd_get": [4]}}}"#);
        let collector =
            DomainCollector::new(Box::new(BucketDomain::new()), bucket_registry(), "cb").unwrap();

        let scrape = collector.collect(&fetch).await;

        assert!(scrape.success);
        assert_eq!(value_of(&scrape, "cb_bucket_cmd_get", Some("a")), Some(5.0));
        assert_eq!(value_of(&scrape, "cb_bucket_cmd_get", Some("b")), None);
        assert_eq!(value_of(&scrape, "cb_bucket_cmd_get", Some("c")), Some(4.0));
        assert_eq!(value_of(&scrape, "cb_bucket_basic_item_count", Some("b")), Some(2.0));
        assert_eq!(value_of(&scrape, "cb_bucket_up", None), Some(1.0));
    }

    #[tokio::test]
    async fn test_collect_domain_failure() {
        let fetch = StubFetch::new().failing("/pools/default/buckets", 401);
        let collector =
            DomainCollector::new(Box::new(BucketDomain::new()), bucket_registry(), "cb").unwrap();

        let scrape = collector.collect(&fetch).await;

        assert!(!scrape.success);
        assert_eq!(scrape.samples.len(), 2);
        assert_eq!(value_of(&scrape, "cb_bucket_up", None), Some(0.0));
        assert!(value_of(&scrape, "cb_bucket_scrape_duration_seconds", None).is_some());
    }
}
