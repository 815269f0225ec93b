//! Per-domain registry of metric descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::definitions::MetricDefinitionSet;
use crate::error::{LoadError, Result};
use crate::flatten::{FlattenedResponse, Leaf};
use crate::metric::{MetricDescriptor, Sample};
use crate::naming::build_fq_name;

/// Immutable mapping from metric id to descriptor for one domain.
///
/// Built once at startup and shared read-only between scrapes.
#[derive(Debug, Clone)]
pub struct Registry {
    domain: String,
    route: String,
    descriptors: Vec<Arc<MetricDescriptor>>,
    by_id: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry from a validated definition set.
    pub fn new(set: MetricDefinitionSet, namespace: &str) -> Self {
        Self::with_filter(set, namespace, |_| true)
    }

    /// Build a registry keeping only the descriptors accepted by `keep`.
    pub fn with_filter<F>(set: MetricDefinitionSet, namespace: &str, keep: F) -> Self
    where
        F: Fn(&MetricDescriptor) -> bool,
    {
        let mut descriptors = Vec::with_capacity(set.metrics.len());
        let mut by_id = HashMap::with_capacity(set.metrics.len());

        for definition in set.metrics {
            let descriptor = MetricDescriptor::new(
                definition.id,
                build_fq_name(namespace, &set.name, &definition.name),
                definition.description,
                definition.labels,
                definition.kind,
            );

            if !keep(&descriptor) {
                trace!(domain = %set.name, metric = %descriptor.name, "Metric filtered out");
                continue;
            }

            by_id.insert(descriptor.id.clone(), descriptors.len());
            descriptors.push(Arc::new(descriptor));
        }

        Self {
            domain: set.name,
            route: set.route,
            descriptors,
            by_id,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Descriptors in definition order.
    pub fn descriptors(&self) -> &[Arc<MetricDescriptor>] {
        &self.descriptors
    }

    pub fn get(&self, id: &str) -> Option<&Arc<MetricDescriptor>> {
        self.by_id.get(id).map(|&i| &self.descriptors[i])
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Ensure every descriptor declares exactly the labels the domain provides.
    pub fn check_labels(&self, expected: &[&str]) -> Result<()> {
        for descriptor in &self.descriptors {
            if descriptor.labels.iter().map(String::as_str).ne(expected.iter().copied()) {
                return Err(LoadError::LabelMismatch {
                    domain: self.domain.clone(),
                    id: descriptor.id.clone(),
                    declared: descriptor.labels.clone(),
                    expected: expected.iter().map(|s| s.to_string()).collect(),
                });
            }
        }
        Ok(())
    }

    /// Match a flattened document against the registry.
    ///
    /// Emits one sample per descriptor whose id has a leaf with a current
    /// value. Missing ids, empty series and non-numeric text are skipped.
    pub fn samples(&self, flat: &FlattenedResponse, label_values: &[String]) -> Vec<Sample> {
        let mut samples = Vec::new();

        for descriptor in &self.descriptors {
            let Some(leaf) = flat.get(&descriptor.id) else {
                continue;
            };

            match leaf.current_value() {
                Some(value) => samples.push(Sample::new(
                    descriptor.clone(),
                    value,
                    label_values.to_vec(),
                )),
                None => {
                    if let Leaf::Text(text) = leaf {
                        trace!(
                            domain = %self.domain,
                            id = %descriptor.id,
                            value = %text,
                            "Non-numeric value skipped"
                        );
                    }
                }
            }
        }

        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::parse_definitions;
    use crate::flatten::Series;
    use crate::metric::MetricKind;
    use crate::schema::SampleOrder;

    fn bucket_set() -> MetricDefinitionSet {
        parse_definitions(
            "bucket",
            r#"{
                "name": "bucket",
                "route": "/pools/default/buckets",
                "metrics": [
                    {"id": "cmd_get", "name": "cmd_get", "description": "Gets", "labels": ["bucket"]},
                    {"id": "mem_used", "name": "mem_used_bytes", "description": "Memory", "labels": ["bucket"]},
                    {"id": "item_count", "name": "items", "description": "Items", "labels": ["bucket"], "type": "counter"}
                ]
            }"#,
        )
        .unwrap()
    }

    fn series(samples: &[f64]) -> Leaf {
        Leaf::Series(Series::new(samples.to_vec(), SampleOrder::OldestFirst))
    }

    #[test]
    fn test_registry_builds_fq_names() {
        let registry = Registry::new(bucket_set(), "cb");

        assert_eq!(registry.domain(), "bucket");
        assert_eq!(registry.route(), "/pools/default/buckets");
        assert_eq!(registry.len(), 3);

        let descriptor = registry.get("mem_used").unwrap();
        assert_eq!(descriptor.name, "cb_bucket_mem_used_bytes");
        assert_eq!(descriptor.labels, vec!["bucket"]);
        assert_eq!(registry.get("item_count").unwrap().kind, MetricKind::Counter);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_filter() {
        let registry =
            Registry::with_filter(bucket_set(), "cb", |d| !d.name.ends_with("_bytes"));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("mem_used").is_none());
        assert_eq!(registry.get("item_count").unwrap().name, "cb_bucket_items");
    }

    #[test]
    fn test_latest_value_emitted() {
        let registry = Registry::new(bucket_set(), "cb");
        let flat: FlattenedResponse = [("cmd_get".to_string(), series(&[1.0, 2.0, 5.0]))]
            .into_iter()
            .collect();

        let samples = registry.samples(&flat, &["beer-sample".to_string()]);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 5.0);
        assert_eq!(samples[0].descriptor.id, "cmd_get");
        assert_eq!(samples[0].label_values, vec!["beer-sample"]);
    }

    #[test]
    fn test_empty_series_skipped() {
        let registry = Registry::new(bucket_set(), "cb");
        let flat: FlattenedResponse = [
            ("cmd_get".to_string(), series(&[])),
            ("item_count".to_string(), Leaf::Scalar(7.0)),
        ]
        .into_iter()
        .collect();

        let samples = registry.samples(&flat, &["b".to_string()]);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].descriptor.id, "item_count");
        assert_eq!(samples[0].value, 7.0);
    }

    #[test]
    fn test_unmatched_and_unknown_ids_skipped() {
        let registry = Registry::new(bucket_set(), "cb");
        let flat: FlattenedResponse = [
            ("not_registered".to_string(), Leaf::Scalar(1.0)),
            ("mem_used".to_string(), Leaf::Text("n/a".to_string())),
        ]
        .into_iter()
        .collect();

        assert!(registry.samples(&flat, &["b".to_string()]).is_empty());
    }

    #[test]
    fn test_samples_follow_definition_order() {
        let registry = Registry::new(bucket_set(), "cb");
        let flat: FlattenedResponse = [
            ("item_count".to_string(), Leaf::Scalar(1.0)),
            ("cmd_get".to_string(), series(&[2.0])),
            ("mem_used".to_string(), Leaf::Text("3".to_string())),
        ]
        .into_iter()
        .collect();

        let ids: Vec<_> = registry
            .samples(&flat, &["b".to_string()])
            .iter()
            .map(|s| s.descriptor.id.clone())
            .collect();
        assert_eq!(ids, vec!["cmd_get", "mem_used", "item_count"]);
    }

    #[test]
    fn test_check_labels() {
        let registry = Registry::new(bucket_set(), "cb");

        assert!(registry.check_labels(&["bucket"]).is_ok());
        assert!(matches!(
            registry.check_labels(&["node"]),
            Err(LoadError::LabelMismatch { .. })
        ));
        assert!(registry.check_labels(&[]).is_err());
    }

    #[test]
    fn test_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
