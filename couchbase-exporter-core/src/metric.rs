//! Metric descriptors and emitted samples.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How a metric value is interpreted by the exposition format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonically increasing value.
    Counter,
    /// Value that can go up or down.
    #[default]
    Gauge,
}

impl MetricKind {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Static metadata describing one output metric.
///
/// `id` is the identifier the response schema declares for the upstream field
/// feeding this metric; `name` is the fully-qualified Prometheus name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub labels: Vec<String>,
    pub kind: MetricKind,
}

impl MetricDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        labels: Vec<String>,
        kind: MetricKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            labels,
            kind,
        }
    }
}

/// One emitted time-series point.
#[derive(Debug, Clone)]
pub struct Sample {
    pub descriptor: Arc<MetricDescriptor>,
    pub value: f64,
    /// Label values, in the order of `descriptor.labels`.
    pub label_values: Vec<String>,
}

impl Sample {
    pub fn new(descriptor: Arc<MetricDescriptor>, value: f64, label_values: Vec<String>) -> Self {
        Self {
            descriptor,
            value,
            label_values,
        }
    }

    /// Label name/value pairs in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.descriptor
            .labels
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_as_str() {
        assert_eq!(MetricKind::Counter.as_str(), "counter");
        assert_eq!(MetricKind::Gauge.as_str(), "gauge");
    }

    #[test]
    fn test_kind_deserialize() {
        let kind: MetricKind = serde_json::from_str("\"counter\"").unwrap();
        assert_eq!(kind, MetricKind::Counter);
        assert_eq!(MetricKind::default(), MetricKind::Gauge);
    }

    #[test]
    fn test_sample_labels_follow_descriptor_order() {
        let descriptor = Arc::new(MetricDescriptor::new(
            "cmd_get",
            "cb_bucket_cmd_get",
            "Gets per second",
            vec!["bucket".to_string(), "node".to_string()],
            MetricKind::Gauge,
        ));
        let sample = Sample::new(descriptor, 3.0, vec!["beer".into(), "n1".into()]);

        let labels: Vec<_> = sample.labels().collect();
        assert_eq!(labels, vec![("bucket", "beer"), ("node", "n1")]);
    }
}
