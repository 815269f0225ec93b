//! Declarative metric definitions.
//!
//! Each monitored domain ships a JSON resource listing the metrics it exports.
//! The resources are compiled into the binary and can be overridden from a
//! directory at startup.
//!
//! ```json
//! {
//!   "name": "bucket",
//!   "route": "/pools/default/buckets",
//!   "metrics": [
//!     { "id": "cmd_get", "name": "cmd_get", "description": "Gets per second",
//!       "labels": ["bucket"], "type": "gauge" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};
use crate::metric::MetricKind;
use crate::naming::{is_valid_label_name, is_valid_metric_name};

/// Domains with a bundled definition resource.
pub const BUNDLED_DOMAINS: &[&str] = &["cluster", "node", "bucket", "xdcr"];

/// Metric names emitted by every domain collector itself.
pub const RESERVED_NAMES: &[&str] = &["up", "scrape_duration_seconds"];

/// One metric as declared in a definition resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Identifier of the upstream field feeding this metric.
    pub id: String,
    /// Metric name, without namespace and domain prefix.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, rename = "type")]
    pub kind: MetricKind,
}

/// All metric definitions for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinitionSet {
    /// Domain name, used as the metric subsystem (`cb_{name}_...`).
    pub name: String,
    /// Upstream REST route the domain is scraped from.
    pub route: String,
    pub metrics: Vec<MetricDefinition>,
}

impl MetricDefinitionSet {
    /// Check ids, names and labels.
    pub fn validate(&self) -> Result<()> {
        let domain = self.name.as_str();

        if domain.is_empty() {
            return Err(LoadError::empty("<unnamed>", "name"));
        }
        if !is_valid_metric_name(domain) {
            return Err(LoadError::invalid_name(domain, "domain", domain));
        }
        if self.route.is_empty() {
            return Err(LoadError::empty(domain, "route"));
        }

        let mut seen = HashSet::with_capacity(self.metrics.len());
        let mut names = HashSet::with_capacity(self.metrics.len());
        for metric in &self.metrics {
            if metric.id.is_empty() {
                return Err(LoadError::empty(domain, "metric id"));
            }
            if !seen.insert(metric.id.as_str()) {
                return Err(LoadError::DuplicateId {
                    domain: domain.to_string(),
                    id: metric.id.clone(),
                });
            }
            if metric.name.is_empty() {
                return Err(LoadError::empty(domain, format!("name of metric '{}'", metric.id)));
            }
            if !is_valid_metric_name(&metric.name) {
                return Err(LoadError::invalid_name(domain, "metric", &metric.name));
            }
            if RESERVED_NAMES.contains(&metric.name.as_str()) {
                return Err(LoadError::ReservedName {
                    domain: domain.to_string(),
                    name: metric.name.clone(),
                });
            }
            if !names.insert(metric.name.as_str()) {
                return Err(LoadError::DuplicateName {
                    domain: domain.to_string(),
                    name: metric.name.clone(),
                });
            }
            if let Some(label) = metric.labels.iter().find(|l| !is_valid_label_name(l)) {
                return Err(LoadError::invalid_name(domain, "label", label));
            }
        }

        Ok(())
    }
}

fn bundled(domain: &str) -> Option<&'static str> {
    match domain {
        "cluster" => Some(include_str!("../definitions/cluster.json")),
        "node" => Some(include_str!("../definitions/node.json")),
        "bucket" => Some(include_str!("../definitions/bucket.json")),
        "xdcr" => Some(include_str!("../definitions/xdcr.json")),
        _ => None,
    }
}

/// Load the bundled definitions for a domain.
pub fn load_definitions(domain: &str) -> Result<MetricDefinitionSet> {
    let content = bundled(domain).ok_or_else(|| LoadError::NotFound {
        domain: domain.to_string(),
    })?;
    parse_definitions(domain, content)
}

/// Load definitions for a domain from `{dir}/{domain}.json`.
pub fn load_definitions_from_dir(
    dir: impl AsRef<Path>,
    domain: &str,
) -> Result<MetricDefinitionSet> {
    let path = dir.as_ref().join(format!("{}.json", domain));

    let content = std::fs::read_to_string(&path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LoadError::NotFound {
                domain: domain.to_string(),
            }
        } else {
            LoadError::Io { path, source }
        }
    })?;

    parse_definitions(domain, &content)
}

/// Parse and validate a definition resource. The resource must declare
/// `domain` as its name.
pub fn parse_definitions(domain: &str, content: &str) -> Result<MetricDefinitionSet> {
    let set: MetricDefinitionSet =
        serde_json::from_str(content).map_err(|source| LoadError::Malformed {
            domain: domain.to_string(),
            source,
        })?;

    if set.name != domain {
        return Err(LoadError::DomainMismatch {
            expected: domain.to_string(),
            found: set.name,
        });
    }

    set.validate()?;

    tracing::debug!(
        domain,
        route = %set.route,
        metrics = set.metrics.len(),
        "Loaded metric definitions"
    );

    Ok(set)
}
