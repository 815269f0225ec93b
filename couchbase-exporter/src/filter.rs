//! Include/exclude filtering of exported metric names.

use crate::config::MetricsConfig;

/// Glob-based metric name filter.
///
/// An empty include list accepts every name; excludes always win.
pub struct MetricFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

impl MetricFilter {
    /// Create a new filter from configuration. Invalid patterns are ignored;
    /// configuration validation reports them before this point.
    pub fn new(config: &MetricsConfig) -> Self {
        let include = config
            .include
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let exclude = config
            .exclude
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        Self { include, exclude }
    }

    /// Check if a fully-qualified metric name should be exported.
    pub fn should_include(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(name)) {
            return false;
        }
        !self.exclude.iter().any(|p| p.matches(name))
    }
}

impl Default for MetricFilter {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str]) -> MetricFilter {
        MetricFilter::new(&MetricsConfig {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..MetricsConfig::default()
        })
    }

    #[test]
    fn test_default_accepts_all() {
        assert!(MetricFilter::default().should_include("cb_cluster_ram_total_bytes"));
    }

    #[test]
    fn test_include_patterns() {
        let f = filter(&["cb_bucket_*", "cb_node_healthy"], &[]);

        assert!(f.should_include("cb_bucket_cmd_get"));
        assert!(f.should_include("cb_node_healthy"));
        assert!(!f.should_include("cb_node_uptime_seconds"));
    }

    #[test]
    fn test_exclude_wins() {
        let f = filter(&["cb_bucket_*"], &["cb_bucket_ep_tap_*"]);

        assert!(f.should_include("cb_bucket_cmd_get"));
        assert!(!f.should_include("cb_bucket_ep_tap_total_queue_drain"));
    }
}
