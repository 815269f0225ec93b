//! Aggregate exporter: one collector per enabled domain.

use std::collections::BTreeMap;
use std::sync::Arc;

use couchbase_exporter_core::naming::build_fq_name;
use couchbase_exporter_core::{
    LoadError, MetricDefinitionSet, MetricDescriptor, MetricKind, Registry, Sample,
    load_definitions, load_definitions_from_dir,
};
use futures::future::join_all;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::collector::{DomainCollector, DomainScrape};
use crate::config::ExporterConfig;
use crate::domain::domain_for;
use crate::fetch::Fetch;
use crate::filter::MetricFilter;
use crate::render::render;

/// Errors raised while building the exporter.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Failed to load metric definitions: {0}")]
    Definitions(#[from] LoadError),

    #[error("Unknown domain '{0}'")]
    UnknownDomain(String),
}

/// Exporter statistics.
#[derive(Debug, Clone, Default)]
pub struct ExporterStats {
    /// Completed scrapes.
    pub scrapes: u64,
    /// Failed scrapes per domain.
    pub domain_failures: BTreeMap<String, u64>,
    /// Outcome of the most recent scrape per domain.
    pub last_success: BTreeMap<String, bool>,
}

/// Scrapes every enabled domain and renders the combined result.
pub struct Exporter {
    collectors: Vec<DomainCollector>,
    fetcher: Arc<dyn Fetch>,
    const_labels: BTreeMap<String, String>,
    scrapes_total: Arc<MetricDescriptor>,
    failures_total: Arc<MetricDescriptor>,
    stats: RwLock<ExporterStats>,
}

/// Create a shareable exporter handle.
pub type SharedExporter = Arc<Exporter>;

impl Exporter {
    /// Build collectors for every enabled domain.
    ///
    /// Definition files are read once here; a malformed or inconsistent
    /// file fails startup.
    pub fn new(config: &ExporterConfig, fetcher: Arc<dyn Fetch>) -> Result<Self, ExporterError> {
        let namespace = config.metrics.namespace.as_str();
        let filter = MetricFilter::new(&config.metrics);
        let mut collectors = Vec::new();

        for name in config.scrape.enabled_domains() {
            let set = load_domain_definitions(config, name)?;
            let domain =
                domain_for(name).ok_or_else(|| ExporterError::UnknownDomain(name.to_string()))?;
            let registry =
                Registry::with_filter(set, namespace, |d| filter.should_include(&d.name));
            let collector = DomainCollector::new(domain, registry, namespace)?;

            info!(
                domain = name,
                route = collector.registry().route(),
                metrics = collector.registry().len(),
                "Domain enabled"
            );
            collectors.push(collector);
        }

        Ok(Self::from_collectors(
            collectors,
            fetcher,
            namespace,
            config.metrics.const_labels.clone(),
        ))
    }

    /// Assemble an exporter from prepared collectors.
    pub fn from_collectors(
        collectors: Vec<DomainCollector>,
        fetcher: Arc<dyn Fetch>,
        namespace: &str,
        const_labels: BTreeMap<String, String>,
    ) -> Self {
        let scrapes_total = MetricDescriptor::new(
            "scrapes_total",
            build_fq_name(namespace, "exporter", "scrapes_total"),
            "Total number of scrapes served",
            Vec::new(),
            MetricKind::Counter,
        );
        let failures_total = MetricDescriptor::new(
            "domain_failures_total",
            build_fq_name(namespace, "exporter", "domain_failures_total"),
            "Total number of failed domain scrapes",
            vec!["domain".to_string()],
            MetricKind::Counter,
        );

        let mut stats = ExporterStats::default();
        for collector in &collectors {
            stats.domain_failures.insert(collector.name().to_string(), 0);
        }

        Self {
            collectors,
            fetcher,
            const_labels,
            scrapes_total: Arc::new(scrapes_total),
            failures_total: Arc::new(failures_total),
            stats: RwLock::new(stats),
        }
    }

    /// Names of the enabled domains.
    pub fn domains(&self) -> Vec<&str> {
        self.collectors.iter().map(DomainCollector::name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Every descriptor the exporter may emit, in output order.
    pub fn descriptors(&self) -> Vec<Arc<MetricDescriptor>> {
        self.collectors
            .iter()
            .flat_map(|c| c.descriptors())
            .chain([&self.scrapes_total, &self.failures_total])
            .cloned()
            .collect()
    }

    /// Scrape all domains concurrently and return their samples followed by
    /// the exporter's own counters.
    pub async fn collect(&self) -> Vec<Sample> {
        let fetcher = self.fetcher.as_ref();
        let scrapes: Vec<DomainScrape> =
            join_all(self.collectors.iter().map(|c| c.collect(fetcher))).await;

        let stats = self.record(&scrapes);

        let mut samples: Vec<Sample> = scrapes.into_iter().flat_map(|s| s.samples).collect();
        samples.push(Sample::new(
            self.scrapes_total.clone(),
            stats.scrapes as f64,
            Vec::new(),
        ));
        for (domain, failures) in &stats.domain_failures {
            samples.push(Sample::new(
                self.failures_total.clone(),
                *failures as f64,
                vec![domain.clone()],
            ));
        }

        samples
    }

    /// Scrape and render in the text exposition format.
    pub async fn render(&self) -> String {
        let samples = self.collect().await;
        render(&samples, &self.const_labels)
    }

    /// Get exporter statistics.
    pub fn stats(&self) -> ExporterStats {
        self.stats.read().clone()
    }

    fn record(&self, scrapes: &[DomainScrape]) -> ExporterStats {
        let mut stats = self.stats.write();
        stats.scrapes += 1;

        for scrape in scrapes {
            if !scrape.success {
                *stats
                    .domain_failures
                    .entry(scrape.domain.clone())
                    .or_default() += 1;
            }
            stats
                .last_success
                .insert(scrape.domain.clone(), scrape.success);
        }

        debug!(
            scrape = stats.scrapes,
            domains = scrapes.len(),
            failed = scrapes.iter().filter(|s| !s.success).count(),
            "Scrape complete"
        );

        stats.clone()
    }
}

/// Definitions for one domain: the override directory when it holds a file
/// for the domain, the bundled set otherwise.
fn load_domain_definitions(
    config: &ExporterConfig,
    domain: &str,
) -> Result<MetricDefinitionSet, LoadError> {
    if let Some(dir) = &config.metrics.definitions_dir {
        match load_definitions_from_dir(dir, domain) {
            Err(LoadError::NotFound { .. }) => {
                debug!(domain, dir = %dir.display(), "No override file, using bundled definitions");
            }
            result => return result,
        }
    }
    load_definitions(domain)
}
