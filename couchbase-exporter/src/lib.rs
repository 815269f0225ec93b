//! Prometheus metrics exporter for Couchbase.
//!
//! On every scrape of the metrics endpoint the exporter polls the Couchbase
//! REST API, flattens the responses and matches them against the metric
//! definitions of each enabled domain.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Couchbase API  │<────│    Exporter     │<────│   HTTP Server   │
//! │  (REST, JSON)   │     │ (domain scrape) │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Domains: `cluster`, `node`, `bucket` and `xdcr`. A failing domain reports
//! `{namespace}_{domain}_up 0` and never blocks the others.
//!
//! # Usage
//!
//! ```bash
//! couchbase-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod collector;
pub mod config;
pub mod domain;
pub mod exporter;
pub mod fetch;
pub mod filter;
pub mod http;
pub mod render;

pub use collector::{DomainCollector, DomainScrape};
pub use config::ExporterConfig;
pub use domain::{CollectError, Document, Domain};
pub use exporter::{Exporter, ExporterError, ExporterStats, SharedExporter};
pub use fetch::{Fetch, FetchError, HttpFetcher};
pub use http::HttpServer;
