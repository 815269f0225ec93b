//! Metric description and response flattening engine for the Couchbase exporter.
//!
//! - [`definitions`] - Declarative metric definitions, bundled per domain
//! - [`registry`] - Immutable id to descriptor mapping and sample matching
//! - [`schema`] - Explicit description of upstream response shapes
//! - [`flatten`] - Schema-driven flattening of JSON documents
//! - [`metric`] - Descriptor and sample types
//! - [`naming`] - Prometheus naming rules
//!
//! # Data flow
//!
//! ```text
//! definitions ──> Registry ─────────────┐
//!                                       ├──> samples
//! JSON document ──> flatten(schema) ────┘
//! ```
//!
//! Nothing in this crate touches the network.

pub mod definitions;
pub mod error;
pub mod flatten;
pub mod metric;
pub mod naming;
pub mod registry;
pub mod schema;

pub use definitions::{
    BUNDLED_DOMAINS, MetricDefinition, MetricDefinitionSet, RESERVED_NAMES, load_definitions,
    load_definitions_from_dir, parse_definitions,
};
pub use error::{LoadError, Result};
pub use flatten::{FlattenedResponse, Leaf, Series, flatten};
pub use metric::{MetricDescriptor, MetricKind, Sample};
pub use registry::Registry;
pub use schema::{Extract, FieldSpec, ResponseSchema, SampleOrder};
