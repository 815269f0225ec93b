//! Flattening of nested responses into identifier-keyed leaves.

use std::collections::HashMap;
use std::collections::hash_map;

use serde_json::Value;
use tracing::{debug, trace};

use crate::schema::{Extract, FieldSpec, ResponseSchema, SampleOrder};

/// A window of numeric samples with a declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    samples: Vec<f64>,
    order: SampleOrder,
}

impl Series {
    pub fn new(samples: Vec<f64>, order: SampleOrder) -> Self {
        Self { samples, order }
    }

    /// The most recent sample, or `None` for an empty series.
    pub fn latest(&self) -> Option<f64> {
        match self.order {
            SampleOrder::OldestFirst => self.samples.last().copied(),
            SampleOrder::NewestFirst => self.samples.first().copied(),
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn order(&self) -> SampleOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A flattened leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// Number or boolean (as 1/0).
    Scalar(f64),
    /// String as returned by the API; some numbers arrive quoted.
    Text(String),
    /// Numeric array.
    Series(Series),
}

impl Leaf {
    /// Current numeric value of this leaf, if it has one.
    pub fn current_value(&self) -> Option<f64> {
        match self {
            Leaf::Scalar(v) => Some(*v),
            Leaf::Series(series) => series.latest(),
            Leaf::Text(text) => text.trim().parse().ok(),
        }
    }

    /// Convert a JSON value found at a leaf position.
    ///
    /// Objects, nulls and arrays holding anything but numbers are not leaves.
    fn from_json(value: &Value, order: SampleOrder) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Leaf::Scalar),
            Value::Bool(b) => Some(Leaf::Scalar(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => Some(Leaf::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Value::as_f64)
                .collect::<Option<Vec<_>>>()
                .map(|samples| Leaf::Series(Series::new(samples, order))),
            Value::Null | Value::Object(_) => None,
        }
    }
}

/// Leaf identifier to value mapping for one response document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedResponse {
    leaves: HashMap<String, Leaf>,
}

impl FlattenedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Leaf> {
        self.leaves.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.leaves.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, Leaf> {
        self.leaves.iter()
    }

    /// Insert a leaf, returning the value it replaced.
    pub fn insert(&mut self, id: impl Into<String>, leaf: Leaf) -> Option<Leaf> {
        self.leaves.insert(id.into(), leaf)
    }

    /// Merge another document's leaves into this one. Later values win.
    pub fn merge(&mut self, other: FlattenedResponse) {
        self.leaves.extend(other.leaves);
    }
}

impl FromIterator<(String, Leaf)> for FlattenedResponse {
    fn from_iter<I: IntoIterator<Item = (String, Leaf)>>(iter: I) -> Self {
        Self {
            leaves: iter.into_iter().collect(),
        }
    }
}

/// Flatten `document` according to `schema`.
///
/// Every declared field reachable in the document yields exactly one entry;
/// absent fields and fields holding non-leaf values yield none.
pub fn flatten(schema: &ResponseSchema, document: &Value) -> FlattenedResponse {
    let mut flat = FlattenedResponse::new();
    let order = schema.order();

    for spec in schema.fields() {
        match spec {
            FieldSpec::Field {
                id,
                pointer,
                extract,
            } => {
                let Some(value) = document.pointer(pointer) else {
                    trace!(schema = schema.name(), id = %id, pointer = %pointer, "Field absent");
                    continue;
                };
                if let Some(leaf) = extract_leaf(value, extract, order) {
                    record(&mut flat, schema, id, leaf);
                }
            }
            FieldSpec::Members { pointer } => {
                let Some(Value::Object(members)) = document.pointer(pointer) else {
                    trace!(schema = schema.name(), pointer = %pointer, "Member object absent");
                    continue;
                };
                for (id, value) in members {
                    if let Some(leaf) = Leaf::from_json(value, order) {
                        record(&mut flat, schema, id, leaf);
                    }
                }
            }
        }
    }

    flat
}

fn extract_leaf(value: &Value, extract: &Extract, order: SampleOrder) -> Option<Leaf> {
    match extract {
        Extract::Value => Leaf::from_json(value, order),
        Extract::Equals(text) => value
            .as_str()
            .map(|s| Leaf::Scalar(if s == text { 1.0 } else { 0.0 })),
        Extract::Count => value
            .as_array()
            .map(|items| Leaf::Scalar(items.len() as f64)),
    }
}

fn record(flat: &mut FlattenedResponse, schema: &ResponseSchema, id: &str, leaf: Leaf) {
    if flat.insert(id, leaf).is_some() {
        debug!(
            schema = schema.name(),
            id,
            "Identifier declared more than once, keeping the last value"
        );
    }
}
