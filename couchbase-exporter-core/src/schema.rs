//! Explicit description of an upstream response shape.
//!
//! A [`ResponseSchema`] lists which fields of a JSON document feed metrics and
//! under which identifier. Fields are addressed with JSON pointers (RFC 6901),
//! so heterogeneous nesting collapses onto the flat identifiers used by the
//! metric definitions.
//!
//! ```
//! use couchbase_exporter_core::ResponseSchema;
//!
//! let schema = ResponseSchema::new("cluster")
//!     .field("ram_total", "/storageTotals/ram/total")
//!     .equals("rebalance_running", "/rebalanceStatus", "running")
//!     .members("/counters");
//! assert_eq!(schema.len(), 3);
//! ```

/// Order of samples in an upstream series.
///
/// The stats API returns a window of recent samples; which end holds the
/// current value is declared here rather than assumed by index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SampleOrder {
    /// Oldest sample first, most recent last.
    #[default]
    OldestFirst,
    /// Most recent sample first.
    NewestFirst,
}

/// How a leaf value is taken from the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extract {
    /// Number, boolean, numeric array or string, as found.
    Value,
    /// 1 when the string at the pointer equals the text, 0 otherwise.
    Equals(String),
    /// Number of elements of the array at the pointer.
    Count,
}

/// One entry of a response schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSpec {
    /// A single leaf with a declared identifier.
    Field {
        id: String,
        pointer: String,
        extract: Extract,
    },
    /// Every member of the object at `pointer` is a leaf identified by its
    /// member name.
    Members { pointer: String },
}

/// Ordered list of field specifications for one response shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    name: String,
    order: SampleOrder,
    fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    /// Create an empty schema. The name only appears in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SampleOrder::default(),
            fields: Vec::new(),
        }
    }

    /// Declare the sample order of every series in this response.
    pub fn with_order(mut self, order: SampleOrder) -> Self {
        self.order = order;
        self
    }

    /// Map the value at `pointer` to `id`.
    pub fn field(self, id: impl Into<String>, pointer: impl Into<String>) -> Self {
        self.push(id, pointer, Extract::Value)
    }

    /// Map "string at `pointer` equals `text`" to `id` as 1 or 0.
    pub fn equals(
        self,
        id: impl Into<String>,
        pointer: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.push(id, pointer, Extract::Equals(text.into()))
    }

    /// Map the length of the array at `pointer` to `id`.
    pub fn count(self, id: impl Into<String>, pointer: impl Into<String>) -> Self {
        self.push(id, pointer, Extract::Count)
    }

    /// Map every member of the object at `pointer` to its own name.
    pub fn members(mut self, pointer: impl Into<String>) -> Self {
        self.fields.push(FieldSpec::Members {
            pointer: pointer.into(),
        });
        self
    }

    fn push(mut self, id: impl Into<String>, pointer: impl Into<String>, extract: Extract) -> Self {
        self.fields.push(FieldSpec::Field {
            id: id.into(),
            pointer: pointer.into(),
            extract,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> SampleOrder {
        self.order
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
