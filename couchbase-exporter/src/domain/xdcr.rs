//! Replication metrics from the XDCR entries of `/pools/default/tasks`.

use async_trait::async_trait;
use couchbase_exporter_core::{ResponseSchema, flatten};
use serde_json::Value;
use tracing::debug;

use super::{CollectError, Document, Domain, array_at, fetch_json};
use crate::fetch::Fetch;

const TASK_TYPE: &str = "xdcr";

/// Response schema for one XDCR task.
pub fn xdcr_schema() -> ResponseSchema {
    ResponseSchema::new("xdcr")
        .equals("running", "/status", "running")
        .equals("paused", "/status", "paused")
        .field("pause_requested", "/pauseRequested")
        .field("changes_left", "/changesLeft")
        .field("docs_checked", "/docsChecked")
        .field("max_vb_reps", "/maxVBReps")
        .count("error_count", "/errors")
}

/// One document per replication task, labelled by task id.
pub struct XdcrDomain {
    schema: ResponseSchema,
}

impl XdcrDomain {
    pub fn new() -> Self {
        Self {
            schema: xdcr_schema(),
        }
    }
}

impl Default for XdcrDomain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Domain for XdcrDomain {
    fn name(&self) -> &'static str {
        "xdcr"
    }

    fn label_names(&self) -> &'static [&'static str] {
        &["replication"]
    }

    async fn documents(
        &self,
        fetch: &dyn Fetch,
        route: &str,
    ) -> Result<Vec<Document>, CollectError> {
        let document = fetch_json(fetch, route).await?;
        let tasks = array_at(route, &document, "")?;

        let documents: Vec<_> = tasks
            .iter()
            .filter(|task| task.get("type").and_then(Value::as_str) == Some(TASK_TYPE))
            .filter_map(|task| {
                let id = task.get("id").and_then(Value::as_str)?;
                Some(Document::new(vec![id.to_string()], flatten(&self.schema, task)))
            })
            .collect();

        debug!(tasks = tasks.len(), replications = documents.len(), "XDCR tasks read");
        Ok(documents)
    }
}
