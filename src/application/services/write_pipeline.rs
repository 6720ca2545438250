use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use crate::domain::{
    ports::SearchEngine, BulkOperation, BulkSummary, DocumentInput, DomainError, Embedding,
    FieldMap, LabelInput, Result,
};

pub fn document_operations(
    fields: &FieldMap,
    index: &str,
    documents: Vec<DocumentInput>,
) -> Result<Vec<BulkOperation>> {
    documents
        .into_iter()
        .map(|input| {
            let doc = input.into_record()?;
            let source = fields.to_source(&doc);
            Ok(BulkOperation::insert(index, Some(doc.id), source))
        })
        .collect()
}

// Labels carry no identity; the engine assigns one.
pub fn label_operations(index: &str, labels: Vec<LabelInput>) -> Result<Vec<BulkOperation>> {
    labels
        .into_iter()
        .map(|input| {
            let label = input.into_record()?;
            Ok(BulkOperation::insert(index, None, label.to_source()?))
        })
        .collect()
}

pub fn embedding_updates(
    embedding_field: &str,
    index: &str,
    updates: impl IntoIterator<Item = (String, Embedding)>,
) -> Vec<BulkOperation> {
    updates
        .into_iter()
        .map(|(id, embedding)| {
            let values = embedding.into_inner().into_iter().map(Value::from).collect();
            let mut fields = Map::new();
            fields.insert(embedding_field.to_string(), Value::Array(values));
            BulkOperation::update(index, id, fields)
        })
        .collect()
}

pub struct BulkWriter {
    engine: Arc<dyn SearchEngine>,
}

impl BulkWriter {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }

    /// Rejected records do not roll back the rest.
    #[instrument(skip(self, operations), fields(count = operations.len()))]
    pub async fn submit(&self, operations: Vec<BulkOperation>) -> Result<BulkSummary> {
        let attempted = operations.len();
        if attempted == 0 {
            return Ok(BulkSummary {
                attempted,
                succeeded: 0,
            });
        }

        let response = self.engine.bulk(&operations).await?;
        let failures = response.failures();

        if failures.is_empty() {
            info!(attempted, "bulk write completed");
            return Ok(BulkSummary {
                attempted,
                succeeded: attempted,
            });
        }

        for failure in &failures {
            warn!(
                position = failure.position,
                id = ?failure.id,
                status = failure.status,
                reason = %failure.reason,
                "record rejected"
            );
        }
        Err(DomainError::PartialWriteFailure {
            attempted,
            failures,
        })
    }
}
