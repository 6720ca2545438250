use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::domain::{ports::SearchEngine, DomainError, FieldMap};

/// Idempotent creation of the document and label indices.
pub struct IndexManager {
    engine: Arc<dyn SearchEngine>,
    fields: FieldMap,
    embedding_dim: usize,
}

impl IndexManager {
    pub fn new(engine: Arc<dyn SearchEngine>, fields: FieldMap, embedding_dim: usize) -> Self {
        Self {
            engine,
            fields,
            embedding_dim,
        }
    }

    pub fn document_mapping(&self) -> Value {
        let mut properties = serde_json::Map::new();
        properties.insert(self.fields.name_field.clone(), json!({ "type": "text" }));
        properties.insert(self.fields.text_field.clone(), json!({ "type": "text" }));
        if let Some(field) = &self.fields.embedding_field {
            properties.insert(
                field.clone(),
                json!({ "type": "dense_vector", "dims": self.embedding_dim }),
            );
        }

        json!({ "mappings": { "properties": properties } })
    }

    pub fn label_mapping() -> Value {
        json!({
            "mappings": {
                "properties": {
                    "question": { "type": "text" },
                    "answer": { "type": "text" },
                    "is_correct_answer": { "type": "boolean" },
                    "is_correct_document": { "type": "boolean" },
                    "origin": { "type": "keyword" },
                    "document_id": { "type": "keyword" },
                    "offset_start_in_doc": { "type": "long" },
                    "no_answer": { "type": "boolean" },
                    "model_id": { "type": "keyword" },
                    "type": { "type": "keyword" }
                }
            }
        })
    }

    /// A custom mapping replaces the default one entirely.
    #[instrument(skip(self, custom_mapping))]
    pub async fn ensure_document_index(
        &self,
        name: &str,
        custom_mapping: Option<&Value>,
    ) -> Result<(), DomainError> {
        let mapping = match custom_mapping {
            Some(mapping) => mapping.clone(),
            None => self.document_mapping(),
        };
        self.create(name, &mapping).await
    }

    #[instrument(skip(self))]
    pub async fn ensure_label_index(&self, name: &str) -> Result<(), DomainError> {
        self.create(name, &Self::label_mapping()).await
    }

    pub async fn exists(&self, name: &str) -> Result<bool, DomainError> {
        self.engine.index_exists(name).await
    }

    async fn create(&self, name: &str, mapping: &Value) -> Result<(), DomainError> {
        if self.engine.create_index(name, mapping).await? {
            info!(index = name, "index created");
        } else {
            debug!(index = name, "index already exists");
        }
        Ok(())
    }
}
