use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::{Document, Embedding};

pub const TAGS_FIELD: &str = "tags";

/// Stored field names of the [`Document`] attributes, shared by writes and reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    pub text_field: String,
    pub name_field: String,
    pub embedding_field: Option<String>,
    /// FAQ question field. Without one, `question` is plain metadata.
    pub question_field: Option<String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            text_field: "text".to_string(),
            name_field: "name".to_string(),
            embedding_field: Some("embedding".to_string()),
            question_field: None,
        }
    }
}

impl FieldMap {
    pub fn new(text_field: impl Into<String>, name_field: impl Into<String>) -> Self {
        Self {
            text_field: text_field.into(),
            name_field: name_field.into(),
            ..Self::default()
        }
    }

    pub fn with_embedding_field(mut self, field: Option<String>) -> Self {
        self.embedding_field = field;
        self
    }

    pub fn with_question_field(mut self, field: Option<String>) -> Self {
        self.question_field = field;
        self
    }

    pub fn is_content_field(&self, key: &str) -> bool {
        key == self.text_field
            || self.question_field.as_deref() == Some(key)
            || key == TAGS_FIELD
            || self.embedding_field.as_deref() == Some(key)
    }

    pub fn is_reserved(&self, key: &str) -> bool {
        self.is_content_field(key) || key == self.name_field
    }

    pub fn meta_key<'a>(&'a self, key: &'a str) -> &'a str {
        if key == "name" {
            &self.name_field
        } else {
            key
        }
    }

    /// `meta` entries are hoisted to the top level; nulls are dropped.
    pub fn to_source(&self, doc: &Document) -> Map<String, Value> {
        let mut source = Map::new();

        for (key, value) in &doc.meta {
            if value.is_null() {
                continue;
            }
            if key == "name" {
                source.insert(self.meta_key(key).to_string(), value.clone());
                continue;
            }
            if self.is_reserved(key) {
                warn!(document_id = %doc.id, field = %key, "meta key collides with a reserved field");
            }
            source.insert(key.clone(), value.clone());
        }

        source.insert(self.text_field.clone(), Value::String(doc.text.clone()));
        match (&doc.question, &self.question_field) {
            (Some(question), Some(field)) => {
                source.insert(field.clone(), Value::String(question.clone()));
            }
            (Some(_), None) => {
                warn!(document_id = %doc.id, "no question field configured, question not stored");
            }
            _ => {}
        }
        if let Some(tags) = doc.tags.as_ref().filter(|t| !t.is_null()) {
            source.insert(TAGS_FIELD.to_string(), tags.clone());
        }
        match (&doc.embedding, &self.embedding_field) {
            (Some(embedding), Some(field)) => {
                let values = embedding.as_slice().iter().map(|x| Value::from(*x)).collect();
                source.insert(field.clone(), Value::Array(values));
            }
            (Some(_), None) => {
                warn!(document_id = %doc.id, "no embedding field configured, embedding not stored");
            }
            _ => {}
        }

        source
    }

    pub fn from_source(
        &self,
        id: impl Into<String>,
        mut source: Map<String, Value>,
        query_score: Option<f64>,
    ) -> Document {
        let text = match source.remove(&self.text_field) {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let question = self
            .question_field
            .as_ref()
            .and_then(|field| source.remove(field))
            .and_then(|v| v.as_str().map(str::to_string));
        let tags = source.remove(TAGS_FIELD).filter(|t| !t.is_null());
        let embedding = self
            .embedding_field
            .as_ref()
            .and_then(|field| source.remove(field))
            .and_then(|v| serde_json::from_value::<Embedding>(v).ok());
        let name = source.remove(&self.name_field);

        let mut meta = source;
        if let Some(name) = name {
            meta.insert("name".to_string(), name);
        }

        Document {
            id: id.into(),
            text,
            meta,
            embedding,
            question,
            tags,
            query_score,
        }
    }
}
