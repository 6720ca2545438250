use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::{Embedding, Result};

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A stored text record. `meta` keys must not collide with reserved fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default = "generate_id")]
    pub id: String,
    pub text: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_score: Option<f64>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            text: text.into(),
            meta: Map::new(),
            embedding: None,
            question: None,
            tags: None,
            query_score: None,
        }
    }

    /// Parses a generic key-value record. A missing `id` gets a fresh UUID.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_meta_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_embedding(mut self, embedding: impl Into<Embedding>) -> Self {
        self.embedding = Some(embedding.into());
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    pub fn with_tags(mut self, tags: Value) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.meta.get("name").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub question: String,
    pub answer: String,
    pub is_correct_answer: bool,
    pub is_correct_document: bool,
    pub origin: String,
    #[serde(default)]
    pub no_answer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_start_in_doc: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub label_type: Option<String>,
}

impl Label {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            is_correct_answer: true,
            is_correct_document: true,
            origin: origin.into(),
            no_answer: false,
            document_id: None,
            offset_start_in_doc: None,
            model_id: None,
            label_type: None,
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    pub fn with_document(mut self, document_id: impl Into<String>, offset: i64) -> Self {
        self.document_id = Some(document_id.into());
        self.offset_start_in_doc = Some(offset);
        self
    }

    pub fn with_correctness(mut self, answer: bool, document: bool) -> Self {
        self.is_correct_answer = answer;
        self.is_correct_document = document;
        self
    }

    pub fn with_no_answer(mut self, no_answer: bool) -> Self {
        self.no_answer = no_answer;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_type(mut self, label_type: impl Into<String>) -> Self {
        self.label_type = Some(label_type.into());
        self
    }

    pub fn to_source(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(crate::domain::DomainError::internal(format!(
                "label serialized to a non-object: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordInput<T> {
    Typed(T),
    Raw(Map<String, Value>),
}

pub type DocumentInput = RecordInput<Document>;
pub type LabelInput = RecordInput<Label>;

impl<T: DeserializeOwned> RecordInput<T> {
    pub fn into_record(self) -> Result<T> {
        match self {
            Self::Typed(record) => Ok(record),
            Self::Raw(map) => Ok(serde_json::from_value(Value::Object(map))?),
        }
    }
}

impl From<Document> for DocumentInput {
    fn from(doc: Document) -> Self {
        Self::Typed(doc)
    }
}

impl From<Label> for LabelInput {
    fn from(label: Label) -> Self {
        Self::Typed(label)
    }
}

impl<T> From<Map<String, Value>> for RecordInput<T> {
    fn from(map: Map<String, Value>) -> Self {
        Self::Raw(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentStats {
    pub count: usize,
    pub chars_mean: f64,
    pub chars_max: usize,
    pub chars_min: usize,
    pub chars_median: f64,
}

impl DocumentStats {
    pub fn from_lengths(mut lengths: Vec<usize>) -> Self {
        if lengths.is_empty() {
            return Self::default();
        }

        lengths.sort_unstable();
        let count = lengths.len();
        let total: usize = lengths.iter().sum();
        let chars_median = if count % 2 == 0 {
            (lengths[count / 2 - 1] + lengths[count / 2]) as f64 / 2.0
        } else {
            lengths[count / 2] as f64
        };

        Self {
            count,
            chars_mean: total as f64 / count as f64,
            chars_max: lengths[count - 1],
            chars_min: lengths[0],
            chars_median,
        }
    }
}
