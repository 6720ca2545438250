use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteIntent {
    /// Create only. The engine rejects the record if the id already exists.
    Insert,
    Update,
}

impl WriteIntent {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Insert => "create",
            Self::Update => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub intent: WriteIntent,
    pub index: String,
    pub id: Option<String>,
    pub source: Map<String, Value>,
}

impl BulkOperation {
    pub fn insert(index: impl Into<String>, id: Option<String>, source: Map<String, Value>) -> Self {
        Self {
            intent: WriteIntent::Insert,
            index: index.into(),
            id,
            source,
        }
    }

    pub fn update(index: impl Into<String>, id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            intent: WriteIntent::Update,
            index: index.into(),
            id: Some(id.into()),
            source: fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemOutcome {
    pub id: Option<String>,
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItemOutcome {
    pub fn ok(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: Some(id.into()),
            status,
            error: None,
        }
    }

    pub fn failed(id: Option<String>, status: u16, error: impl Into<String>) -> Self {
        Self {
            id,
            status,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub items: Vec<BulkItemOutcome>,
}

impl BulkResponse {
    pub fn failures(&self) -> Vec<BulkItemFailure> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_success())
            .map(|(position, item)| BulkItemFailure {
                position,
                id: item.id.clone(),
                status: item.status,
                reason: item.error.clone().unwrap_or_else(|| format!("status {}", item.status)),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemFailure {
    pub position: usize,
    pub id: Option<String>,
    pub status: u16,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub attempted: usize,
    pub succeeded: usize,
}
