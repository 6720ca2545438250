use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::{DomainError, Result};

/// Field name to allowed values; entries are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(Map<String, Value>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.0.insert(key.into(), Value::Array(values));
        self
    }

    pub fn with_raw(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn validated(&self) -> Result<Vec<(&str, &[Value])>> {
        self.0
            .iter()
            .map(|(key, value)| match value {
                Value::Array(values) => Ok((key.as_str(), values.as_slice())),
                _ => Err(DomainError::invalid_filter(key)),
            })
            .collect()
    }

    pub fn terms_clauses(&self) -> Result<Vec<Value>> {
        Ok(self
            .validated()?
            .into_iter()
            .map(|(key, values)| json!({ "terms": { key: values } }))
            .collect())
    }
}

impl From<Map<String, Value>> for Filters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
