use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::application::StoreOptions;
use crate::domain::{DomainError, FieldMap};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub scheme: String,
    /// PEM bundle of extra root certificates.
    pub ca_certs: Option<String>,
    pub verify_certs: bool,
    pub index: String,
    pub label_index: String,
    #[serde(deserialize_with = "one_or_many")]
    pub search_fields: Vec<String>,
    pub text_field: String,
    pub name_field: String,
    /// `None` disables vector features.
    pub embedding_field: Option<String>,
    pub embedding_dim: usize,
    pub custom_mapping: Option<Value>,
    pub excluded_meta_data: Vec<String>,
    pub faq_question_field: Option<String>,
    pub create_index: bool,
    pub request_timeout_secs: u64,
    pub bulk_timeout_secs: u64,
    pub scroll_size: usize,
    pub scroll_keep_alive: String,
    pub delete_confirm_timeout_ms: u64,
    pub delete_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9200,
            username: String::new(),
            password: String::new(),
            scheme: "http".to_string(),
            ca_certs: None,
            verify_certs: true,
            index: "document".to_string(),
            label_index: "label".to_string(),
            search_fields: vec!["text".to_string()],
            text_field: "text".to_string(),
            name_field: "name".to_string(),
            embedding_field: Some("embedding".to_string()),
            embedding_dim: 768,
            custom_mapping: None,
            excluded_meta_data: Vec::new(),
            faq_question_field: None,
            create_index: true,
            request_timeout_secs: 30,
            bulk_timeout_secs: 300,
            scroll_size: 1000,
            scroll_keep_alive: "5m".to_string(),
            delete_confirm_timeout_ms: 5000,
            delete_poll_interval_ms: 100,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 768,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(field) => vec![field],
        OneOrMany::Many(fields) => fields,
    })
}

impl Config {
    /// YAML file named by `DOCSTORE_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self, DomainError> {
        let mut config = match std::env::var("DOCSTORE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.store.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, DomainError> {
        serde_yaml::from_str(raw).map_err(|e| DomainError::configuration(e.to_string()))
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), DomainError> {
        let store = &mut self.store;
        if let Some(host) = var("DOCSTORE_HOST") {
            store.host = host;
        }
        if let Some(port) = var("DOCSTORE_PORT") {
            store.port = parse_var("DOCSTORE_PORT", &port)?;
        }
        if let Some(username) = var("DOCSTORE_USERNAME") {
            store.username = username;
        }
        if let Some(password) = var("DOCSTORE_PASSWORD") {
            store.password = password;
        }
        if let Some(scheme) = var("DOCSTORE_SCHEME") {
            store.scheme = scheme;
        }
        if let Some(index) = var("DOCSTORE_INDEX") {
            store.index = index;
        }
        if let Some(label_index) = var("DOCSTORE_LABEL_INDEX") {
            store.label_index = label_index;
        }
        if let Some(field) = var("DOCSTORE_EMBEDDING_FIELD") {
            store.embedding_field = Some(field).filter(|f| !f.is_empty());
        }
        if let Some(dim) = var("DOCSTORE_EMBEDDING_DIM") {
            store.embedding_dim = parse_var("DOCSTORE_EMBEDDING_DIM", &dim)?;
        }
        if let Some(model) = var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, DomainError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| DomainError::configuration(format!("{key}={raw}: {e}")))
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(DomainError::configuration(format!(
                "scheme must be http or https, got {}",
                self.scheme
            )));
        }
        if self.search_fields.is_empty() {
            return Err(DomainError::configuration("search_fields must not be empty"));
        }
        if self.embedding_field.is_some() && self.embedding_dim == 0 {
            return Err(DomainError::configuration(
                "embedding_dim must be positive when an embedding field is set",
            ));
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn field_map(&self) -> FieldMap {
        FieldMap::new(&self.text_field, &self.name_field)
            .with_embedding_field(self.embedding_field.clone())
            .with_question_field(self.faq_question_field.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_secs)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            index: self.index.clone(),
            label_index: self.label_index.clone(),
            fields: self.field_map(),
            search_fields: self.search_fields.clone(),
            embedding_dim: self.embedding_dim,
            custom_mapping: self.custom_mapping.clone(),
            excluded_meta_data: self.excluded_meta_data.clone(),
            create_index: self.create_index,
            scroll_size: self.scroll_size,
            scroll_keep_alive: self.scroll_keep_alive.clone(),
            delete_confirm_timeout: Duration::from_millis(self.delete_confirm_timeout_ms),
            delete_poll_interval: Duration::from_millis(self.delete_poll_interval_ms),
        }
    }
}
