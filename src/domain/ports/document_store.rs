use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::{
    errors::DomainError, BulkSummary, Document, DocumentInput, DocumentStats, Embedding, Filters,
    Label, LabelInput,
};

/// `index: None` means the configured document or label index.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn write_documents(
        &self,
        documents: Vec<DocumentInput>,
        index: Option<&str>,
    ) -> Result<BulkSummary, DomainError>;

    async fn write_labels(
        &self,
        labels: Vec<LabelInput>,
        index: Option<&str>,
    ) -> Result<BulkSummary, DomainError>;

    async fn query(
        &self,
        query: Option<&str>,
        filters: Option<&Filters>,
        top_k: usize,
        custom_query: Option<&str>,
        index: Option<&str>,
    ) -> Result<Vec<Document>, DomainError>;

    async fn query_by_embedding(
        &self,
        query: &Embedding,
        filters: Option<&Filters>,
        top_k: usize,
        index: Option<&str>,
    ) -> Result<Vec<Document>, DomainError>;

    async fn get_document_by_id(
        &self,
        id: &str,
        index: Option<&str>,
    ) -> Result<Option<Document>, DomainError>;

    async fn get_document_ids_by_tags(
        &self,
        tags: &Filters,
        index: Option<&str>,
    ) -> Result<Vec<String>, DomainError>;

    async fn update_document_meta(
        &self,
        id: &str,
        meta: Map<String, Value>,
        index: Option<&str>,
    ) -> Result<(), DomainError>;

    async fn get_document_count(&self, index: Option<&str>) -> Result<u64, DomainError>;

    async fn get_label_count(&self, index: Option<&str>) -> Result<u64, DomainError>;

    async fn get_all_documents(
        &self,
        index: Option<&str>,
        filters: Option<&Filters>,
    ) -> Result<Vec<Document>, DomainError>;

    async fn get_all_labels(
        &self,
        index: Option<&str>,
        filters: Option<&Filters>,
    ) -> Result<Vec<Label>, DomainError>;

    async fn describe_documents(&self, index: Option<&str>) -> Result<DocumentStats, DomainError>;

    async fn delete_all_documents(&self, index: &str) -> Result<(), DomainError>;
}
