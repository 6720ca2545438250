use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{BulkOperation, BulkResponse, DomainError, ScrollPage, SearchHit};

/// Client of the remote search engine. Bodies are the engine's native JSON.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, DomainError>;

    /// `Ok(false)` when the index already exists.
    async fn create_index(&self, index: &str, body: &Value) -> Result<bool, DomainError>;

    async fn search(&self, index: &str, body: &Value) -> Result<Vec<SearchHit>, DomainError>;

    async fn count(&self, index: &str) -> Result<u64, DomainError>;

    /// Submits all operations in one call and returns once they are
    /// searchable. Rejections are reported per item.
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, DomainError>;

    async fn delete_by_query(
        &self,
        index: &str,
        query: &Value,
        refresh: bool,
    ) -> Result<u64, DomainError>;

    async fn scroll_start(
        &self,
        index: &str,
        body: &Value,
        keep_alive: &str,
    ) -> Result<ScrollPage, DomainError>;

    async fn scroll_next(&self, scroll_id: &str, keep_alive: &str) -> Result<ScrollPage, DomainError>;

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), DomainError>;
}
