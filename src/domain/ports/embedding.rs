use crate::domain::{errors::DomainError, Embedding};
use async_trait::async_trait;

/// Turns text into vectors. `embed_batch` returns one vector per input, in
/// input order.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError>;
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError>;
    fn dimension(&self) -> usize;
}
