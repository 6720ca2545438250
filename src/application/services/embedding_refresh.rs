use std::sync::Arc;

use tracing::{info, instrument};

use crate::application::services::SearchDocumentStore;
use crate::domain::{
    ports::{DocumentStore, EmbeddingService},
    BulkSummary, DomainError, Result,
};

/// Recomputes the embedding of every stored document. The whole index is
/// embedded in one batch.
pub struct EmbeddingRefresher {
    embedding: Arc<dyn EmbeddingService>,
    store: Arc<SearchDocumentStore>,
}

impl EmbeddingRefresher {
    pub fn new(embedding: Arc<dyn EmbeddingService>, store: Arc<SearchDocumentStore>) -> Self {
        Self { embedding, store }
    }

    // TODO: embed and write in fixed-size batches by draining `FullScan::stream`
    // incrementally instead of loading the whole index.
    #[instrument(skip(self))]
    pub async fn refresh(&self, index: Option<&str>) -> Result<BulkSummary> {
        self.store.embedding_field()?;

        let documents = self.store.get_all_documents(index, None).await?;
        if documents.is_empty() {
            info!("no documents to embed");
            return Ok(BulkSummary {
                attempted: 0,
                succeeded: 0,
            });
        }

        info!(count = documents.len(), "updating embeddings");
        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let embeddings = self.embedding.embed_batch(&texts).await?;

        if embeddings.len() != documents.len() {
            return Err(DomainError::internal(format!(
                "embedding provider returned {} vectors for {} documents",
                embeddings.len(),
                documents.len()
            )));
        }

        let expected = self.store.options().embedding_dim;
        let actual = embeddings[0].dimension();
        if actual != expected {
            return Err(DomainError::configuration(format!(
                "embedding dim. of model ({actual}) doesn't match embedding dim. in document store ({expected}); \
                 set `embedding_dim` to match the model"
            )));
        }

        let updates = documents.into_iter().map(|d| d.id).zip(embeddings).collect();
        self.store.write_embeddings(index, updates).await
    }
}
