use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::EmbeddingModel;
use rig::providers::openai;
use tracing::debug;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};
use crate::infrastructure::config::EmbeddingConfig;

/// OpenAI embeddings through rig; needs `OPENAI_API_KEY`.
pub struct TextEmbedding {
    model: String,
    dimension: usize,
}

impl TextEmbedding {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }
}

impl Default for TextEmbedding {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}

#[async_trait]
impl EmbeddingService for TextEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::internal("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = texts.len(), "embedding texts");

        let client = openai::Client::from_env();
        let model = client.embedding_model(&self.model);

        let embeddings = model
            .embed_texts(texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
            .await
            .map_err(|e| DomainError::transport(e.to_string()))?;

        Ok(embeddings
            .into_iter()
            .map(|emb| Embedding::new(emb.vec.into_iter().map(|x| x as f32).collect()))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
