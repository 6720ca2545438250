pub mod config;
pub mod embedding;
pub mod engine;

pub use config::{Config, EmbeddingConfig, StoreConfig};
pub use embedding::TextEmbedding;
pub use engine::{HttpSearchEngine, InMemorySearchEngine};
