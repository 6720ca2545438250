mod document_store;
mod embedding;
mod search_engine;

pub use document_store::DocumentStore;
pub use embedding::EmbeddingService;
pub use search_engine::SearchEngine;
