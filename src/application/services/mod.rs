mod document_store;
mod embedding_refresh;
mod index_manager;
mod query_builder;
mod scan;
pub mod write_pipeline;

pub use document_store::{SearchDocumentStore, StoreOptions};
pub use embedding_refresh::EmbeddingRefresher;
pub use index_manager::IndexManager;
pub use query_builder::{substitute_template, QueryBuilder, QueryShape, COSINE_OFFSET};
pub use scan::FullScan;
pub use write_pipeline::BulkWriter;
