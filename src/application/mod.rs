pub mod services;

pub use services::{EmbeddingRefresher, SearchDocumentStore, StoreOptions};
