use std::sync::Arc;

use docstore::application::SearchDocumentStore;
use docstore::domain::ports::DocumentStore;
use docstore::infrastructure::{Config, HttpSearchEngine};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bootstrap=debug,docstore=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load()?;
    info!(url = %config.store.base_url(), "connecting to search engine");

    let engine = Arc::new(HttpSearchEngine::new(&config.store)?);
    let store = SearchDocumentStore::connect(engine, config.store.store_options()).await?;

    let documents = store.get_document_count(None).await?;
    let labels = store.get_label_count(None).await?;
    info!(
        index = %config.store.index,
        label_index = %config.store.label_index,
        documents,
        labels,
        "document store ready"
    );

    Ok(())
}
