use std::sync::Arc;

use docstore::application::{EmbeddingRefresher, SearchDocumentStore};
use docstore::infrastructure::{Config, HttpSearchEngine, TextEmbedding};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Re-embeds every document of an index. The index defaults to the
/// configured one and may be given as the first argument.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refresh=debug,docstore=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load()?;
    let index = std::env::args().nth(1);

    let engine = Arc::new(HttpSearchEngine::new(&config.store)?);
    let store = Arc::new(SearchDocumentStore::connect(engine, config.store.store_options()).await?);
    let embedding = Arc::new(TextEmbedding::from_config(&config.embedding));
    let refresher = EmbeddingRefresher::new(embedding, store);

    tokio::select! {
        result = refresher.refresh(index.as_deref()) => match result {
            Ok(summary) => info!(updated = summary.succeeded, "embeddings refreshed"),
            Err(e) => {
                error!(error = %e, "embedding refresh failed");
                return Err(e.into());
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, refresh abandoned");
        }
    }

    Ok(())
}
