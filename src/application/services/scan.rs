use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use tracing::debug;

use crate::application::services::QueryBuilder;
use crate::domain::{ports::SearchEngine, DomainError, Filters, Result, SearchHit};

/// Scroll over every record passing a filter set. Each [`FullScan::stream`]
/// opens a fresh scroll.
#[derive(Clone)]
pub struct FullScan {
    engine: Arc<dyn SearchEngine>,
    index: String,
    body: Value,
    keep_alive: String,
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

impl FullScan {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        index: impl Into<String>,
        filters: Option<&Filters>,
        page_size: usize,
        keep_alive: impl Into<String>,
    ) -> Result<Self> {
        let query = QueryBuilder::filtered_match_all(filters)?;
        Ok(Self {
            engine,
            index: index.into(),
            body: json!({ "size": page_size, "query": query }),
            keep_alive: keep_alive.into(),
        })
    }

    pub fn stream(&self) -> BoxStream<'static, Result<SearchHit>> {
        let scan = self.clone();

        stream::try_unfold(Cursor::Start, move |cursor| next_page(scan.clone(), cursor))
            .map_ok(|hits| stream::iter(hits.into_iter().map(Ok::<_, DomainError>)))
            .try_flatten()
            .boxed()
    }

    pub async fn collect(&self) -> Result<Vec<SearchHit>> {
        self.stream().try_collect().await
    }
}

async fn next_page(scan: FullScan, cursor: Cursor) -> Result<Option<(Vec<SearchHit>, Cursor)>> {
    let page = match cursor {
        Cursor::Start => {
            scan.engine
                .scroll_start(&scan.index, &scan.body, &scan.keep_alive)
                .await?
        }
        Cursor::Next(scroll_id) => scan.engine.scroll_next(&scroll_id, &scan.keep_alive).await?,
        Cursor::Done => return Ok(None),
    };

    if page.hits.is_empty() {
        if let Some(scroll_id) = page.scroll_id {
            if let Err(e) = scan.engine.clear_scroll(&scroll_id).await {
                debug!(error = %e, "failed to clear scroll");
            }
        }
        return Ok(None);
    }

    debug!(index = %scan.index, hits = page.hits.len(), "scan page");
    let next = page.scroll_id.map_or(Cursor::Done, Cursor::Next);
    Ok(Some((page.hits, next)))
}
