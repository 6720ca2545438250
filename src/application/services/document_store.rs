use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use crate::application::services::{
    write_pipeline, BulkWriter, FullScan, IndexManager, QueryBuilder, QueryShape,
};
use crate::domain::{
    ports::{DocumentStore, SearchEngine},
    BulkOperation, BulkSummary, Document, DocumentInput, DocumentStats, DomainError, Embedding,
    FieldMap, Filters, Label, LabelInput, Result,
};

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub index: String,
    pub label_index: String,
    pub fields: FieldMap,
    pub search_fields: Vec<String>,
    pub embedding_dim: usize,
    pub custom_mapping: Option<Value>,
    pub excluded_meta_data: Vec<String>,
    pub create_index: bool,
    pub scroll_size: usize,
    pub scroll_keep_alive: String,
    pub delete_confirm_timeout: Duration,
    pub delete_poll_interval: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            index: "document".to_string(),
            label_index: "label".to_string(),
            fields: FieldMap::default(),
            search_fields: vec!["text".to_string()],
            embedding_dim: 768,
            custom_mapping: None,
            excluded_meta_data: Vec::new(),
            create_index: true,
            scroll_size: 1000,
            scroll_keep_alive: "5m".to_string(),
            delete_confirm_timeout: Duration::from_secs(5),
            delete_poll_interval: Duration::from_millis(100),
        }
    }
}

/// [`DocumentStore`] backed by a remote [`SearchEngine`].
pub struct SearchDocumentStore {
    engine: Arc<dyn SearchEngine>,
    options: StoreOptions,
    indices: IndexManager,
    queries: QueryBuilder,
    writer: BulkWriter,
}

impl SearchDocumentStore {
    pub fn new(engine: Arc<dyn SearchEngine>, options: StoreOptions) -> Self {
        let indices = IndexManager::new(engine.clone(), options.fields.clone(), options.embedding_dim);
        let queries = QueryBuilder::new(
            options.fields.clone(),
            options.search_fields.clone(),
            options.excluded_meta_data.clone(),
        );
        let writer = BulkWriter::new(engine.clone());

        Self {
            engine,
            options,
            indices,
            queries,
            writer,
        }
    }

    /// The document index is only created when `create_index` is set.
    pub async fn connect(engine: Arc<dyn SearchEngine>, options: StoreOptions) -> Result<Self> {
        let store = Self::new(engine, options);
        if store.options.create_index {
            store.ensure_document_index(&store.options.index).await?;
        }
        store.ensure_label_index(&store.options.label_index).await?;
        Ok(store)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub async fn ensure_document_index(&self, name: &str) -> Result<()> {
        self.indices
            .ensure_document_index(name, self.options.custom_mapping.as_ref())
            .await
    }

    pub async fn ensure_label_index(&self, name: &str) -> Result<()> {
        self.indices.ensure_label_index(name).await
    }

    pub fn scan_all(&self, index: &str, filters: Option<&Filters>) -> Result<FullScan> {
        FullScan::new(
            self.engine.clone(),
            index,
            filters,
            self.options.scroll_size,
            self.options.scroll_keep_alive.clone(),
        )
    }

    pub(crate) fn embedding_field(&self) -> Result<&str> {
        self.options.fields.embedding_field.as_deref().ok_or_else(|| {
            DomainError::configuration(
                "no embedding field configured; set `embedding_field` to use vector features",
            )
        })
    }

    #[instrument(skip(self, updates))]
    pub async fn write_embeddings(
        &self,
        index: Option<&str>,
        updates: Vec<(String, Embedding)>,
    ) -> Result<BulkSummary> {
        let field = self.embedding_field()?;
        let index = self.document_index(index);
        let operations = write_pipeline::embedding_updates(field, index, updates);
        self.writer.submit(operations).await
    }

    fn document_index<'a>(&'a self, index: Option<&'a str>) -> &'a str {
        index.unwrap_or(&self.options.index)
    }

    fn label_index<'a>(&'a self, index: Option<&'a str>) -> &'a str {
        index.unwrap_or(&self.options.label_index)
    }

    async fn search_documents(
        &self,
        index: &str,
        body: &Value,
        shape: QueryShape,
    ) -> Result<Vec<Document>> {
        debug!(index, body = %body, "search query");
        let hits = self.engine.search(index, body).await?;
        Ok(hits
            .into_iter()
            .map(|hit| self.queries.to_document(hit, shape))
            .collect())
    }
}

#[async_trait]
impl DocumentStore for SearchDocumentStore {
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn write_documents(
        &self,
        documents: Vec<DocumentInput>,
        index: Option<&str>,
    ) -> Result<BulkSummary> {
        if let Some(name) = index.filter(|name| *name != self.options.index) {
            if !self.indices.exists(name).await? {
                self.ensure_document_index(name).await?;
            }
        }

        let index = self.document_index(index);
        let operations = write_pipeline::document_operations(&self.options.fields, index, documents)?;
        self.writer.submit(operations).await
    }

    #[instrument(skip(self, labels), fields(count = labels.len()))]
    async fn write_labels(&self, labels: Vec<LabelInput>, index: Option<&str>) -> Result<BulkSummary> {
        let index = self.label_index(index);
        if !self.indices.exists(index).await? {
            self.ensure_label_index(index).await?;
        }

        let operations = write_pipeline::label_operations(index, labels)?;
        self.writer.submit(operations).await
    }

    #[instrument(skip(self, filters, custom_query))]
    async fn query(
        &self,
        query: Option<&str>,
        filters: Option<&Filters>,
        top_k: usize,
        custom_query: Option<&str>,
        index: Option<&str>,
    ) -> Result<Vec<Document>> {
        let (shape, body) = self.queries.build(query, filters, top_k, custom_query)?;
        self.search_documents(self.document_index(index), &body, shape)
            .await
    }

    #[instrument(skip(self, query, filters), fields(dimension = query.dimension()))]
    async fn query_by_embedding(
        &self,
        query: &Embedding,
        filters: Option<&Filters>,
        top_k: usize,
        index: Option<&str>,
    ) -> Result<Vec<Document>> {
        let body = self.queries.build_similarity(query, filters, top_k)?;
        self.search_documents(self.document_index(index), &body, QueryShape::Similarity)
            .await
    }

    async fn get_document_by_id(&self, id: &str, index: Option<&str>) -> Result<Option<Document>> {
        let body = json!({ "query": { "ids": { "values": [id] } } });
        let documents = self
            .search_documents(self.document_index(index), &body, QueryShape::FilterOnly)
            .await?;
        Ok(documents.into_iter().next())
    }

    async fn get_document_ids_by_tags(
        &self,
        tags: &Filters,
        index: Option<&str>,
    ) -> Result<Vec<String>> {
        let body = json!({
            "size": 10_000,
            "query": { "bool": { "must": tags.terms_clauses()? } }
        });
        debug!(body = %body, "tag filter query");
        let hits = self.engine.search(self.document_index(index), &body).await?;
        Ok(hits.into_iter().map(|hit| hit.id).collect())
    }

    #[instrument(skip(self, meta))]
    async fn update_document_meta(
        &self,
        id: &str,
        meta: Map<String, Value>,
        index: Option<&str>,
    ) -> Result<()> {
        let fields = meta
            .into_iter()
            .map(|(key, value)| (self.options.fields.meta_key(&key).to_string(), value))
            .collect();
        let operation = BulkOperation::update(self.document_index(index), id, fields);
        self.writer.submit(vec![operation]).await?;
        Ok(())
    }

    async fn get_document_count(&self, index: Option<&str>) -> Result<u64> {
        self.engine.count(self.document_index(index)).await
    }

    async fn get_label_count(&self, index: Option<&str>) -> Result<u64> {
        self.engine.count(self.label_index(index)).await
    }

    async fn get_all_documents(
        &self,
        index: Option<&str>,
        filters: Option<&Filters>,
    ) -> Result<Vec<Document>> {
        self.scan_all(self.document_index(index), filters)?
            .stream()
            .map_ok(|hit| self.queries.to_document(hit, QueryShape::FilterOnly))
            .try_collect()
            .await
    }

    async fn get_all_labels(&self, index: Option<&str>, filters: Option<&Filters>) -> Result<Vec<Label>> {
        self.scan_all(self.label_index(index), filters)?
            .stream()
            .and_then(|hit| async move { Label::from_map(hit.source) })
            .try_collect()
            .await
    }

    async fn describe_documents(&self, index: Option<&str>) -> Result<DocumentStats> {
        let documents = self.get_all_documents(index, None).await?;
        let lengths = documents.iter().map(|d| d.text.chars().count()).collect();
        Ok(DocumentStats::from_lengths(lengths))
    }

    #[instrument(skip(self))]
    async fn delete_all_documents(&self, index: &str) -> Result<()> {
        if !self.indices.exists(index).await? {
            debug!(index, "nothing to delete, index missing");
            return Ok(());
        }

        let deleted = self
            .engine
            .delete_by_query(index, &json!({ "match_all": {} }), true)
            .await?;

        let started = Instant::now();
        loop {
            let remaining = self.engine.count(index).await?;
            if remaining == 0 {
                info!(index, deleted, "all documents deleted");
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.options.delete_confirm_timeout {
                return Err(DomainError::DeleteNotConfirmed {
                    index: index.to_string(),
                    remaining,
                    waited_ms: waited.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.options.delete_poll_interval).await;
        }
    }
}
