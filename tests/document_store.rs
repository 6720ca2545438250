use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use docstore::application::{EmbeddingRefresher, SearchDocumentStore, StoreOptions};
use docstore::domain::ports::{DocumentStore, EmbeddingService, SearchEngine};
use docstore::domain::{
    BulkOperation, BulkResponse, Document, DocumentInput, DomainError, Embedding, FieldMap, Filters,
    Label, ScrollPage, SearchHit,
};
use docstore::infrastructure::InMemorySearchEngine;

/// Returns `[1.0, 2.0, ...]` of a fixed length for every text.
struct FixedEmbedding {
    dimension: usize,
}

#[async_trait]
impl EmbeddingService for FixedEmbedding {
    async fn embed(&self, _text: &str) -> Result<Embedding, DomainError> {
        Ok(Embedding::new((1..=self.dimension).map(|i| i as f32).collect()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Loses every vector after the first.
struct TruncatingEmbedding;

#[async_trait]
impl EmbeddingService for TruncatingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Embedding, DomainError> {
        Ok(Embedding::new(vec![1.0, 0.0, 0.0]))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        let mut out = Vec::new();
        if let Some(text) = texts.first() {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Acknowledges delete-by-query without removing anything.
struct IgnoresDeletes(Arc<InMemorySearchEngine>);

#[async_trait]
impl SearchEngine for IgnoresDeletes {
    async fn index_exists(&self, index: &str) -> Result<bool, DomainError> {
        self.0.index_exists(index).await
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<bool, DomainError> {
        self.0.create_index(index, body).await
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Vec<SearchHit>, DomainError> {
        self.0.search(index, body).await
    }

    async fn count(&self, index: &str) -> Result<u64, DomainError> {
        self.0.count(index).await
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, DomainError> {
        self.0.bulk(operations).await
    }

    async fn delete_by_query(&self, _index: &str, _query: &Value, _refresh: bool) -> Result<u64, DomainError> {
        Ok(0)
    }

    async fn scroll_start(&self, index: &str, body: &Value, keep_alive: &str) -> Result<ScrollPage, DomainError> {
        self.0.scroll_start(index, body, keep_alive).await
    }

    async fn scroll_next(&self, scroll_id: &str, keep_alive: &str) -> Result<ScrollPage, DomainError> {
        self.0.scroll_next(scroll_id, keep_alive).await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), DomainError> {
        self.0.clear_scroll(scroll_id).await
    }
}

fn bulk_calls(engine: &InMemorySearchEngine) -> usize {
    engine.requests().iter().filter(|r| *r == "bulk").count()
}

fn options(embedding_dim: usize) -> StoreOptions {
    StoreOptions {
        index: "docs".to_string(),
        label_index: "labels".to_string(),
        embedding_dim,
        delete_confirm_timeout: Duration::from_millis(200),
        delete_poll_interval: Duration::from_millis(10),
        ..StoreOptions::default()
    }
}

async fn store_with(embedding_dim: usize) -> (Arc<InMemorySearchEngine>, SearchDocumentStore) {
    let engine = Arc::new(InMemorySearchEngine::new());
    let store = SearchDocumentStore::connect(engine.clone(), options(embedding_dim))
        .await
        .unwrap();
    (engine, store)
}

fn meta(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

#[tokio::test]
async fn test_write_then_read_back() {
    let (_, store) = store_with(3).await;
    let doc = Document::new("Berlin is the capital of Germany.")
        .with_id("d1")
        .with_meta(meta(json!({"name": "berlin.txt", "year": 2020})))
        .with_embedding(vec![0.1, 0.2, 0.3])
        .with_tags(json!(["geo"]));

    let summary = store.write_documents(vec![doc.clone().into()], None).await.unwrap();
    assert_eq!(summary.succeeded, 1);

    let stored = store.get_document_by_id("d1", None).await.unwrap().unwrap();
    assert_eq!(stored.text, doc.text);
    assert_eq!(stored.meta, doc.meta);
    assert_eq!(stored.tags, doc.tags);
    assert_eq!(stored.embedding, doc.embedding);
    assert_eq!(store.get_document_count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_raw_records_are_accepted() {
    let (_, store) = store_with(3).await;
    let raw = meta(json!({"id": "r1", "text": "from a map", "meta": {"source": "csv"}}));

    store
        .write_documents(vec![DocumentInput::Raw(raw)], None)
        .await
        .unwrap();

    let stored = store.get_document_by_id("r1", None).await.unwrap().unwrap();
    assert_eq!(stored.text, "from a map");
    assert_eq!(stored.meta["source"], json!("csv"));
}

#[tokio::test]
async fn test_connect_twice_keeps_indices() {
    let engine = Arc::new(InMemorySearchEngine::new());
    let first = SearchDocumentStore::connect(engine.clone(), options(3)).await.unwrap();
    first
        .write_documents(vec![Document::new("kept").into()], None)
        .await
        .unwrap();

    let second = SearchDocumentStore::connect(engine.clone(), options(3)).await.unwrap();
    assert_eq!(second.get_document_count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_id_rejected_and_original_kept() {
    let (_, store) = store_with(3).await;
    store
        .write_documents(vec![Document::new("first").with_id("same").into()], None)
        .await
        .unwrap();

    let err = store
        .write_documents(vec![Document::new("second").with_id("same").into()], None)
        .await
        .unwrap_err();

    let failures = err.write_failures().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].id.as_deref(), Some("same"));
    let stored = store.get_document_by_id("same", None).await.unwrap().unwrap();
    assert_eq!(stored.text, "first");
}

#[tokio::test]
async fn test_scalar_filter_fails_before_any_request() {
    let (engine, store) = store_with(3).await;
    let before = engine.requests().len();
    let filters = Filters::new().with_raw("year", json!(2020));

    let err = store
        .query(Some("capital"), Some(&filters), 10, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidFilterFormat { ref key } if key == "year"));

    let err = store
        .query_by_embedding(&Embedding::new(vec![1.0, 0.0, 0.0]), Some(&filters), 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidFilterFormat { .. }));

    assert!(store.get_all_documents(None, Some(&filters)).await.is_err());
    assert_eq!(engine.requests().len(), before);
}

#[tokio::test]
async fn test_keyword_query_with_filters() {
    let (_, store) = store_with(3).await;
    let docs: Vec<DocumentInput> = vec![
        Document::new("the capital of France is Paris").with_meta_entry("year", 2020).into(),
        Document::new("the capital of Germany is Berlin").with_meta_entry("year", 2021).into(),
        Document::new("rivers of Europe").with_meta_entry("year", 2020).into(),
    ];
    store.write_documents(docs, None).await.unwrap();

    let filters = Filters::new().with_values("year", [2020]);
    let results = store
        .query(Some("capital"), Some(&filters), 10, None, None)
        .await
        .unwrap();

    assert_eq!(results[0].text, "the capital of France is Paris");
    assert!(results[0].query_score.unwrap() > 0.0);
    assert!(results.iter().all(|d| d.meta["year"] == json!(2020)));
}

#[tokio::test]
async fn test_filter_only_query_respects_top_k() {
    let (_, store) = store_with(3).await;
    let docs: Vec<DocumentInput> = (0..5)
        .map(|i| Document::new(format!("doc {i}")).with_meta_entry("group", "a").into())
        .collect();
    store.write_documents(docs, None).await.unwrap();

    let filters = Filters::new().with_values("group", ["a"]);
    let results = store.query(None, Some(&filters), 2, None, None).await.unwrap();
    assert_eq!(results.len(), 2);

    let everything = store.query(None, None, 10, None, None).await.unwrap();
    assert_eq!(everything.len(), 5);
}

#[tokio::test]
async fn test_similarity_score_of_identical_vector() {
    let (_, store) = store_with(3).await;
    store
        .write_documents(
            vec![
                Document::new("match").with_embedding(vec![1.0, 2.0, 2.0]).into(),
                Document::new("other").with_embedding(vec![-1.0, 0.0, 0.0]).into(),
            ],
            None,
        )
        .await
        .unwrap();

    let results = store
        .query_by_embedding(&Embedding::new(vec![1.0, 2.0, 2.0]), None, 1, None)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "match");
    assert_eq!(results[0].query_score, Some(1.0));
}

#[tokio::test]
async fn test_similarity_with_filters() {
    let (_, store) = store_with(2).await;
    store
        .write_documents(
            vec![
                Document::new("a")
                    .with_embedding(vec![1.0, 0.0])
                    .with_meta_entry("lang", "en")
                    .into(),
                Document::new("b")
                    .with_embedding(vec![1.0, 0.1])
                    .with_meta_entry("lang", "de")
                    .into(),
            ],
            None,
        )
        .await
        .unwrap();

    let filters = Filters::new().with_values("lang", ["de"]);
    let results = store
        .query_by_embedding(&Embedding::new(vec![1.0, 0.0]), Some(&filters), 10, None)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "b");
}

#[tokio::test]
async fn test_similarity_without_embedding_field() {
    let engine = Arc::new(InMemorySearchEngine::new());
    let options = StoreOptions {
        fields: FieldMap::default().with_embedding_field(None),
        ..options(3)
    };
    let store = SearchDocumentStore::connect(engine, options).await.unwrap();

    let err = store
        .query_by_embedding(&Embedding::new(vec![1.0, 0.0, 0.0]), None, 10, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Configuration(_)));
}

#[tokio::test]
async fn test_custom_query_template() {
    let (_, store) = store_with(3).await;
    store
        .write_documents(
            vec![
                Document::new("why is the sky blue").with_meta_entry("year", 2019).into(),
                Document::new("why is grass green").with_meta_entry("year", 2020).into(),
            ],
            None,
        )
        .await
        .unwrap();

    let template = r#"{"query": {"bool": {
        "must": {"match": {"text": "${question}"}},
        "filter": {"terms": {"year": ${year}}}
    }}}"#;
    let filters = Filters::new().with_values("year", [2020]);
    let results = store
        .query(Some("why"), Some(&filters), 10, Some(template), None)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "why is grass green");

    let err = store
        .query(Some("why"), None, 10, Some(r#"{"query": ${missing}}"#), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidQueryTemplate(_)));
}

#[tokio::test]
async fn test_refresh_embeddings() {
    let (engine, store) = store_with(3).await;
    store
        .write_documents(
            vec![
                Document::new("one").with_id("e1").with_meta_entry("year", 2020).into(),
                Document::new("two").with_id("e2").into(),
            ],
            None,
        )
        .await
        .unwrap();

    let store = Arc::new(store);
    let refresher = EmbeddingRefresher::new(Arc::new(FixedEmbedding { dimension: 3 }), store.clone());
    let summary = refresher.refresh(None).await.unwrap();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(bulk_calls(&engine), 2);

    let one = store.get_document_by_id("e1", None).await.unwrap().unwrap();
    assert_eq!(one.embedding, Some(Embedding::new(vec![1.0, 2.0, 3.0])));
    assert_eq!(one.text, "one");
    assert_eq!(Value::Object(one.meta), json!({"year": 2020}));

    let two = engine.stored("docs", "e2").unwrap();
    assert_eq!(two["embedding"], json!([1.0, 2.0, 3.0]));
    assert_eq!(two["text"], json!("two"));
}

#[tokio::test]
async fn test_refresh_vector_count_mismatch() {
    let (engine, store) = store_with(3).await;
    store
        .write_documents(vec![Document::new("one").into(), Document::new("two").into()], None)
        .await
        .unwrap();
    let before = bulk_calls(&engine);

    let refresher = EmbeddingRefresher::new(Arc::new(TruncatingEmbedding), Arc::new(store));
    let err = refresher.refresh(None).await.unwrap_err();

    assert!(matches!(err, DomainError::Internal(_)));
    assert_eq!(bulk_calls(&engine), before);
}

#[tokio::test]
async fn test_refresh_dimension_mismatch_writes_nothing() {
    let (engine, store) = store_with(128).await;
    store
        .write_documents(vec![Document::new("one").into()], None)
        .await
        .unwrap();
    let bulk_before = bulk_calls(&engine);

    let refresher = EmbeddingRefresher::new(Arc::new(FixedEmbedding { dimension: 64 }), Arc::new(store));
    let err = refresher.refresh(None).await.unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, DomainError::Configuration(_)));
    assert!(message.contains("64") && message.contains("128"));
    assert_eq!(bulk_calls(&engine), bulk_before);
}

#[tokio::test]
async fn test_labels_round_trip() {
    let (_, store) = store_with(3).await;
    let label = Label::new("capital of France?", "Paris", "gold_label").with_document("d1", 27);

    store.write_labels(vec![label.clone().into()], None).await.unwrap();

    assert_eq!(store.get_label_count(None).await.unwrap(), 1);
    let labels = store.get_all_labels(None, None).await.unwrap();
    assert_eq!(labels, vec![label]);

    let filters = Filters::new().with_values("origin", ["user_feedback"]);
    assert!(store.get_all_labels(None, Some(&filters)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_all_documents() {
    let (_, store) = store_with(3).await;
    let docs: Vec<DocumentInput> = (0..4).map(|i| Document::new(format!("d{i}")).into()).collect();
    store.write_documents(docs, None).await.unwrap();

    store.delete_all_documents("docs").await.unwrap();
    assert_eq!(store.get_document_count(None).await.unwrap(), 0);

    // Missing index is a no-op.
    store.delete_all_documents("never_created").await.unwrap();
}

#[tokio::test]
async fn test_delete_all_times_out_when_records_remain() {
    let memory = Arc::new(InMemorySearchEngine::new());
    let engine = Arc::new(IgnoresDeletes(memory.clone()));
    let store = SearchDocumentStore::connect(engine, options(3)).await.unwrap();
    store
        .write_documents(vec![Document::new("stays").into()], None)
        .await
        .unwrap();

    let err = store.delete_all_documents("docs").await.unwrap_err();

    match err {
        DomainError::DeleteNotConfirmed { index, remaining, waited_ms } => {
            assert_eq!(index, "docs");
            assert_eq!(remaining, 1);
            assert!(waited_ms >= 200);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_describe_documents() {
    let (_, store) = store_with(3).await;
    let docs: Vec<DocumentInput> = ["a", "abc", "abcdef"]
        .iter()
        .map(|t| Document::new(*t).into())
        .collect();
    store.write_documents(docs, None).await.unwrap();

    let stats = store.describe_documents(None).await.unwrap();
    assert_eq!(stats.count, 3);
    assert_eq!(stats.chars_min, 1);
    assert_eq!(stats.chars_max, 6);
    assert_eq!(stats.chars_median, 3.0);
}

#[tokio::test]
async fn test_ids_by_tags_and_meta_update() {
    let (_, store) = store_with(3).await;
    store
        .write_documents(
            vec![
                Document::new("x").with_id("t1").with_tags(json!(["faq"])).into(),
                Document::new("y").with_id("t2").with_tags(json!(["news"])).into(),
            ],
            None,
        )
        .await
        .unwrap();

    let tags = Filters::new().with_values("tags", ["faq"]);
    let ids = store.get_document_ids_by_tags(&tags, None).await.unwrap();
    assert_eq!(ids, vec!["t1".to_string()]);

    store
        .update_document_meta("t2", meta(json!({"reviewed": true})), None)
        .await
        .unwrap();
    let updated = store.get_document_by_id("t2", None).await.unwrap().unwrap();
    assert_eq!(updated.meta["reviewed"], json!(true));
    assert_eq!(updated.text, "y");
}

#[tokio::test]
async fn test_write_to_other_index_creates_it() {
    let (engine, store) = store_with(3).await;
    store
        .write_documents(vec![Document::new("elsewhere").into()], Some("archive"))
        .await
        .unwrap();

    assert!(engine.mapping("archive").is_some());
    assert_eq!(store.get_document_count(Some("archive")).await.unwrap(), 1);
    assert_eq!(store.get_document_count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_question_meta_key_survives_without_faq_field() {
    let (_, store) = store_with(3).await;
    let doc = Document::new("body").with_id("q1").with_meta_entry("question", "who?");

    store.write_documents(vec![doc.clone().into()], None).await.unwrap();

    let back = store.get_document_by_id("q1", None).await.unwrap().unwrap();
    assert_eq!(back.meta, doc.meta);
    assert_eq!(back.question, None);
}

#[tokio::test]
async fn test_faq_question_field_round_trip() {
    let engine = Arc::new(InMemorySearchEngine::new());
    let options = StoreOptions {
        fields: FieldMap::default().with_question_field(Some("faq".to_string())),
        ..options(3)
    };
    let store = SearchDocumentStore::connect(engine.clone(), options).await.unwrap();
    let doc = Document::new("answer").with_id("f1").with_question("asked?");

    store.write_documents(vec![doc.into()], None).await.unwrap();

    assert_eq!(engine.stored("docs", "f1").unwrap()["faq"], json!("asked?"));
    let back = store.get_document_by_id("f1", None).await.unwrap().unwrap();
    assert_eq!(back.question.as_deref(), Some("asked?"));
    assert!(back.meta.is_empty());
}

#[tokio::test]
async fn test_raw_record_with_null_meta() {
    let (_, store) = store_with(3).await;
    let raw = meta(json!({"id": "r1", "text": "t", "meta": null}));

    store
        .write_documents(vec![DocumentInput::Raw(raw)], None)
        .await
        .unwrap();

    let stored = store.get_document_by_id("r1", None).await.unwrap().unwrap();
    assert_eq!(stored.text, "t");
    assert!(stored.meta.is_empty());
}

#[tokio::test]
async fn test_meta_update_uses_name_field() {
    let engine = Arc::new(InMemorySearchEngine::new());
    let options = StoreOptions {
        fields: FieldMap::new("text", "title"),
        ..options(3)
    };
    let store = SearchDocumentStore::connect(engine.clone(), options).await.unwrap();
    store
        .write_documents(vec![Document::new("body").with_id("n1").into()], None)
        .await
        .unwrap();

    store
        .update_document_meta("n1", meta(json!({"name": "renamed.txt"})), None)
        .await
        .unwrap();

    let stored = engine.stored("docs", "n1").unwrap();
    assert_eq!(stored["title"], json!("renamed.txt"));
    assert!(!stored.contains_key("name"));
    let back = store.get_document_by_id("n1", None).await.unwrap().unwrap();
    assert_eq!(back.meta["name"], json!("renamed.txt"));
}
