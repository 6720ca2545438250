use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::domain::{
    ports::SearchEngine, BulkItemOutcome, BulkOperation, BulkResponse, DomainError, Embedding,
    ScrollPage, SearchHit, WriteIntent,
};

const DEFAULT_SIZE: usize = 10;

type Source = Map<String, Value>;

/// In-process engine for the query subset this crate emits.
pub struct InMemorySearchEngine {
    indices: RwLock<HashMap<String, MemoryIndex>>,
    scrolls: Mutex<HashMap<String, ScrollCursor>>,
    requests: Mutex<Vec<String>>,
}

struct MemoryIndex {
    mapping: Value,
    records: Vec<(String, Source)>,
}

struct ScrollCursor {
    hits: Vec<SearchHit>,
    position: usize,
    page_size: usize,
}

impl ScrollCursor {
    fn next_page(&mut self) -> Vec<SearchHit> {
        let end = (self.position + self.page_size).min(self.hits.len());
        let page = self.hits[self.position..end].to_vec();
        self.position = end;
        page
    }
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            scrolls: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Names of the engine calls received so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn mapping(&self, index: &str) -> Option<Value> {
        let indices = self.indices.read().ok()?;
        indices.get(index).map(|i| i.mapping.clone())
    }

    pub fn stored(&self, index: &str, id: &str) -> Option<Source> {
        let indices = self.indices.read().ok()?;
        indices
            .get(index)?
            .records
            .iter()
            .find(|(record_id, _)| record_id == id)
            .map(|(_, source)| source.clone())
    }

    fn record(&self, request: &str) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.to_string());
        }
    }

    fn matching(&self, index: &str, query: &Value) -> Result<Vec<(usize, f64)>, DomainError> {
        let indices = self
            .indices
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        let memory = indices
            .get(index)
            .ok_or_else(|| DomainError::not_found(format!("no such index [{index}]")))?;

        let mut matches = Vec::new();
        for (position, (id, source)) in memory.records.iter().enumerate() {
            if let Some(score) = evaluate(query, id, source)? {
                matches.push((position, score));
            }
        }
        matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(matches)
    }

    fn hits(&self, index: &str, body: &Value, limit: Option<usize>) -> Result<Vec<SearchHit>, DomainError> {
        let query = body.get("query").cloned().unwrap_or_else(|| json!({ "match_all": {} }));
        let mut matches = self.matching(index, &query)?;
        if let Some(limit) = limit {
            matches.truncate(limit);
        }

        let excludes: Vec<String> = body
            .pointer("/_source/excludes")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let indices = self
            .indices
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        let records = indices
            .get(index)
            .map(|i| i.records.as_slice())
            .unwrap_or_default();

        Ok(matches
            .into_iter()
            .filter_map(|(position, score)| {
                let (id, source) = records.get(position)?;
                let mut source = source.clone();
                for field in &excludes {
                    source.remove(field);
                }
                Some(SearchHit {
                    id: id.clone(),
                    score: Some(score),
                    source,
                })
            })
            .collect())
    }

    fn apply(index: &mut MemoryIndex, operation: &BulkOperation) -> BulkItemOutcome {
        match operation.intent {
            WriteIntent::Insert => {
                let id = operation
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                if index.records.iter().any(|(existing, _)| *existing == id) {
                    return BulkItemOutcome::failed(
                        Some(id.clone()),
                        409,
                        format!("version_conflict_engine_exception: [{id}]: document already exists"),
                    );
                }
                index.records.push((id.clone(), operation.source.clone()));
                BulkItemOutcome::ok(id, 201)
            }
            WriteIntent::Update => {
                let id = operation.id.clone().unwrap_or_default();
                match index.records.iter_mut().find(|(existing, _)| *existing == id) {
                    Some((_, source)) => {
                        for (key, value) in &operation.source {
                            source.insert(key.clone(), value.clone());
                        }
                        BulkItemOutcome::ok(id, 200)
                    }
                    None => BulkItemOutcome::failed(
                        Some(id.clone()),
                        404,
                        format!("document_missing_exception: [{id}]: document missing"),
                    ),
                }
            }
        }
    }
}

impl Default for InMemorySearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchEngine for InMemorySearchEngine {
    async fn index_exists(&self, index: &str) -> Result<bool, DomainError> {
        self.record("index_exists");
        let indices = self
            .indices
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        Ok(indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<bool, DomainError> {
        self.record("create_index");
        let mut indices = self
            .indices
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        if indices.contains_key(index) {
            return Ok(false);
        }
        indices.insert(
            index.to_string(),
            MemoryIndex {
                mapping: body.clone(),
                records: Vec::new(),
            },
        );
        Ok(true)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Vec<SearchHit>, DomainError> {
        self.record("search");
        self.hits(index, body, Some(size_of(body)?))
    }

    async fn count(&self, index: &str) -> Result<u64, DomainError> {
        self.record("count");
        Ok(self.matching(index, &json!({ "match_all": {} }))?.len() as u64)
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, DomainError> {
        self.record("bulk");
        let mut indices = self
            .indices
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        let items = operations
            .iter()
            .map(|operation| {
                let index = indices
                    .entry(operation.index.clone())
                    .or_insert_with(|| MemoryIndex {
                        mapping: json!({}),
                        records: Vec::new(),
                    });
                Self::apply(index, operation)
            })
            .collect();

        Ok(BulkResponse { items })
    }

    async fn delete_by_query(
        &self,
        index: &str,
        query: &Value,
        _refresh: bool,
    ) -> Result<u64, DomainError> {
        self.record("delete_by_query");
        let mut indices = self
            .indices
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        let Some(memory) = indices.get_mut(index) else {
            return Ok(0);
        };

        let mut doomed = Vec::with_capacity(memory.records.len());
        for (id, source) in &memory.records {
            doomed.push(evaluate(query, id, source)?.is_some());
        }

        let mut flags = doomed.iter();
        memory.records.retain(|_| !flags.next().copied().unwrap_or(false));
        Ok(doomed.iter().filter(|d| **d).count() as u64)
    }

    async fn scroll_start(
        &self,
        index: &str,
        body: &Value,
        _keep_alive: &str,
    ) -> Result<ScrollPage, DomainError> {
        self.record("scroll_start");
        let mut cursor = ScrollCursor {
            hits: self.hits(index, body, None)?,
            position: 0,
            page_size: size_of(body)?.max(1),
        };
        let hits = cursor.next_page();

        let scroll_id = Uuid::new_v4().to_string();
        self.scrolls
            .lock()
            .map_err(|e| DomainError::internal(e.to_string()))?
            .insert(scroll_id.clone(), cursor);

        Ok(ScrollPage {
            scroll_id: Some(scroll_id),
            hits,
        })
    }

    async fn scroll_next(&self, scroll_id: &str, _keep_alive: &str) -> Result<ScrollPage, DomainError> {
        self.record("scroll_next");
        let mut scrolls = self
            .scrolls
            .lock()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        let cursor = scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| DomainError::not_found(format!("scroll [{scroll_id}]")))?;

        Ok(ScrollPage {
            scroll_id: Some(scroll_id.to_string()),
            hits: cursor.next_page(),
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), DomainError> {
        self.record("clear_scroll");
        self.scrolls
            .lock()
            .map_err(|e| DomainError::internal(e.to_string()))?
            .remove(scroll_id);
        Ok(())
    }
}

fn size_of(body: &Value) -> Result<usize, DomainError> {
    match body.get("size") {
        None => Ok(DEFAULT_SIZE),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| DomainError::validation(format!("invalid size {n}"))),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid size {s}"))),
        Some(other) => Err(DomainError::validation(format!("invalid size {other}"))),
    }
}

fn evaluate(query: &Value, id: &str, source: &Source) -> Result<Option<f64>, DomainError> {
    let Some((kind, clause)) = query.as_object().and_then(|o| o.iter().next()) else {
        return Err(DomainError::validation(format!("malformed query clause {query}")));
    };

    match kind.as_str() {
        "match_all" => Ok(Some(1.0)),
        "ids" => {
            let found = clause
                .get("values")
                .and_then(Value::as_array)
                .is_some_and(|values| values.iter().any(|v| v.as_str() == Some(id)));
            Ok(found.then_some(1.0))
        }
        "terms" => {
            let (field, allowed) = single_entry(clause, kind)?;
            let allowed = allowed
                .as_array()
                .ok_or_else(|| DomainError::validation(format!("terms on {field} needs a list")))?;
            let hit = field_values(source, field)
                .into_iter()
                .any(|value| allowed.iter().any(|a| values_equal(a, value)));
            Ok(hit.then_some(1.0))
        }
        "term" => {
            let (field, expected) = single_entry(clause, kind)?;
            let expected = expected.get("value").unwrap_or(expected);
            let hit = field_values(source, field)
                .into_iter()
                .any(|value| values_equal(expected, value));
            Ok(hit.then_some(1.0))
        }
        "match" => {
            let (field, text) = single_entry(clause, kind)?;
            let text = text.get("query").unwrap_or(text);
            let score = relevance(&value_text(text), source, field);
            Ok((score > 0.0).then_some(score))
        }
        "multi_match" => {
            let text = clause.get("query").map(value_text).unwrap_or_default();
            let score: f64 = clause
                .get("fields")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(|field| relevance(&text, source, field.split('^').next().unwrap_or(field)))
                .sum();
            Ok((score > 0.0).then_some(score))
        }
        "bool" => evaluate_bool(clause, id, source),
        "script_score" => {
            let base = clause.get("query").cloned().unwrap_or_else(|| json!({ "match_all": {} }));
            if evaluate(&base, id, source)?.is_none() {
                return Ok(None);
            }
            let script = clause
                .get("script")
                .ok_or_else(|| DomainError::validation("script_score without script"))?;
            let program = script.get("source").and_then(Value::as_str).unwrap_or_default();
            let (field, offset) = parse_cosine_script(program)
                .ok_or_else(|| DomainError::validation(format!("unsupported script `{program}`")))?;
            let query_vector: Embedding = script
                .pointer("/params/query_vector")
                .cloned()
                .map(serde_json::from_value::<Embedding>)
                .transpose()?
                .ok_or_else(|| DomainError::validation("script params lack query_vector"))?;

            let stored = source
                .get(&field)
                .cloned()
                .and_then(|v| serde_json::from_value::<Embedding>(v).ok());
            Ok(stored.map(|stored| query_vector.cosine_similarity(&stored) + offset))
        }
        other => Err(DomainError::validation(format!("unsupported query clause `{other}`"))),
    }
}

fn evaluate_bool(clause: &Value, id: &str, source: &Source) -> Result<Option<f64>, DomainError> {
    let must = clauses(clause.get("must"));
    let filter = clauses(clause.get("filter"));
    let should = clauses(clause.get("should"));
    let must_not = clauses(clause.get("must_not"));

    let mut score = 0.0;
    for query in &must {
        match evaluate(query, id, source)? {
            Some(s) => score += s,
            None => return Ok(None),
        }
    }
    for query in &filter {
        if evaluate(query, id, source)?.is_none() {
            return Ok(None);
        }
    }
    for query in &must_not {
        if evaluate(query, id, source)?.is_some() {
            return Ok(None);
        }
    }

    let mut matched_should = 0;
    for query in &should {
        if let Some(s) = evaluate(query, id, source)? {
            score += s;
            matched_should += 1;
        }
    }

    // Without must or filter clauses at least one should clause has to match.
    if must.is_empty() && filter.is_empty() && !should.is_empty() && matched_should == 0 {
        return Ok(None);
    }
    Ok(Some(score))
}

fn clauses(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(_)) => vec![value.cloned().unwrap_or_default()],
        _ => Vec::new(),
    }
}

fn single_entry<'a>(clause: &'a Value, kind: &str) -> Result<(&'a str, &'a Value), DomainError> {
    clause
        .as_object()
        .and_then(|o| o.iter().next())
        .map(|(field, value)| (field.as_str(), value))
        .ok_or_else(|| DomainError::validation(format!("{kind} clause needs a field")))
}

fn field_values<'a>(source: &'a Source, field: &str) -> Vec<&'a Value> {
    match source.get(field) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(value) => vec![value],
        None => Vec::new(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Occurrences of query terms in the field, a stand-in for BM25.
fn relevance(query: &str, source: &Source, field: &str) -> f64 {
    let query_terms = tokens(query);
    let field_terms: Vec<String> = field_values(source, field)
        .into_iter()
        .flat_map(|v| tokens(&value_text(v)))
        .collect();

    query_terms
        .iter()
        .map(|term| field_terms.iter().filter(|t| *t == term).count() as f64)
        .sum()
}

/// Reads `cosineSimilarity(params.query_vector, doc['<field>']) + <offset>`.
fn parse_cosine_script(program: &str) -> Option<(String, f64)> {
    let rest = program.trim().strip_prefix("cosineSimilarity(")?;
    let start = rest.find("doc['")? + "doc['".len();
    let end = start + rest[start..].find("']")?;
    let field = rest[start..end].to_string();

    let tail = rest[end..].split_once(')')?.1.trim();
    let offset = match tail.strip_prefix('+') {
        Some(number) => number.trim().parse().ok()?,
        None if tail.is_empty() => 0.0,
        None => return None,
    };
    Some((field, offset))
}
