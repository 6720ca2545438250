use std::collections::HashMap;

use serde_json::{json, Value};

use crate::domain::{Document, DomainError, Embedding, FieldMap, Filters, Result, SearchHit};

/// Added to cosine similarity on the engine side so scores stay non-negative.
pub const COSINE_OFFSET: f64 = 1.0;

pub const QUESTION_PLACEHOLDER: &str = "question";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    FilterOnly,
    Custom,
    Keyword,
    Similarity,
}

impl QueryShape {
    pub fn score_adjustment(&self) -> f64 {
        match self {
            Self::Similarity => -COSINE_OFFSET,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    fields: FieldMap,
    search_fields: Vec<String>,
    excluded_fields: Vec<String>,
}

impl QueryBuilder {
    pub fn new(fields: FieldMap, search_fields: Vec<String>, excluded_fields: Vec<String>) -> Self {
        Self {
            fields,
            search_fields,
            excluded_fields,
        }
    }

    /// Shape priority: no text, then template, then keyword.
    pub fn build(
        &self,
        query: Option<&str>,
        filters: Option<&Filters>,
        top_k: usize,
        custom_query: Option<&str>,
    ) -> Result<(QueryShape, Value)> {
        let clauses = filter_clauses(filters)?;

        let (shape, mut body) = match (query, custom_query) {
            (None, _) => (
                QueryShape::FilterOnly,
                json!({ "size": top_k, "query": match_all(clauses) }),
            ),
            (Some(text), Some(template)) => {
                (QueryShape::Custom, self.custom_body(text, filters, top_k, template)?)
            }
            (Some(text), None) => {
                let mut bool_query = json!({
                    "should": [{
                        "multi_match": {
                            "query": text,
                            "type": "most_fields",
                            "fields": self.search_fields
                        }
                    }]
                });
                if !clauses.is_empty() {
                    bool_query["filter"] = Value::Array(clauses);
                }
                let body = json!({ "size": top_k, "query": { "bool": bool_query } });
                (QueryShape::Keyword, body)
            }
        };

        self.apply_exclusions(&mut body);
        Ok((shape, body))
    }

    pub fn build_similarity(
        &self,
        query: &Embedding,
        filters: Option<&Filters>,
        top_k: usize,
    ) -> Result<Value> {
        let embedding_field = self.fields.embedding_field.as_deref().ok_or_else(|| {
            DomainError::configuration("similarity search requires an embedding field")
        })?;
        let clauses = filter_clauses(filters)?;

        let mut body = json!({
            "size": top_k,
            "query": {
                "script_score": {
                    "query": match_all(clauses),
                    "script": {
                        "source": format!(
                            "cosineSimilarity(params.query_vector, doc['{embedding_field}']) + {COSINE_OFFSET:.1}"
                        ),
                        "params": { "query_vector": query.as_slice() }
                    }
                }
            }
        });

        self.apply_exclusions(&mut body);
        Ok(body)
    }

    pub fn filtered_match_all(filters: Option<&Filters>) -> Result<Value> {
        Ok(match_all(filter_clauses(filters)?))
    }

    pub fn to_document(&self, hit: SearchHit, shape: QueryShape) -> Document {
        let score = hit
            .score
            .filter(|s| *s != 0.0)
            .map(|s| s + shape.score_adjustment());
        self.fields.from_source(hit.id, hit.source, score)
    }

    fn custom_body(
        &self,
        text: &str,
        filters: Option<&Filters>,
        top_k: usize,
        template: &str,
    ) -> Result<Value> {
        let mut substitutions = HashMap::new();
        substitutions.insert(QUESTION_PLACEHOLDER.to_string(), text.to_string());
        if let Some(filters) = filters {
            for (key, values) in filters.validated()? {
                substitutions.insert(key.to_string(), serde_json::to_string(values)?);
            }
        }

        let rendered = substitute_template(template, &substitutions)?;
        let mut body: Value = serde_json::from_str(&rendered).map_err(|e| {
            DomainError::invalid_template(format!("substituted template is not valid JSON: {e}"))
        })?;
        let Some(object) = body.as_object_mut() else {
            return Err(DomainError::invalid_template("template must render to a JSON object"));
        };
        object.insert("size".to_string(), json!(top_k));
        Ok(body)
    }

    fn apply_exclusions(&self, body: &mut Value) {
        if !self.excluded_fields.is_empty() {
            body["_source"] = json!({ "excludes": self.excluded_fields });
        }
    }
}

fn filter_clauses(filters: Option<&Filters>) -> Result<Vec<Value>> {
    filters.map_or_else(|| Ok(Vec::new()), Filters::terms_clauses)
}

fn match_all(clauses: Vec<Value>) -> Value {
    let mut bool_query = json!({ "must": { "match_all": {} } });
    if !clauses.is_empty() {
        bool_query["filter"] = Value::Array(clauses);
    }
    json!({ "bool": bool_query })
}

/// Replaces `$name` and `${name}` placeholders. `$$` yields a literal `$`.
pub fn substitute_template(template: &str, substitutions: &HashMap<String, String>) -> Result<String> {
    let lookup = |name: &str| {
        substitutions
            .get(name)
            .ok_or_else(|| DomainError::invalid_template(format!("no value for placeholder `{name}`")))
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek().map(|&(_, next)| next) {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, ch)) => name.push(ch),
                        None => {
                            return Err(DomainError::invalid_template(format!(
                                "unterminated placeholder at offset {pos}"
                            )))
                        }
                    }
                }
                if !is_identifier(&name) {
                    return Err(DomainError::invalid_template(format!(
                        "invalid placeholder `${{{name}}}` at offset {pos}"
                    )));
                }
                out.push_str(lookup(&name)?);
            }
            Some(ch) if ch == '_' || ch.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch == '_' || ch.is_ascii_alphanumeric() {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(lookup(&name)?);
            }
            _ => {
                return Err(DomainError::invalid_template(format!(
                    "invalid placeholder at offset {pos}"
                )))
            }
        }
    }

    Ok(out)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
