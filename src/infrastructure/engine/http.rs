use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use crate::domain::{
    ports::SearchEngine, BulkItemOutcome, BulkOperation, BulkResponse, DomainError, ScrollPage,
    SearchHit, WriteIntent,
};
use crate::infrastructure::config::StoreConfig;

const NDJSON: &str = "application/x-ndjson";

/// [`SearchEngine`] speaking the Elasticsearch REST API over reqwest.
pub struct HttpSearchEngine {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: String,
    bulk_timeout: Duration,
}

// ── REST response types ────────────────────────────────────────────

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct DeleteByQueryResponse {
    #[serde(default)]
    deleted: u64,
}

#[derive(Deserialize)]
struct RawBulkResponse {
    items: Vec<std::collections::HashMap<String, RawBulkItem>>,
}

#[derive(Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_id")]
    id: Option<String>,
    status: u16,
    error: Option<Value>,
}

impl HttpSearchEngine {
    pub fn new(config: &StoreConfig) -> Result<Self, DomainError> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.verify_certs);

        if let Some(path) = &config.ca_certs {
            let pem = std::fs::read(path)
                .map_err(|e| DomainError::configuration(format!("cannot read ca_certs {path}: {e}")))?;
            let certificate = Certificate::from_pem(&pem)
                .map_err(|e| DomainError::configuration(format!("invalid ca_certs {path}: {e}")))?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder
            .build()
            .map_err(|e| DomainError::configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            username: Some(config.username.clone()).filter(|u| !u.is_empty()),
            password: config.password.clone(),
            bulk_timeout: config.bulk_timeout(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, format!("{}/{}", self.base_url, path));
        match &self.username {
            Some(username) => request.basic_auth(username, Some(&self.password)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DomainError> {
        request
            .send()
            .await
            .map_err(|e| DomainError::transport(e.to_string()))
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, DomainError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "search engine request failed");
            return Err(DomainError::transport(format!("status {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| DomainError::transport(format!("unreadable response: {e}")))
    }

    fn bulk_body(operations: &[BulkOperation]) -> Result<String, DomainError> {
        let mut body = String::new();
        for operation in operations {
            let mut target = json!({ "_index": operation.index });
            if let Some(id) = &operation.id {
                target["_id"] = json!(id);
            }
            let mut action = serde_json::Map::new();
            action.insert(operation.intent.action().to_string(), target);
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');

            let payload = match operation.intent {
                WriteIntent::Insert => serde_json::to_string(&operation.source)?,
                WriteIntent::Update => serde_json::to_string(&json!({ "doc": operation.source }))?,
            };
            body.push_str(&payload);
            body.push('\n');
        }
        Ok(body)
    }

    fn scroll_page(response: SearchResponse) -> ScrollPage {
        ScrollPage {
            scroll_id: response.scroll_id,
            hits: response.hits.hits,
        }
    }
}

#[async_trait]
impl SearchEngine for HttpSearchEngine {
    async fn index_exists(&self, index: &str) -> Result<bool, DomainError> {
        let response = self.send(self.request(Method::HEAD, index)).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(DomainError::transport(format!(
                "unexpected status {status} checking index {index}"
            ))),
        }
    }

    #[instrument(skip(self, body))]
    async fn create_index(&self, index: &str, body: &Value) -> Result<bool, DomainError> {
        let response = self.send(self.request(Method::PUT, index).json(body)).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }

        let text = response.text().await.unwrap_or_default();
        // Concurrent creators race; losing the race is fine.
        if status == StatusCode::BAD_REQUEST && text.contains("resource_already_exists_exception") {
            debug!(index, "index created concurrently");
            return Ok(false);
        }
        Err(DomainError::transport(format!(
            "creating index {index} failed with {status}: {text}"
        )))
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Vec<SearchHit>, DomainError> {
        let path = format!("{index}/_search");
        let response = self.send(self.request(Method::POST, &path).json(body)).await?;
        let parsed: SearchResponse = Self::parse(response).await?;
        Ok(parsed.hits.hits)
    }

    async fn count(&self, index: &str) -> Result<u64, DomainError> {
        let path = format!("{index}/_count");
        let request = self.request(Method::POST, &path);
        let parsed: CountResponse = Self::parse(self.send(request).await?).await?;
        Ok(parsed.count)
    }

    #[instrument(skip(self, operations), fields(count = operations.len()))]
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, DomainError> {
        let path = format!("_bulk?refresh=wait_for&timeout={}s", self.bulk_timeout.as_secs());

        let request = self
            .request(Method::POST, &path)
            .timeout(self.bulk_timeout)
            .header(reqwest::header::CONTENT_TYPE, NDJSON)
            .body(Self::bulk_body(operations)?);
        let parsed: RawBulkResponse = Self::parse(self.send(request).await?).await?;

        let items = parsed
            .items
            .into_iter()
            .filter_map(|entry| entry.into_values().next())
            .map(|item| match item.error {
                Some(error) => {
                    let reason = match (error.get("type"), error.get("reason")) {
                        (Some(Value::String(kind)), Some(Value::String(reason))) => {
                            format!("{kind}: {reason}")
                        }
                        _ => error.to_string(),
                    };
                    BulkItemOutcome::failed(item.id, item.status, reason)
                }
                None => BulkItemOutcome {
                    id: item.id,
                    status: item.status,
                    error: None,
                },
            })
            .collect();

        Ok(BulkResponse { items })
    }

    async fn delete_by_query(
        &self,
        index: &str,
        query: &Value,
        refresh: bool,
    ) -> Result<u64, DomainError> {
        let path = format!("{index}/_delete_by_query?conflicts=proceed&refresh={refresh}");
        let request = self
            .request(Method::POST, &path)
            .json(&json!({ "query": query }));
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let parsed: DeleteByQueryResponse = Self::parse(response).await?;
        Ok(parsed.deleted)
    }

    async fn scroll_start(
        &self,
        index: &str,
        body: &Value,
        keep_alive: &str,
    ) -> Result<ScrollPage, DomainError> {
        let path = format!("{index}/_search?scroll={keep_alive}");
        let response = self.send(self.request(Method::POST, &path).json(body)).await?;
        Ok(Self::scroll_page(Self::parse(response).await?))
    }

    async fn scroll_next(&self, scroll_id: &str, keep_alive: &str) -> Result<ScrollPage, DomainError> {
        let body = json!({ "scroll": keep_alive, "scroll_id": scroll_id });
        let request = self.request(Method::POST, "_search/scroll").json(&body);
        Ok(Self::scroll_page(Self::parse(self.send(request).await?).await?))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), DomainError> {
        let body = json!({ "scroll_id": scroll_id });
        let response = self
            .send(self.request(Method::DELETE, "_search/scroll").json(&body))
            .await?;
        // An expired cursor is already gone.
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(DomainError::transport(format!(
                "clearing scroll failed with {}",
                response.status()
            )));
        }
        Ok(())
    }
}
