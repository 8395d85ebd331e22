
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{SearchFilter, SearchHit};
use crate::chunker::Passage;
use crate::config::VectorStoreConfig;
use crate::{RagError, Result};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// REST client for a Qdrant collection of passage vectors.
#[derive(Debug, Clone)]
pub struct QdrantIndex {
    base_url: Url,
    api_key: Option<String>,
    collection: String,
    dimension: usize,
    upload_batch_size: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct PointPayload {
    text: String,
    chapter: u32,
    section: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    subsection: Option<String>,
    anchor: String,
    token_count: usize,
    sequence_index: usize,
    source_document: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: PointId,
    score: f32,
    payload: PointPayload,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointId {
    Text(String),
    Number(u64),
}

impl PointId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

impl QdrantIndex {
    #[inline]
    pub fn new(config: &VectorStoreConfig, dimension: usize) -> Result<Self> {
        let base_url = config.url()?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            collection: config.collection.clone(),
            dimension,
            upload_batch_size: config.upload_batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Ensure the collection exists with the configured vector geometry.
    ///
    /// With `recreate` set, an existing collection is dropped first and
    /// all stored passages are lost. Without it the call is idempotent.
    #[inline]
    pub fn create_collection(&self, recreate: bool) -> Result<()> {
        let exists = self.collection_exists()?;

        if exists && !recreate {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        if exists {
            info!("Dropping existing collection {}", self.collection);
            self.request("DELETE", &self.collection_path(), None)?;
        }

        let body = json!({
            "vectors": { "size": self.dimension, "distance": "Cosine" },
        });
        self.request("PUT", &self.collection_path(), Some(&body))?;
        info!(
            "Created collection {} ({}-dimensional, cosine)",
            self.collection, self.dimension
        );
        Ok(())
    }

    /// Store passages with their vectors, replacing any points that share
    /// an id. Uploads happen in batches so a large ingestion does not
    /// build one giant request.
    #[inline]
    pub fn upsert(&self, passages: &[Passage], vectors: &[Vec<f32>]) -> Result<usize> {
        if passages.len() != vectors.len() {
            return Err(RagError::Index(format!(
                "Passage/vector count mismatch: {} vs {}",
                passages.len(),
                vectors.len()
            )));
        }
        if passages.is_empty() {
            return Ok(0);
        }

        let path = format!("{}/points?wait=true", self.collection_path());
        let mut stored = 0;

        let paired: Vec<(&Passage, &Vec<f32>)> = passages.iter().zip(vectors.iter()).collect();
        for batch in paired.chunks(self.upload_batch_size) {
            let points: Vec<serde_json::Value> = batch
                .iter()
                .map(|(passage, vector)| {
                    json!({
                        "id": passage.id,
                        "vector": vector,
                        "payload": PointPayload::from(*passage),
                    })
                })
                .collect();

            self.request("PUT", &path, Some(&json!({ "points": points })))?;
            stored += batch.len();
            debug!("Upserted {}/{} passages", stored, passages.len());
        }

        Ok(stored)
    }

    /// Similarity search, highest score first. Filter fields are combined
    /// conjunctively; hits below `score_threshold` are excluded by the
    /// store itself.
    #[inline]
    pub fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let mut body = json!({
            "vector": vector,
            "limit": top_k,
            "score_threshold": score_threshold,
            "with_payload": true,
        });

        if let Some(qdrant_filter) = build_filter(filter) {
            body["filter"] = qdrant_filter;
        }

        let path = format!("{}/points/search", self.collection_path());
        let response_text = self.request("POST", &path, Some(&body))?;
        let response: SearchResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Index(format!("Failed to parse search response: {}", e)))?;

        let mut hits: Vec<SearchHit> = response
            .result
            .into_iter()
            .map(|point| SearchHit {
                passage_id: point.id.into_string(),
                score: point.score,
                text: point.payload.text,
                chapter: point.payload.chapter,
                section: point.payload.section,
                subsection: point.payload.subsection,
                anchor: point.payload.anchor,
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(hits)
    }

    /// Exact number of stored passages.
    #[inline]
    pub fn count(&self) -> Result<u64> {
        let path = format!("{}/points/count", self.collection_path());
        let response_text = self.request("POST", &path, Some(&json!({ "exact": true })))?;
        let response: CountResponse = serde_json::from_str(&response_text)
            .map_err(|e| RagError::Index(format!("Failed to parse count response: {}", e)))?;
        Ok(response.result.count)
    }

    /// Remove passages by id, typically before re-ingesting a document.
    #[inline]
    pub fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let path = format!("{}/points/delete?wait=true", self.collection_path());
        self.request("POST", &path, Some(&json!({ "points": ids })))?;
        debug!("Deleted {} points from {}", ids.len(), self.collection);
        Ok(())
    }

    /// Whether the store is reachable. All failures map to `false`.
    #[inline]
    pub fn health_check(&self) -> bool {
        match self.request("GET", "/healthz", None) {
            Ok(_) => true,
            Err(e) => {
                warn!("Vector store health check failed: {}", e);
                false
            }
        }
    }

    fn collection_exists(&self) -> Result<bool> {
        let url = self.endpoint(&self.collection_path())?;
        let result = self.with_headers(self.agent.get(url.as_str())).call();

        match result {
            Ok(_) => Ok(true),
            Err(ureq::Error::StatusCode(404)) => Ok(false),
            Err(e) => Err(RagError::Index(format!(
                "Failed to check collection {}: {}",
                self.collection, e
            ))),
        }
    }

    fn collection_path(&self) -> String {
        format!("/collections/{}", self.collection)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Index(format!("Failed to build URL for {}: {}", path, e)))
    }

    fn with_headers(
        &self,
        request: ureq::RequestBuilder<ureq::typestate::WithoutBody>,
    ) -> ureq::RequestBuilder<ureq::typestate::WithoutBody> {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    fn request(&self, method: &str, path: &str, body: Option<&serde_json::Value>) -> Result<String> {
        let url = self.endpoint(path)?;
        let payload = match body {
            Some(value) => Some(serde_json::to_string(value).map_err(|e| {
                RagError::Index(format!("Failed to serialize request body: {}", e))
            })?),
            None => None,
        };

        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            let result = self.send(method, &url, payload.as_deref());

            match result {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    if !is_retryable(&error) {
                        return Err(RagError::Index(format!(
                            "Non-retryable error from {} {}: {}",
                            method, path, error
                        )));
                    }

                    warn!(
                        "Vector store request failed (attempt {}/{}): {}",
                        attempt, self.retry_attempts, error
                    );
                    last_error = Some(error);

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        std::thread::sleep(Duration::from_millis(delay_ms));
                    }
                }
            }
        }

        Err(RagError::Index(format!(
            "Request failed after {} attempts: {}",
            self.retry_attempts,
            last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string())
        )))
    }

    fn send(
        &self,
        method: &str,
        url: &Url,
        payload: Option<&str>,
    ) -> std::result::Result<String, ureq::Error> {
        let response = match method {
            "GET" => self.with_headers(self.agent.get(url.as_str())).call(),
            "DELETE" => self.with_headers(self.agent.delete(url.as_str())).call(),
            other => {
                let request = if other == "PUT" {
                    self.agent.put(url.as_str())
                } else {
                    self.agent.post(url.as_str())
                };
                let request = match &self.api_key {
                    Some(key) => request.header("api-key", key),
                    None => request,
                };
                request
                    .header("Content-Type", "application/json")
                    .send(payload.unwrap_or("{}"))
            }
        };

        response.and_then(|mut resp| resp.body_mut().read_to_string())
    }
}

impl From<&Passage> for PointPayload {
    fn from(passage: &Passage) -> Self {
        Self {
            text: passage.text.clone(),
            chapter: passage.chapter,
            section: passage.section.clone(),
            subsection: passage.subsection.clone(),
            anchor: passage.anchor.clone(),
            token_count: passage.token_count,
            sequence_index: passage.sequence_index,
            source_document: passage.source_document.clone(),
        }
    }
}

fn build_filter(filter: &SearchFilter) -> Option<serde_json::Value> {
    if filter.is_empty() {
        return None;
    }

    let mut must = Vec::new();
    if let Some(chapter) = filter.chapter {
        must.push(json!({ "key": "chapter", "match": { "value": chapter } }));
    }
    if let Some(section) = &filter.section {
        must.push(json!({ "key": "section", "match": { "value": section } }));
    }

    Some(json!({ "must": must }))
}

fn is_retryable(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}
