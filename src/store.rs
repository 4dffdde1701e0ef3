//! Vector store backends.
//!
//! The `VectorStore` trait is the crate's view of a nearest-neighbor
//! service: upsert documents with their embeddings, search by query
//! vector with an optional metadata filter, delete, enumerate sources.
//! Store internals (persistence, index structure, sharding) belong to the
//! backend.
//!
//! Two backends ship here:
//!
//! - `MemoryIndex` — embedded brute-force cosine index. Fine up to a few
//!   thousand documents and the backend used by the test suite.
//! - `RestVectorStore` — client for a Qdrant-style REST API, the external
//!   store a long-lived agent points at.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{MnemoError, Result};
use crate::similarity::cosine;
use crate::types::{Candidate, Document, Metadata, MetadataValue, SearchFilter, SOURCE_KEY};
use crate::util::env_optional;

// ── Trait ────────────────────────────────────────────────────────────────

pub trait VectorStore {
    /// Insert documents, replacing any existing document with the same id.
    /// Returns the number of documents written.
    fn upsert(&mut self, documents: Vec<Document>) -> Result<usize>;

    /// Up to `limit` nearest candidates for `query_vector`, most similar
    /// first, restricted to documents matching `filter` when present.
    fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<Candidate>>;

    /// Delete by explicit ids. Returns the number of documents removed
    /// (best effort for remote backends).
    fn delete_ids(&mut self, ids: &[String]) -> Result<usize>;

    /// Delete every document matching the filter.
    fn delete_where(&mut self, filter: &SearchFilter) -> Result<usize>;

    /// Distinct `source` metadata values, sorted.
    fn sources(&self) -> Result<Vec<String>>;
}

// ── Embedded index ───────────────────────────────────────────────────────

/// Brute-force in-process index. Search is a linear cosine scan; upsert
/// supersedes by document id, mirroring how a durable store would treat a
/// re-learned file or URL.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: Vec<Document>,
}

impl MemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl VectorStore for MemoryIndex {
    fn upsert(&mut self, documents: Vec<Document>) -> Result<usize> {
        let written = documents.len();
        for document in documents {
            if let Some(existing) = self.documents.iter_mut().find(|d| d.id == document.id) {
                *existing = document;
            } else {
                self.documents.push(document);
            }
        }
        Ok(written)
    }

    fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<Candidate>> {
        if query_vector.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut hits: Vec<Candidate> = self
            .documents
            .iter()
            .filter(|doc| filter.is_none_or(|f| f.matches(&doc.metadata)))
            .map(|doc| Candidate {
                id: doc.id.clone(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                embedding: doc.embedding.clone(),
                score: Some(cosine(query_vector, &doc.embedding)),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    fn delete_ids(&mut self, ids: &[String]) -> Result<usize> {
        let before = self.documents.len();
        self.documents.retain(|doc| !ids.contains(&doc.id));
        Ok(before - self.documents.len())
    }

    fn delete_where(&mut self, filter: &SearchFilter) -> Result<usize> {
        let before = self.documents.len();
        self.documents.retain(|doc| !filter.matches(&doc.metadata));
        Ok(before - self.documents.len())
    }

    fn sources(&self) -> Result<Vec<String>> {
        let set: BTreeSet<String> = self
            .documents
            .iter()
            .filter_map(|doc| {
                doc.metadata
                    .get(SOURCE_KEY)
                    .and_then(MetadataValue::as_str)
                    .map(str::to_string)
            })
            .collect();
        Ok(set.into_iter().collect())
    }
}

// ── REST store ───────────────────────────────────────────────────────────

/// Configuration for [`RestVectorStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub collection: String,
    /// Environment variable holding an optional API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Page size used when scrolling payloads for source enumeration.
    pub scroll_page: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6333".to_string(),
            collection: "mnemo".to_string(),
            api_key_env: "QDRANT_API_KEY".to_string(),
            timeout_secs: 30,
            scroll_page: 1000,
        }
    }
}

impl StoreConfig {
    /// Build from `QDRANT_URL` / `QDRANT_COLLECTION` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_optional("QDRANT_URL").unwrap_or(defaults.base_url),
            collection: env_optional("QDRANT_COLLECTION").unwrap_or(defaults.collection),
            api_key_env: defaults.api_key_env,
            timeout_secs: defaults.timeout_secs,
            scroll_page: defaults.scroll_page,
        }
    }
}

pub struct RestVectorStore {
    config: StoreConfig,
    agent: ureq::Agent,
    api_key: Option<String>,
}

/// Stable numeric point id for a document id. The REST API only accepts
/// integer or UUID point ids, so the string id is hashed down to a u64 and
/// kept verbatim in the payload.
pub(crate) fn point_id_for(doc_id: &str) -> u64 {
    let hash = blake3::hash(doc_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Serialize a metadata filter into the REST API's filter clause.
pub(crate) fn filter_clause(filter: &SearchFilter) -> serde_json::Value {
    let must: Vec<serde_json::Value> = filter
        .equals
        .iter()
        .map(|(key, value)| {
            serde_json::json!({
                "key": key,
                "match": { "value": value },
            })
        })
        .collect();
    serde_json::json!({ "must": must })
}

/// Parse the point list from a `points/query` or `points/scroll` response.
pub(crate) fn parse_point_list(result: &serde_json::Value) -> Result<Vec<serde_json::Value>> {
    if let Some(status) = result.get("status").and_then(|s| s.as_str()) {
        if status == "error" {
            let msg = result
                .get("result")
                .and_then(|r| r.get("description"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown");
            return Err(MnemoError::store(format!("backend error: {msg}")));
        }
    }
    let points = result
        .get("result")
        .map(|r| r.get("points").unwrap_or(r))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    Ok(points)
}

/// Convert one point into a candidate. Points without a vector or text
/// payload are dropped by the caller.
pub(crate) fn point_to_candidate(point: &serde_json::Value) -> Option<Candidate> {
    let payload = point.get("payload")?;
    let id = payload.get("doc_id").and_then(|v| v.as_str())?.to_string();
    let text = payload
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let embedding: Vec<f32> = point
        .get("vector")
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|n| n.as_f64())
                .map(|n| n as f32)
                .collect()
        })?;
    let score = point.get("score").and_then(|v| v.as_f64()).map(|s| s as f32);

    let mut metadata = Metadata::new();
    if let Some(object) = payload.as_object() {
        for (key, value) in object {
            if key == "doc_id" || key == "text" {
                continue;
            }
            let parsed = match value {
                serde_json::Value::String(s) => MetadataValue::Str(s.clone()),
                serde_json::Value::Number(n) => match n.as_f64() {
                    Some(f) => MetadataValue::Num(f),
                    None => continue,
                },
                serde_json::Value::Bool(b) => MetadataValue::Bool(*b),
                _ => continue,
            };
            metadata.insert(key.clone(), parsed);
        }
    }

    Some(Candidate {
        id,
        text,
        metadata,
        embedding,
        score,
    })
}

impl RestVectorStore {
    pub fn new(config: StoreConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.timeout_secs))
            .timeout_read(Duration::from_secs(config.timeout_secs))
            .build();
        let api_key = env_optional(&config.api_key_env);
        Self {
            config,
            agent,
            api_key,
        }
    }

    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!(
            "{}/collections/{}/{suffix}",
            self.config.base_url.trim_end_matches('/'),
            self.config.collection
        )
    }

    fn post(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut request = self.agent.post(url).set("content-type", "application/json");
        if let Some(ref key) = self.api_key {
            request = request.set("api-key", key);
        }
        let resp = request
            .send_json(body.clone())
            .map_err(|e| MnemoError::store(format!("request to {url}: {e}")))?;
        resp.into_json()
            .map_err(|e| MnemoError::store(format!("response parse: {e}")))
    }

    fn put(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut request = self.agent.put(url).set("content-type", "application/json");
        if let Some(ref key) = self.api_key {
            request = request.set("api-key", key);
        }
        let resp = request
            .send_json(body.clone())
            .map_err(|e| MnemoError::store(format!("request to {url}: {e}")))?;
        resp.into_json()
            .map_err(|e| MnemoError::store(format!("response parse: {e}")))
    }
}

impl VectorStore for RestVectorStore {
    fn upsert(&mut self, documents: Vec<Document>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let written = documents.len();
        let points: Vec<serde_json::Value> = documents
            .into_iter()
            .map(|doc| {
                let mut payload = serde_json::Map::new();
                payload.insert("doc_id".to_string(), serde_json::json!(doc.id));
                payload.insert("text".to_string(), serde_json::json!(doc.text));
                for (key, value) in &doc.metadata {
                    payload.insert(key.clone(), serde_json::json!(value));
                }
                serde_json::json!({
                    "id": point_id_for(&doc.id),
                    "vector": doc.embedding,
                    "payload": payload,
                })
            })
            .collect();

        let url = self.collection_url("points");
        let result = self.put(&url, &serde_json::json!({ "points": points }))?;
        if let Some("error") = result.get("status").and_then(|s| s.as_str()) {
            return Err(MnemoError::store("upsert rejected by backend"));
        }
        Ok(written)
    }

    fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<Candidate>> {
        if query_vector.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut body = serde_json::json!({
            "query": query_vector,
            "limit": limit,
            "with_payload": true,
            "with_vector": true,
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = filter_clause(filter);
        }

        let url = self.collection_url("points/query");
        let result = self.post(&url, &body)?;
        let points = parse_point_list(&result)?;

        let mut candidates = Vec::with_capacity(points.len());
        for point in &points {
            match point_to_candidate(point) {
                Some(candidate) => candidates.push(candidate),
                None => {
                    tracing::warn!("dropping search hit without payload or vector");
                }
            }
        }
        Ok(candidates)
    }

    fn delete_ids(&mut self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let points: Vec<u64> = ids.iter().map(|id| point_id_for(id)).collect();
        let url = self.collection_url("points/delete");
        self.post(&url, &serde_json::json!({ "points": points }))?;
        Ok(ids.len())
    }

    fn delete_where(&mut self, filter: &SearchFilter) -> Result<usize> {
        if filter.is_empty() {
            return Err(MnemoError::invalid(
                "refusing to delete with an empty filter",
            ));
        }
        let url = self.collection_url("points/delete");
        self.post(&url, &serde_json::json!({ "filter": filter_clause(filter) }))?;
        // The delete endpoint reports an operation id, not a count.
        Ok(0)
    }

    fn sources(&self) -> Result<Vec<String>> {
        let url = self.collection_url("points/scroll");
        let mut set = BTreeSet::new();
        let mut offset: Option<serde_json::Value> = None;

        loop {
            let mut body = serde_json::json!({
                "limit": self.config.scroll_page,
                "with_payload": true,
                "with_vector": false,
            });
            if let Some(ref cursor) = offset {
                body["offset"] = cursor.clone();
            }
            let result = self.post(&url, &body)?;
            let points = parse_point_list(&result)?;
            if points.is_empty() {
                break;
            }
            for point in &points {
                if let Some(source) = point
                    .get("payload")
                    .and_then(|p| p.get(SOURCE_KEY))
                    .and_then(|s| s.as_str())
                {
                    set.insert(source.to_string());
                }
            }
            offset = result
                .get("result")
                .and_then(|r| r.get("next_page_offset"))
                .filter(|v| !v.is_null())
                .cloned();
            if offset.is_none() {
                break;
            }
        }
        Ok(set.into_iter().collect())
    }
}
