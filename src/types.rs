use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Embedding purpose ────────────────────────────────────────────────────

/// Role a text plays when it is embedded.
///
/// Several embedding backends produce asymmetric vectors for indexed
/// documents versus search queries, so the role is an explicit parameter
/// of every embed call instead of a backend default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingPurpose {
    Document,
    Query,
}

impl EmbeddingPurpose {
    /// Task-type label used on the embedding API wire.
    #[must_use]
    pub fn as_task_type(&self) -> &'static str {
        match self {
            Self::Document => "RETRIEVAL_DOCUMENT",
            Self::Query => "RETRIEVAL_QUERY",
        }
    }
}

// ── Metadata ─────────────────────────────────────────────────────────────

/// A single metadata value. Keys are arbitrary and caller-defined; by
/// convention every indexed document carries a `source` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl MetadataValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Num(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Num(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// String-keyed metadata map attached to every document.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Conventional metadata key naming where a document came from.
pub const SOURCE_KEY: &str = "source";

// ── Documents and candidates ─────────────────────────────────────────────

/// An item to be indexed: identifier, text body, metadata, and the
/// document-purpose embedding of the body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// One nearest-neighbor search hit. The pool order is whatever the store
/// returned; downstream selection never assumes it is sorted.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
    /// Store-reported score, when the backend provides one.
    pub score: Option<f32>,
}

impl Candidate {
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str)
    }
}

// ── Retrieval output ─────────────────────────────────────────────────────

/// One selected document, in selection order.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieved {
    pub rank: usize,
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity to the query.
    pub relevance: f32,
}

impl Retrieved {
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextCitation {
    pub rank: usize,
    pub id: String,
    pub source: Option<String>,
    pub relevance: f32,
}

/// A formatted context block plus the citations that went into it.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPack {
    pub query: String,
    pub citations: Vec<ContextCitation>,
    pub context: String,
}

// ── Search filter ────────────────────────────────────────────────────────

/// Metadata equality filter applied by the store during candidate search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    pub equals: Metadata,
}

impl SearchFilter {
    /// Filter to documents whose `source` equals the given value.
    #[must_use]
    pub fn by_source(source: &str) -> Self {
        let mut equals = Metadata::new();
        equals.insert(SOURCE_KEY.to_string(), MetadataValue::from(source));
        Self { equals }
    }

    /// Filter on a single arbitrary key.
    #[must_use]
    pub fn by_key(key: &str, value: impl Into<MetadataValue>) -> Self {
        let mut equals = Metadata::new();
        equals.insert(key.to_string(), value.into());
        Self { equals }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    /// True when every filter entry is present and equal in `metadata`.
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(key, want)| metadata.get(key) == Some(want))
    }
}
