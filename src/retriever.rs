//! The retrieval pipeline: embed the query, over-fetch a candidate pool
//! from the vector store, re-rank with MMR, and optionally format the
//! selection into a prompt-ready context block.
//!
//! The pool is fetched several multiples larger than the requested result
//! count so the diversity step has material to discriminate; a store
//! returning fewer matches than requested degrades gracefully down to an
//! empty result.

use crate::embed::Embedder;
use crate::error::Result;
use crate::mmr::{select_diverse, MmrParams};
use crate::store::VectorStore;
use crate::types::{ContextCitation, ContextPack, EmbeddingPurpose, Retrieved, SearchFilter};
use crate::util::{env_f32, env_usize, truncate_chars};

// ── Options ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Number of results to return.
    pub limit: usize,
    /// MMR relevance/diversity trade-off in [0, 1].
    pub lambda_mult: f32,
    /// The candidate pool is `limit * pool_multiplier` entries, floored at
    /// `min_pool`.
    pub pool_multiplier: usize,
    pub min_pool: usize,
    /// Per-result content cap (in characters) when formatting a context
    /// pack.
    pub snippet_chars: usize,
    /// Optional metadata restriction applied by the store.
    pub filter: Option<SearchFilter>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            lambda_mult: 0.5,
            pool_multiplier: 5,
            min_pool: 20,
            snippet_chars: 500,
            filter: None,
        }
    }
}

impl RetrieveOptions {
    /// Defaults overridable through `MNEMO_RETRIEVE_*` environment
    /// variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            limit: env_usize("MNEMO_RETRIEVE_LIMIT", defaults.limit),
            lambda_mult: env_f32("MNEMO_RETRIEVE_LAMBDA", defaults.lambda_mult),
            pool_multiplier: env_usize("MNEMO_RETRIEVE_POOL_MULT", defaults.pool_multiplier),
            min_pool: env_usize("MNEMO_RETRIEVE_MIN_POOL", defaults.min_pool),
            snippet_chars: env_usize("MNEMO_RETRIEVE_SNIPPET_CHARS", defaults.snippet_chars),
            filter: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub(crate) fn pool_size(&self) -> usize {
        (self.limit * self.pool_multiplier).max(self.min_pool)
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Retrieve up to `options.limit` diverse documents relevant to `query`.
///
/// A query that embeds to nothing (blank input) or a store with no
/// matching documents yields an empty result, not an error.
pub fn retrieve<E, S>(
    embedder: &E,
    store: &S,
    query: &str,
    options: &RetrieveOptions,
) -> Result<Vec<Retrieved>>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    let params = MmrParams::new(options.limit, options.lambda_mult);
    params.validate()?;

    let Some(query_vector) = embedder.embed(query, EmbeddingPurpose::Query)? else {
        return Ok(Vec::new());
    };

    let pool = store.search(&query_vector, options.pool_size(), options.filter.as_ref())?;
    if pool.is_empty() {
        tracing::debug!(query, "candidate search returned nothing");
        return Ok(Vec::new());
    }

    select_diverse(&query_vector, &pool, params)
}

/// Retrieve and render a byte-bounded context block with per-result
/// source attribution, plus the citation records behind it.
pub fn build_context_pack<E, S>(
    embedder: &E,
    store: &S,
    query: &str,
    options: &RetrieveOptions,
    max_bytes: usize,
) -> Result<ContextPack>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    let results = retrieve(embedder, store, query, options)?;

    let mut context = String::new();
    let mut citations = Vec::new();
    if !results.is_empty() {
        context.push_str("--- RELEVANT CONTEXT ---\n");
    }

    for result in &results {
        if context.len() >= max_bytes {
            break;
        }
        let source = result.source().unwrap_or("unknown");
        let header = format!("[{}] Source: {}\n", result.rank, source);
        let remaining = max_bytes.saturating_sub(context.len() + header.len());
        if remaining == 0 {
            break;
        }

        let snippet = truncate_chars(&result.text, options.snippet_chars);
        let mut body = snippet.to_string();
        if body.len() > remaining {
            let mut cut = remaining;
            while cut > 0 && !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        context.push_str(&header);
        context.push_str("Content: ");
        context.push_str(&body);
        if snippet.len() < result.text.len() {
            context.push_str("...");
        }
        context.push_str("\n\n");

        citations.push(ContextCitation {
            rank: result.rank,
            id: result.id.clone(),
            source: result.source().map(str::to_string),
            relevance: result.relevance,
        });
    }

    Ok(ContextPack {
        query: query.to_string(),
        citations,
        context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryIndex, VectorStore};
    use crate::types::{Document, Metadata, MetadataValue, SOURCE_KEY};

    /// Deterministic embedder backed by a fixed table; unknown text maps
    /// to the zero vector, blank text to nothing.
    struct StubEmbedder {
        table: Vec<(&'static str, Vec<f32>)>,
    }

    impl Embedder for StubEmbedder {
        fn kind(&self) -> &str {
            "stub"
        }
        fn model(&self) -> &str {
            "stub"
        }
        fn dimension(&self) -> usize {
            2
        }
        fn embed(&self, text: &str, _purpose: EmbeddingPurpose) -> Result<Option<Vec<f32>>> {
            if text.trim().is_empty() {
                return Ok(None);
            }
            Ok(Some(
                self.table
                    .iter()
                    .find(|(key, _)| *key == text)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| vec![0.0, 0.0]),
            ))
        }
    }

    fn doc(id: &str, text: &str, embedding: Vec<f32>) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), MetadataValue::from(id));
        Document {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
            embedding,
        }
    }

    fn fixture() -> (StubEmbedder, MemoryIndex) {
        let embedder = StubEmbedder {
            table: vec![("the query", vec![0.8, 0.6])],
        };
        let mut index = MemoryIndex::new();
        index
            .upsert(vec![
                doc("exact.md", "exact match", vec![1.0, 0.0]),
                doc("dupe.md", "duplicate of exact", vec![1.0, 0.0]),
                doc("ortho.md", "different topic", vec![0.0, 1.0]),
            ])
            .unwrap();
        (embedder, index)
    }

    #[test]
    fn retrieve_prefers_diverse_results() {
        let (embedder, index) = fixture();
        let options = RetrieveOptions {
            limit: 2,
            ..Default::default()
        };
        let results = retrieve(&embedder, &index, "the query", &options).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "exact.md");
        // The duplicate of the first pick is penalized away; the less
        // relevant but orthogonal document wins the second slot.
        assert_eq!(results[1].id, "ortho.md");
    }

    #[test]
    fn retrieve_degrades_on_small_corpus() {
        let (embedder, index) = fixture();
        let options = RetrieveOptions {
            limit: 50,
            ..Default::default()
        };
        let results = retrieve(&embedder, &index, "the query", &options).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn retrieve_blank_query_is_empty() {
        let (embedder, index) = fixture();
        let results =
            retrieve(&embedder, &index, "  ", &RetrieveOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn retrieve_empty_store_is_empty() {
        let embedder = StubEmbedder {
            table: vec![("q", vec![1.0, 0.0])],
        };
        let index = MemoryIndex::new();
        let results = retrieve(&embedder, &index, "q", &RetrieveOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn retrieve_applies_filter() {
        let (embedder, index) = fixture();
        let options = RetrieveOptions::default()
            .with_filter(SearchFilter::by_source("ortho.md"));
        let results = retrieve(&embedder, &index, "the query", &options).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "ortho.md");
    }

    #[test]
    fn pool_size_floors_at_min_pool() {
        let options = RetrieveOptions::default();
        assert_eq!(options.pool_size(), 25);
        let small = RetrieveOptions {
            limit: 2,
            ..Default::default()
        };
        assert_eq!(small.pool_size(), 20);
    }

    #[test]
    fn context_pack_formats_sources_and_citations() {
        let (embedder, index) = fixture();
        let options = RetrieveOptions {
            limit: 2,
            ..Default::default()
        };
        let pack =
            build_context_pack(&embedder, &index, "the query", &options, 4096).unwrap();
        assert!(pack.context.starts_with("--- RELEVANT CONTEXT ---"));
        assert!(pack.context.contains("Source: exact.md"));
        assert!(pack.context.contains("Content: exact match"));
        assert_eq!(pack.citations.len(), 2);
        assert_eq!(pack.citations[0].rank, 1);
        assert_eq!(pack.citations[0].source.as_deref(), Some("exact.md"));
    }

    #[test]
    fn context_pack_respects_byte_budget() {
        let (embedder, index) = fixture();
        let options = RetrieveOptions {
            limit: 3,
            ..Default::default()
        };
        let pack = build_context_pack(&embedder, &index, "the query", &options, 80).unwrap();
        assert!(pack.context.len() <= 80 + "--- RELEVANT CONTEXT ---\n".len());
        assert!(pack.citations.len() < 3);
    }

    #[test]
    fn context_pack_blank_query_is_empty() {
        let (embedder, index) = fixture();
        let pack =
            build_context_pack(&embedder, &index, " ", &RetrieveOptions::default(), 4096)
                .unwrap();
        assert!(pack.context.is_empty());
        assert!(pack.citations.is_empty());
    }
}
