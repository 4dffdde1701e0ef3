//! Conversation memory: past turns stored as embedded documents and
//! recalled by semantic similarity, scoped to a session.

use chrono::Utc;

use crate::embed::Embedder;
use crate::error::Result;
use crate::store::VectorStore;
use crate::types::{
    Document, EmbeddingPurpose, Metadata, MetadataValue, SearchFilter, SOURCE_KEY,
};

/// Metadata key scoping turns to one conversation.
pub const SESSION_KEY: &str = "session";
/// Metadata key carrying the turn timestamp (epoch seconds).
pub const TURN_TS_KEY: &str = "ts_utc";

fn turn_id(session: &str, timestamp: i64, turn_text: &str) -> String {
    let hash = blake3::hash(turn_text.as_bytes());
    format!(
        "mnemo://history/{session}/{timestamp}-{}",
        &hash.to_hex().as_str()[..16]
    )
}

/// Store one exchange as a single transcript document. Blank exchanges
/// embed to nothing and are not stored; the id of the stored turn is
/// returned otherwise.
pub fn record_turn<E, S>(
    embedder: &E,
    store: &mut S,
    session: &str,
    user_text: &str,
    reply_text: &str,
) -> Result<Option<String>>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    if user_text.trim().is_empty() && reply_text.trim().is_empty() {
        return Ok(None);
    }
    let turn_text = format!("user: {user_text}\nassistant: {reply_text}");
    let Some(embedding) = embedder.embed(&turn_text, EmbeddingPurpose::Document)? else {
        return Ok(None);
    };

    let timestamp = Utc::now().timestamp();
    let id = turn_id(session, timestamp, &turn_text);

    let mut metadata = Metadata::new();
    metadata.insert(SESSION_KEY.to_string(), MetadataValue::from(session));
    metadata.insert(TURN_TS_KEY.to_string(), MetadataValue::from(timestamp));
    metadata.insert(SOURCE_KEY.to_string(), MetadataValue::from(id.as_str()));

    store.upsert(vec![Document {
        id: id.clone(),
        text: turn_text,
        metadata,
        embedding,
    }])?;
    Ok(Some(id))
}

/// Recall up to `limit` past turns relevant to `query` from one session,
/// re-assembled oldest-first so the block reads chronologically.
pub fn recall_history<E, S>(
    embedder: &E,
    store: &S,
    session: &str,
    query: &str,
    limit: usize,
) -> Result<String>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    let Some(query_vector) = embedder.embed(query, EmbeddingPurpose::Query)? else {
        return Ok(String::new());
    };

    let filter = SearchFilter::by_key(SESSION_KEY, session);
    let mut hits = store.search(&query_vector, limit, Some(&filter))?;

    hits.sort_by_key(|hit| {
        hit.metadata
            .get(TURN_TS_KEY)
            .and_then(MetadataValue::as_num)
            .map(|ts| ts as i64)
            .unwrap_or(i64::MAX)
    });

    let mut out = String::new();
    for hit in &hits {
        out.push_str(&hit.text);
        out.push('\n');
    }
    Ok(out)
}
