//! Knowledge acquisition: turn files, directory trees, and web pages into
//! indexed documents.
//!
//! Everything funnels through `learn_text`, which embeds with the document
//! purpose and upserts keyed by source, so re-learning a changed file or
//! page supersedes the previous version instead of accumulating
//! duplicates.

use std::path::Path;

use walkdir::WalkDir;

use crate::embed::Embedder;
use crate::error::{MnemoError, Result};
use crate::store::VectorStore;
use crate::types::{Document, EmbeddingPurpose, Metadata, MetadataValue, SearchFilter, SOURCE_KEY};
use crate::util::truncate_chars;

// ── Options ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Extension allowlist for directory walks (lowercase, no dot).
    pub extensions: Vec<String>,
    /// Path components that prune a subtree or skip a file.
    pub ignore: Vec<String>,
    /// Bodies longer than this many characters are skipped (files) or
    /// truncated (URLs).
    pub max_chars: usize,
    /// HTTP timeout for URL fetches, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            extensions: ["md", "txt", "py", "js", "rs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignore: [
                ".git",
                "node_modules",
                "dist",
                "build",
                "target",
                "__pycache__",
                ".env",
                "venv",
                ".idea",
                ".vscode",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_chars: 15_000,
            fetch_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub scanned: usize,
    pub learned: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

// ── Learn operations ─────────────────────────────────────────────────────

/// Embed `text` and upsert it under `id`. A `source` metadata key is
/// filled in from the id when the caller did not provide one. Returns
/// false when the text embeds to nothing and was not stored.
pub fn learn_text<E, S>(
    embedder: &E,
    store: &mut S,
    id: &str,
    text: &str,
    mut metadata: Metadata,
) -> Result<bool>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    let Some(embedding) = embedder.embed(text, EmbeddingPurpose::Document)? else {
        return Ok(false);
    };
    metadata
        .entry(SOURCE_KEY.to_string())
        .or_insert_with(|| MetadataValue::from(id));
    store.upsert(vec![Document {
        id: id.to_string(),
        text: text.to_string(),
        metadata,
        embedding,
    }])?;
    Ok(true)
}

/// Learn one UTF-8 text file, keyed by its path. Blank and oversized
/// bodies are skipped (returns false), unreadable files error.
pub fn learn_file<E, S>(
    embedder: &E,
    store: &mut S,
    path: &Path,
    options: &IngestOptions,
) -> Result<bool>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    let content =
        std::fs::read_to_string(path).map_err(|e| MnemoError::io_at(e, path))?;
    if content.trim().is_empty() || content.chars().count() > options.max_chars {
        tracing::debug!(path = %path.display(), "skipping blank or oversized file");
        return Ok(false);
    }
    let id = path.to_string_lossy().into_owned();
    learn_text(embedder, store, &id, &content, Metadata::new())
}

fn is_ignored(path: &Path, ignore: &[String]) -> bool {
    path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        ignore.iter().any(|pattern| name == pattern.as_str())
    })
}

fn extension_allowed(path: &Path, extensions: &[String]) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    extensions.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed))
}

/// Walk a directory tree and learn every allowed file. Per-file failures
/// are collected in the report instead of aborting the walk.
pub fn learn_directory<E, S>(
    embedder: &E,
    store: &mut S,
    root: &Path,
    options: &IngestOptions,
) -> Result<IngestReport>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    if !root.exists() {
        return Err(MnemoError::extraction(format!(
            "directory not found: {}",
            root.display()
        )));
    }

    let mut report = IngestReport::default();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                report.errors.push(err.to_string());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_ignored(path, &options.ignore) || !extension_allowed(path, &options.extensions) {
            continue;
        }

        report.scanned += 1;
        match learn_file(embedder, store, path, options) {
            Ok(true) => report.learned += 1,
            Ok(false) => report.skipped += 1,
            Err(err) => {
                report.skipped += 1;
                report.errors.push(format!("{}: {err}", path.display()));
            }
        }
    }
    Ok(report)
}

/// Fetch a web page, strip it down to text, and learn it keyed by URL.
pub fn learn_url<E, S>(
    embedder: &E,
    store: &mut S,
    raw_url: &str,
    options: &IngestOptions,
) -> Result<bool>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    let parsed = url::Url::parse(raw_url)
        .map_err(|e| MnemoError::extraction(format!("invalid url {raw_url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MnemoError::extraction(format!(
            "unsupported url scheme: {}",
            parsed.scheme()
        )));
    }

    let agent = ureq::AgentBuilder::new()
        .timeout_connect(std::time::Duration::from_secs(options.fetch_timeout_secs))
        .timeout_read(std::time::Duration::from_secs(options.fetch_timeout_secs))
        .build();
    let body = agent
        .get(parsed.as_str())
        .set("user-agent", "Mozilla/5.0 (compatible; mnemo)")
        .call()
        .map_err(|e| MnemoError::extraction(format!("fetch {raw_url}: {e}")))?
        .into_string()
        .map_err(|e| MnemoError::extraction(format!("read {raw_url}: {e}")))?;

    let text = strip_html(&body);
    let text = truncate_chars(&text, options.max_chars);

    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), MetadataValue::from(raw_url));
    metadata.insert("kind".to_string(), MetadataValue::from("url"));
    learn_text(embedder, store, raw_url, text, metadata)
}

// ── Forget operations ────────────────────────────────────────────────────

/// Delete every document learned from `source`.
pub fn forget_source<S>(store: &mut S, source: &str) -> Result<usize>
where
    S: VectorStore + ?Sized,
{
    store.delete_where(&SearchFilter::by_source(source))
}

/// Delete documents by explicit ids.
pub fn forget_ids<S>(store: &mut S, ids: &[String]) -> Result<usize>
where
    S: VectorStore + ?Sized,
{
    store.delete_ids(ids)
}

// ── HTML stripping ───────────────────────────────────────────────────────

/// Reduce an HTML page to whitespace-normalized text: script and style
/// bodies removed, tags dropped, common entities decoded.
pub(crate) fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 4);
    let mut chars = html.char_indices().peekable();
    let lower = html.to_ascii_lowercase();
    let mut skip_until: Option<&'static str> = None;
    let mut in_tag = false;

    while let Some((i, c)) = chars.next() {
        if let Some(close) = skip_until {
            if lower[i..].starts_with(close) {
                skip_until = None;
                in_tag = true; // consume the closing tag itself
            }
            continue;
        }
        if in_tag {
            if c == '>' {
                in_tag = false;
                out.push(' ');
            }
            continue;
        }
        if c == '<' {
            if lower[i..].starts_with("<script") {
                skip_until = Some("</script");
            } else if lower[i..].starts_with("<style") {
                skip_until = Some("</style");
            } else {
                in_tag = true;
            }
            continue;
        }
        out.push(c);
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
