use std::borrow::Cow;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MnemoError>;

/// Canonical error surface for mnemo.
///
/// The first two variants are contract violations surfaced to the caller
/// immediately; the rest wrap I/O performed by the shipped embedder, store,
/// and ingestion backends. Degenerate-but-valid inputs (empty candidate
/// pools, zero vectors, blank text) are handled with fallback values and
/// never reach this type.
#[derive(Debug, Error)]
pub enum MnemoError {
    #[error("Invalid parameter: {reason}")]
    InvalidParameter { reason: Cow<'static, str> },

    #[error("Vector dimension mismatch (expected {expected}, got {actual})")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding failed: {reason}")]
    EmbeddingFailed { reason: Box<str> },

    #[error("Vector store request failed: {reason}")]
    StoreFailed { reason: Box<str> },

    #[error("Content extraction failed: {reason}")]
    ExtractionFailed { reason: Box<str> },

    #[error("I/O error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
}

impl MnemoError {
    pub(crate) fn invalid(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub(crate) fn embedding(reason: impl Into<String>) -> Self {
        Self::EmbeddingFailed {
            reason: reason.into().into_boxed_str(),
        }
    }

    pub(crate) fn store(reason: impl Into<String>) -> Self {
        Self::StoreFailed {
            reason: reason.into().into_boxed_str(),
        }
    }

    pub(crate) fn extraction(reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            reason: reason.into().into_boxed_str(),
        }
    }

    pub(crate) fn io_at(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }
}

impl From<std::io::Error> for MnemoError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}
