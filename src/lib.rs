//! Diversity-aware context retrieval for agent memory.
//!
//! mnemo is the retrieval half of a conversational agent: embed a query,
//! over-fetch nearest neighbors from a vector store, re-rank the pool with
//! Maximal Marginal Relevance, and hand back a small set of results that
//! are relevant to the query without repeating each other.
//!
//! The embedding backend and the vector store are seams. `Embedder` and
//! `VectorStore` are traits; REST implementations for both ship here
//! (`RestEmbedder`, `RestVectorStore`) along with an embedded brute-force
//! index (`MemoryIndex`) for small corpora and tests.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use mnemo::{
//!     build_context_pack, learn_directory, IngestOptions, MemoryIndex,
//!     RestEmbedder, RetrieveOptions,
//! };
//!
//! # fn main() -> mnemo::Result<()> {
//! let embedder = RestEmbedder::from_env()?;
//! let mut index = MemoryIndex::new();
//!
//! learn_directory(&embedder, &mut index, Path::new("./docs"), &IngestOptions::default())?;
//!
//! let pack = build_context_pack(
//!     &embedder,
//!     &index,
//!     "how does retry backoff work?",
//!     &RetrieveOptions::default(),
//!     8 * 1024,
//! )?;
//! println!("{}", pack.context);
//! # Ok(())
//! # }
//! ```

pub mod embed;
pub mod error;
pub mod history;
pub mod ingest;
pub mod mmr;
pub mod retriever;
pub mod similarity;
pub mod store;
pub mod types;

mod util;

pub use embed::{Embedder, EmbedderConfig, RestEmbedder};
pub use error::{MnemoError, Result};
pub use history::{recall_history, record_turn, SESSION_KEY};
pub use ingest::{
    forget_ids, forget_source, learn_directory, learn_file, learn_text, learn_url,
    IngestOptions, IngestReport,
};
pub use mmr::{select_diverse, select_indices, MmrParams};
pub use retriever::{build_context_pack, retrieve, RetrieveOptions};
pub use store::{MemoryIndex, RestVectorStore, StoreConfig, VectorStore};
pub use types::{
    Candidate, ContextCitation, ContextPack, Document, EmbeddingPurpose, Metadata,
    MetadataValue, Retrieved, SearchFilter, SOURCE_KEY,
};
