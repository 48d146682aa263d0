//! Core data models used throughout doc-qa.
//!
//! These types represent the chunks, embedding configuration, and search
//! hits that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// A contiguous fragment of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Ordinal position within the document, starting at 0.
    pub index: usize,
    /// Chunk text. Never empty.
    pub text: String,
    /// Character (not byte) offset of `text` in the original document.
    pub source_offset: Option<usize>,
}

impl Chunk {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            source_offset: None,
        }
    }

    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// The embedding configuration an index is bound to.
///
/// Every vector in an index has exactly `dims` components and was produced
/// by `model`. Loading an index always checks the stored spec against the
/// caller's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSpec {
    pub model: String,
    pub dims: usize,
}

impl EmbeddingSpec {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
        }
    }
}

/// One ranked result of a vector search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Stable entry id within the index.
    pub id: u64,
    /// Ordinal of the chunk within its document.
    pub chunk_index: usize,
    pub text: String,
    /// Similarity score. Higher is always more similar.
    pub score: f32,
}

/// Ordered search hits, best first.
pub type QueryResult = Vec<SearchHit>;
