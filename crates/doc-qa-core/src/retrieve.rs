//! Query-time retrieval: embed the question, then search the index.

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{Error, Result, Upstream};
use crate::index::VectorIndex;
use crate::models::QueryResult;

/// Return the `k` chunks of `index` most relevant to `query`.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] for a blank query or `k == 0`.
/// - [`Error::Upstream`] if the embedder fails.
/// - [`Error::DimensionMismatch`] if the embedder's vectors do not fit the index.
pub async fn retrieve(
    query: &str,
    index: &VectorIndex,
    k: usize,
    embedder: &dyn EmbeddingProvider,
) -> Result<QueryResult> {
    if query.trim().is_empty() {
        return Err(Error::InvalidArgument("query must not be empty".to_string()));
    }
    if k == 0 {
        return Err(Error::InvalidArgument("k must be >= 1".to_string()));
    }

    let vector = embed_query(embedder, query)
        .await
        .map_err(|e| Error::upstream(Upstream::Embedding, e))?;

    index.search(&vector, k)
}
