//! Flat exact-search vector index and its versioned bundle format.
//!
//! A [`VectorIndex`] owns every [`IndexEntry`] and a contiguous row-major
//! buffer of their vectors. It is built once from a batch of embedded chunks
//! and never mutated afterwards; re-ingestion replaces it wholesale.
//!
//! # Ranking
//!
//! [`search`](VectorIndex::search) scores every row under the index's
//! [`Metric`] and returns the top `k`, best first. Higher scores are always
//! more similar (euclidean scores are negated distances). Equal scores rank
//! by insertion order.
//!
//! # Bundle format
//!
//! [`IndexBundle`] is the durable JSON form:
//!
//! ```text
//! {
//!   "format_version": 1,
//!   "embedding_model": "all-minilm-l6-v2",
//!   "dims": 384,
//!   "metric": "cosine",
//!   "count": 42,
//!   "created_at": "2026-01-01T00:00:00Z",
//!   "checksum": "<sha-256 hex of the raw vector bytes>",
//!   "vectors": "<base64 of little-endian f32 rows>",
//!   "entries": [{ "id": 0, "index": 0, "source_offset": 0, "text": "..." }]
//! }
//! ```
//!
//! Decoding checks the format version before anything else, then validates
//! metadata consistency before any vector is trusted.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embedding::{blob_to_vec, cosine_similarity, euclidean_distance, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{Chunk, EmbeddingSpec, QueryResult, SearchHit};

/// Current on-disk bundle version.
pub const FORMAT_VERSION: u32 = 1;

/// Similarity metric, fixed for the lifetime of an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
        }
    }

    /// Similarity of `a` and `b`; higher is more similar.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Euclidean => -euclidean_distance(a, b),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(Metric::Cosine),
            "euclidean" => Ok(Metric::Euclidean),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown similarity metric '{}'. Must be cosine or euclidean.",
                other
            ))),
        }
    }
}

/// One indexed chunk. Its vector lives in the index's flat buffer at the
/// same position as the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Unique, stable id. Assigned in insertion order from 0.
    pub id: u64,
    pub chunk: Chunk,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    spec: EmbeddingSpec,
    metric: Metric,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// Build a new index from embedded chunks.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyInput`] if `items` is empty.
    /// - [`Error::InvalidConfiguration`] if `spec.dims` is 0.
    /// - [`Error::DimensionMismatch`] if any vector's length differs from `spec.dims`.
    /// - [`Error::InvalidArgument`] if any vector holds NaN or infinity.
    pub fn build(items: Vec<(Chunk, Vec<f32>)>, spec: EmbeddingSpec, metric: Metric) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::EmptyInput);
        }
        if spec.dims == 0 {
            return Err(Error::InvalidConfiguration(
                "embedding dims must be > 0".to_string(),
            ));
        }

        let mut entries = Vec::with_capacity(items.len());
        let mut vectors = Vec::with_capacity(items.len() * spec.dims);

        for (id, (chunk, vector)) in (0u64..).zip(items) {
            check_vector(&vector, spec.dims)?;
            vectors.extend_from_slice(&vector);
            entries.push(IndexEntry { id, chunk });
        }

        tracing::debug!(
            entries = entries.len(),
            dims = spec.dims,
            metric = %metric,
            "built vector index"
        );

        Ok(Self {
            spec,
            metric,
            created_at: Utc::now(),
            entries,
            vectors,
        })
    }

    /// Build from bare chunk texts, numbering them in order.
    pub fn build_from_texts(
        items: Vec<(String, Vec<f32>)>,
        spec: EmbeddingSpec,
        metric: Metric,
    ) -> Result<Self> {
        let items = items
            .into_iter()
            .enumerate()
            .map(|(i, (text, v))| (Chunk::new(i, text), v))
            .collect();
        Self::build(items, spec, metric)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.spec.dims
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn spec(&self) -> &EmbeddingSpec {
        &self.spec
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Indexed chunks in id order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> + '_ {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Look up an entry and its vector by id.
    pub fn get(&self, id: u64) -> Option<(&IndexEntry, &[f32])> {
        let pos = self.entries.binary_search_by_key(&id, |e| e.id).ok()?;
        Some((&self.entries[pos], self.row(pos)))
    }

    fn row(&self, pos: usize) -> &[f32] {
        let dims = self.spec.dims;
        &self.vectors[pos * dims..(pos + 1) * dims]
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Fewer than `k` entries yields all of them; an empty index yields an
    /// empty result.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `k == 0` or `query` holds non-finite values.
    /// - [`Error::DimensionMismatch`] if `query.len()` differs from the index dims.
    pub fn search(&self, query: &[f32], k: usize) -> Result<QueryResult> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be >= 1".to_string()));
        }
        check_vector(query, self.spec.dims)?;
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.spec.dims)
            .map(|row| self.metric.score(query, row))
            .map(|s| if s.is_nan() { f32::NEG_INFINITY } else { s })
            .enumerate()
            .collect();

        // Position order is insertion order, so it doubles as the tie-break.
        let rank = |a: &(usize, f32), b: &(usize, f32)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank);
            scored.truncate(k);
        }
        scored.sort_by(rank);

        tracing::debug!(k, candidates = self.entries.len(), returned = scored.len(), "vector search");

        Ok(scored
            .into_iter()
            .map(|(pos, score)| {
                let entry = &self.entries[pos];
                SearchHit {
                    id: entry.id,
                    chunk_index: entry.chunk.index,
                    text: entry.chunk.text.clone(),
                    score,
                }
            })
            .collect())
    }

    /// Check that this index was built for `expected`.
    ///
    /// A dims disagreement is a [`Error::DimensionMismatch`]; a model name
    /// disagreement is an [`Error::InvalidConfiguration`], since vectors from
    /// different models are not comparable even at equal dims.
    pub fn check_spec(&self, expected: &EmbeddingSpec) -> Result<()> {
        if self.spec.dims != expected.dims {
            return Err(Error::DimensionMismatch {
                expected: expected.dims,
                actual: self.spec.dims,
            });
        }
        if self.spec.model != expected.model {
            return Err(Error::InvalidConfiguration(format!(
                "index was built with embedding model '{}' but '{}' is configured",
                self.spec.model, expected.model
            )));
        }
        Ok(())
    }

    pub fn to_bundle(&self) -> IndexBundle {
        let blob = vec_to_blob(&self.vectors);
        IndexBundle {
            format_version: FORMAT_VERSION,
            embedding_model: self.spec.model.clone(),
            dims: self.spec.dims,
            metric: self.metric.as_str().to_string(),
            count: self.entries.len(),
            created_at: self.created_at,
            checksum: sha256_hex(&blob),
            vectors: BASE64.encode(&blob),
            entries: self
                .entries
                .iter()
                .map(|e| BundleEntry {
                    id: e.id,
                    index: e.chunk.index,
                    source_offset: e.chunk.source_offset,
                    text: e.chunk.text.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild an index from a bundle, validating it first.
    ///
    /// Every inconsistency is reported as [`Error::CorruptIndex`].
    pub fn from_bundle(bundle: IndexBundle) -> Result<Self> {
        check_version(bundle.format_version)?;
        if bundle.dims == 0 {
            return Err(corrupt("dims must be > 0"));
        }
        let metric: Metric = bundle
            .metric
            .parse()
            .map_err(|_| corrupt(format!("unknown metric '{}'", bundle.metric)))?;
        if bundle.count != bundle.entries.len() {
            return Err(corrupt(format!(
                "count is {} but {} entries are present",
                bundle.count,
                bundle.entries.len()
            )));
        }
        if bundle
            .entries
            .windows(2)
            .any(|pair| pair[0].id >= pair[1].id)
        {
            return Err(corrupt("entry ids are not strictly increasing"));
        }

        let blob = BASE64
            .decode(bundle.vectors.as_bytes())
            .map_err(|e| corrupt(format!("vector payload is not valid base64: {}", e)))?;
        let expected_len = bundle
            .count
            .checked_mul(bundle.dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| corrupt("count × dims overflows"))?;
        if blob.len() != expected_len {
            return Err(corrupt(format!(
                "vector payload is {} bytes, expected {} for {} × {} f32",
                blob.len(),
                expected_len,
                bundle.count,
                bundle.dims
            )));
        }
        if sha256_hex(&blob) != bundle.checksum {
            return Err(corrupt("vector checksum mismatch"));
        }

        let vectors = blob_to_vec(&blob);
        if vectors.iter().any(|x| !x.is_finite()) {
            return Err(corrupt("vector payload holds non-finite values"));
        }

        let entries = bundle
            .entries
            .into_iter()
            .map(|e| IndexEntry {
                id: e.id,
                chunk: Chunk {
                    index: e.index,
                    text: e.text,
                    source_offset: e.source_offset,
                },
            })
            .collect();

        Ok(Self {
            spec: EmbeddingSpec::new(bundle.embedding_model, bundle.dims),
            metric,
            created_at: bundle.created_at,
            entries,
            vectors,
        })
    }

    /// Serialize to the JSON bundle encoding.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.to_bundle())
            .map_err(|e| Error::InvalidArgument(format!("cannot serialize index: {}", e)))
    }

    /// Decode the JSON bundle encoding. The format version is read and
    /// checked before the rest of the document is interpreted.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let bundle: IndexBundle = serde_json::from_value(parse_versioned(bytes)?)
            .map_err(|e| corrupt(format!("malformed bundle: {}", e)))?;
        Self::from_bundle(bundle)
    }
}

/// Durable serialization of a [`VectorIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBundle {
    pub format_version: u32,
    pub embedding_model: String,
    pub dims: usize,
    pub metric: String,
    pub count: usize,
    pub created_at: DateTime<Utc>,
    pub checksum: String,
    pub vectors: String,
    pub entries: Vec<BundleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    pub id: u64,
    pub index: usize,
    #[serde(default)]
    pub source_offset: Option<usize>,
    pub text: String,
}

/// Bundle metadata, readable without decoding any vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub format_version: u32,
    pub embedding_model: String,
    pub dims: usize,
    pub metric: String,
    pub count: usize,
    pub created_at: DateTime<Utc>,
}

/// Read bundle metadata, checking the format version first.
pub fn read_info(bytes: &[u8]) -> Result<IndexInfo> {
    serde_json::from_value(parse_versioned(bytes)?)
        .map_err(|e| corrupt(format!("malformed metadata: {}", e)))
}

/// Parse the document once and check its `format_version` before any other
/// field is interpreted.
fn parse_versioned(bytes: &[u8]) -> Result<serde_json::Value> {
    let doc: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| corrupt(format!("malformed bundle: {}", e)))?;
    let version = doc
        .get("format_version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| corrupt("missing or malformed format_version"))?;
    let version = u32::try_from(version)
        .map_err(|_| corrupt(format!("unsupported format version {}", version)))?;
    check_version(version)?;
    Ok(doc)
}

fn check_version(version: u32) -> Result<()> {
    if version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }
    Ok(())
}

fn check_vector(vector: &[f32], dims: usize) -> Result<()> {
    if vector.len() != dims {
        return Err(Error::DimensionMismatch {
            expected: dims,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(Error::InvalidArgument(
            "vector holds NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

fn corrupt(msg: impl Into<String>) -> Error {
    Error::CorruptIndex(msg.into())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
