//! Offline feature-hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into one of
//! `dims` buckets with a hash-derived sign, and the bucket counts are
//! L2-normalized. Texts sharing words get similar vectors, which is enough
//! for keyword-grade retrieval with no model download or network access.

use anyhow::Result;
use async_trait::async_trait;
use doc_qa_core::embedding::{l2_normalize, EmbeddingProvider};
use sha2::{Digest, Sha256};

pub const HASH_MODEL_NAME: &str = "feature-hash-v1";
pub const DEFAULT_HASH_DIMS: usize = 384;

pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            anyhow::bail!("hash embedder dims must be > 0");
        }
        Ok(Self { dims })
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut word = [0u8; 8];
            word.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(word) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&mut v);
        v
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        HASH_MODEL_NAME
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
