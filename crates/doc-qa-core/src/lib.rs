//! # doc-qa core
//!
//! Runtime-agnostic retrieval logic for doc-qa: data models, the overlapping
//! chunker, the flat vector index and its on-disk bundle format, the
//! retriever, prompt assembly, and the collaborator traits for embedding and
//! answer generation.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. The `doc-qa`
//! application crate supplies concrete collaborators, index file storage,
//! and the session orchestrator.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;
pub mod retrieve;

pub use error::{Error, Result, Upstream};
pub use models::{Chunk, EmbeddingSpec, SearchHit};
