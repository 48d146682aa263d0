//! # doc-qa
//!
//! Retrieval-augmented question answering over a single long document.
//!
//! The document is split into overlapping chunks, each chunk is embedded,
//! and the vectors are kept in a flat exact-search index. A question is
//! embedded the same way, its nearest chunks are retrieved, and a generator
//! answers from those chunks alone.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//! │ Extract  │──▶│ Chunker │──▶│ Embedder │──▶│ VectorIndex │──▶ index.json
//! │ PDF/text │   └─────────┘   └──────────┘   └──────┬──────┘
//! └──────────┘                                      │ top-k
//!                                                   ▼
//!                  question ──▶ Embedder ──▶ Retriever ──▶ Generator ──▶ answer
//!                                                   │
//!                                      ┌────────────┴────────────┐
//!                                      ▼                         ▼
//!                                ┌──────────┐              ┌──────────┐
//!                                │   CLI    │              │   HTTP   │
//!                                │ (docqa)  │              │ sessions │
//!                                └──────────┘              └──────────┘
//! ```
//!
//! The runtime-agnostic pieces (chunker, index, retriever, prompt) live in
//! `doc-qa-core`. This crate supplies the concrete backends and the session
//! orchestrator on top.
//!
//! ## Quick Start
//!
//! ```bash
//! docqa index build handbook.pdf          # extract, chunk, embed, save
//! docqa ask "How many vacation days?"     # answer from data/index.json
//! docqa chat handbook.pdf                 # interactive loop
//! docqa serve                             # HTTP session server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding backends (hash, OpenAI, Ollama, local) |
//! | [`generation`] | Answer backends (extractive, OpenAI, Ollama) |
//! | [`extract`] | PDF and text extraction |
//! | [`storage`] | Atomic index files |
//! | [`session`] | Ingest/answer/reset orchestration |
//! | [`server`] | HTTP session server |

pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
mod http;
pub mod server;
pub mod session;
pub mod storage;

