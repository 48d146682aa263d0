//! Question-answering session: one document index plus chat history.
//!
//! ```text
//!            ingest                 ingest (replace)
//!   Empty ───────────▶ Ready ◀──────────────────┐
//!     ▲                  │ └────────────────────┘
//!     └──────────────────┘
//!            reset
//! ```
//!
//! # Concurrency
//!
//! A [`Session`] is `Send + Sync` and meant to be shared behind an `Arc`.
//! State lives under a short-lived `RwLock` that is never held across an
//! `.await`:
//!
//! - `ingest` builds the new index completely, then swaps it in under the
//!   write lock together with clearing history.
//! - `answer` clones the current `Arc<VectorIndex>` under the read lock and
//!   works on that snapshot, so a concurrent ingest never exposes a
//!   half-built index.
//! - Every state replacement bumps an epoch. An answer whose epoch went stale
//!   while it was in flight is still returned, but is not appended to the
//!   new history.
//!
//! Embedding and generation calls are each bounded by a timeout and map to
//! [`Error::UpstreamTimeout`] when it elapses.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use doc_qa_core::chunk::{Chunker, ChunkerConfig};
use doc_qa_core::embedding::EmbeddingProvider;
use doc_qa_core::generation::AnswerGenerator;
use doc_qa_core::index::{Metric, VectorIndex};
use doc_qa_core::retrieve::retrieve;
use doc_qa_core::{Error, Result, SearchHit, Upstream};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::storage;

/// Tunables for a session, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub chunker: ChunkerConfig,
    pub top_k: usize,
    pub metric: Metric,
    pub batch_size: usize,
    pub embed_timeout: Duration,
    pub generate_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&Config::minimal())
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunker: config.chunking.chunker_config(),
            top_k: config.retrieval.top_k,
            metric: config.retrieval.metric,
            batch_size: config.embedding.batch_size,
            embed_timeout: config.embedding.timeout(),
            generate_timeout: config.generation.timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Empty,
    Ready,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub chunks: usize,
    pub model: String,
    pub dims: usize,
    pub elapsed_ms: u64,
}

/// A grounded answer and the chunks it was generated from, best first.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    index: Option<Arc<VectorIndex>>,
    history: Vec<ChatTurn>,
    epoch: u64,
}

pub struct Session {
    config: SessionConfig,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    state: RwLock<State>,
}

impl Session {
    /// # Errors
    ///
    /// [`Error::InvalidConfiguration`] for an invalid chunker config, a zero
    /// `top_k`, or a zero `batch_size`.
    pub fn new(
        config: SessionConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Result<Self> {
        let chunker = Chunker::new(config.chunker)?;
        if config.top_k == 0 {
            return Err(Error::InvalidConfiguration("top_k must be >= 1".to_string()));
        }
        if config.batch_size == 0 {
            return Err(Error::InvalidConfiguration(
                "batch_size must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            config,
            chunker,
            embedder,
            generator,
            state: RwLock::new(State::default()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        if self.read().index.is_some() {
            SessionStatus::Ready
        } else {
            SessionStatus::Empty
        }
    }

    /// Snapshot of the current index, if any.
    pub fn index(&self) -> Option<Arc<VectorIndex>> {
        self.read().index.clone()
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.read().history.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.read().epoch
    }

    /// Chunk, embed, and index `text`, replacing any previous document.
    ///
    /// On success history is cleared. On any error the previous index and
    /// history are left exactly as they were.
    pub async fn ingest(&self, text: &str) -> Result<IngestReport> {
        let started = Instant::now();
        let chunks = self.chunker.split(text);
        if chunks.is_empty() {
            return Err(Error::EmptyDocument);
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(self.config.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embed_batch(&texts).await?;
            tracing::debug!(batch = batch_no, size = texts.len(), "embedded batch");
            vectors.extend(embedded);
        }

        let spec = self.embedder.spec();
        let count = chunks.len();
        let index = VectorIndex::build(
            chunks.into_iter().zip(vectors).collect(),
            spec.clone(),
            self.config.metric,
        )?;
        self.install(index);

        let report = IngestReport {
            chunks: count,
            model: spec.model,
            dims: spec.dims,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            chunks = report.chunks,
            model = %report.model,
            elapsed_ms = report.elapsed_ms,
            "ingested document"
        );
        Ok(report)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let timeout = self.config.embed_timeout;
        let vectors = tokio::time::timeout(timeout, self.embedder.embed(texts))
            .await
            .map_err(|_| Error::UpstreamTimeout {
                operation: Upstream::Embedding,
                timeout,
            })?
            .map_err(|e| Error::upstream(Upstream::Embedding, e))?;

        if vectors.len() != texts.len() {
            return Err(Error::Upstream {
                operation: Upstream::Embedding,
                message: format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                ),
            });
        }
        Ok(vectors)
    }

    /// Answer `question` from the current document.
    ///
    /// An "I don't know" answer is a normal success. On error neither the
    /// index nor the history changes.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "question must not be empty".to_string(),
            ));
        }

        let (index, epoch) = {
            let state = self.read();
            let index = state.index.clone().ok_or(Error::NotReady)?;
            (index, state.epoch)
        };

        let embed_timeout = self.config.embed_timeout;
        let hits = tokio::time::timeout(
            embed_timeout,
            retrieve(question, &index, self.config.top_k, self.embedder.as_ref()),
        )
        .await
        .map_err(|_| Error::UpstreamTimeout {
            operation: Upstream::Embedding,
            timeout: embed_timeout,
        })??;

        let contexts: Vec<String> = hits.iter().map(|h| h.text.clone()).collect();
        let generate_timeout = self.config.generate_timeout;
        let text = tokio::time::timeout(
            generate_timeout,
            self.generator.generate(&contexts, question),
        )
        .await
        .map_err(|_| Error::UpstreamTimeout {
            operation: Upstream::Generation,
            timeout: generate_timeout,
        })?
        .map_err(|e| Error::upstream(Upstream::Generation, e))?;

        {
            let mut state = self.write();
            if state.epoch == epoch {
                state.history.push(ChatTurn {
                    question: question.to_string(),
                    answer: text.clone(),
                    asked_at: Utc::now(),
                });
            } else {
                tracing::warn!(
                    started_epoch = epoch,
                    current_epoch = state.epoch,
                    "document replaced while answering; turn not recorded"
                );
            }
        }

        tracing::debug!(citations = hits.len(), "answered question");
        Ok(Answer {
            text,
            citations: hits,
        })
    }

    /// Discard the index and history.
    pub fn reset(&self) {
        let mut state = self.write();
        state.index = None;
        state.history.clear();
        state.epoch += 1;
        tracing::info!(epoch = state.epoch, "session reset");
    }

    /// Install a prebuilt index (e.g. one loaded from disk) as the current
    /// document. Its spec must match this session's embedder.
    pub fn install_index(&self, index: VectorIndex) -> Result<()> {
        index.check_spec(&self.embedder.spec())?;
        self.install(index);
        Ok(())
    }

    /// Load the index at `path` and install it.
    pub fn load_index(&self, path: &Path) -> Result<usize> {
        let index = storage::load_index(path, &self.embedder.spec())?;
        let len = index.len();
        self.install(index);
        Ok(len)
    }

    /// Persist the current index to `path`.
    pub fn save_index(&self, path: &Path) -> Result<()> {
        let index = self.index().ok_or(Error::NotReady)?;
        storage::save_index(&index, path)
    }

    fn install(&self, index: VectorIndex) {
        let mut state = self.write();
        state.index = Some(Arc::new(index));
        state.history.clear();
        state.epoch += 1;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============ Registry ============

/// Independent sessions keyed by UUID, sharing stateless collaborators.
///
/// Sessions live until they are removed or, when the host calls
/// [`evict_idle`](Self::evict_idle), until they go unused for too long.
pub struct SessionRegistry {
    config: SessionConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn AnswerGenerator>,
    sessions: RwLock<HashMap<Uuid, Slot>>,
}

struct Slot {
    session: Arc<Session>,
    last_used: Instant,
}

impl SessionRegistry {
    pub fn new(
        config: SessionConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Result<Self> {
        // Fail at startup rather than on the first create().
        Session::new(config.clone(), embedder.clone(), generator.clone())?;
        Ok(Self {
            config,
            embedder,
            generator,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn create(&self) -> Result<(Uuid, Arc<Session>)> {
        let session = Arc::new(Session::new(
            self.config.clone(),
            self.embedder.clone(),
            self.generator.clone(),
        )?);
        let id = Uuid::new_v4();
        self.slots_mut().insert(
            id,
            Slot {
                session: session.clone(),
                last_used: Instant::now(),
            },
        );
        tracing::debug!(%id, "created session");
        Ok((id, session))
    }

    /// Look up a session and mark it as used.
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        let mut slots = self.slots_mut();
        let slot = slots.get_mut(id)?;
        slot.last_used = Instant::now();
        Some(slot.session.clone())
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.slots_mut().remove(id).is_some()
    }

    /// Drop every session not looked up within `max_idle`. Returns how many
    /// were dropped. Callers still holding one keep it working.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut slots = self.slots_mut();
        let before = slots.len();
        slots.retain(|id, slot| {
            let keep = now.saturating_duration_since(slot.last_used) < max_idle;
            if !keep {
                tracing::debug!(%id, "evicting idle session");
            }
            keep
        });
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Slot>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::generation::ExtractiveGenerator;

    fn session() -> Session {
        Session::new(
            SessionConfig::default(),
            Arc::new(HashEmbedder::new(64).unwrap()),
            Arc::new(ExtractiveGenerator),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_new_session_is_empty() {
        let s = session();
        assert_eq!(s.status(), SessionStatus::Empty);
        assert!(s.index().is_none());
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_invalid_session_config() {
        let config = SessionConfig {
            top_k: 0,
            ..SessionConfig::default()
        };
        let err = Session::new(
            config,
            Arc::new(HashEmbedder::new(8).unwrap()),
            Arc::new(ExtractiveGenerator),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_ingest_then_answer_records_history() {
        let s = session();
        let report = s
            .ingest("Rust was first released in 2015. It favors memory safety.")
            .await
            .unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(s.status(), SessionStatus::Ready);

        let answer = s.answer("When was Rust released?").await.unwrap();
        assert_eq!(answer.text, "Rust was first released in 2015.");
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history()[0].question, "When was Rust released?");
    }

    #[tokio::test]
    async fn test_blank_question_rejected_without_history() {
        let s = session();
        s.ingest("Some text.").await.unwrap();
        assert!(matches!(
            s.answer("  ").await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(s.history().is_empty());
    }

    #[tokio::test]
    async fn test_save_requires_index() {
        let s = session();
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            s.save_index(&tmp.path().join("i.json")),
            Err(Error::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_through_session() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.json");

        let a = session();
        a.ingest("Alpha text about cats. Beta text about dogs.").await.unwrap();
        a.save_index(&path).unwrap();

        let b = session();
        assert_eq!(b.load_index(&path).unwrap(), 1);
        assert_eq!(b.status(), SessionStatus::Ready);
        assert!(b.answer("cats?").await.is_ok());
    }

    #[test]
    fn test_registry_create_get_remove() {
        let registry = SessionRegistry::new(
            SessionConfig::default(),
            Arc::new(HashEmbedder::new(16).unwrap()),
            Arc::new(ExtractiveGenerator),
        )
        .unwrap();
        let (id, _) = registry.create().unwrap();
        let (other, _) = registry.create().unwrap();
        assert_ne!(id, other);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(&id).is_some());
        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(registry.get(&id).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_evicts_only_idle_sessions() {
        let registry = SessionRegistry::new(
            SessionConfig::default(),
            Arc::new(HashEmbedder::new(16).unwrap()),
            Arc::new(ExtractiveGenerator),
        )
        .unwrap();
        let (stale, held) = registry.create().unwrap();
        let (fresh, _) = registry.create().unwrap();
        assert_eq!(registry.evict_idle(Duration::from_secs(3600)), 0);

        std::thread::sleep(Duration::from_millis(50));
        assert!(registry.get(&fresh).is_some());
        assert_eq!(registry.evict_idle(Duration::from_millis(25)), 1);
        assert!(registry.get(&stale).is_none());
        assert!(registry.get(&fresh).is_some());
        assert_eq!(held.status(), SessionStatus::Empty);
    }
}
