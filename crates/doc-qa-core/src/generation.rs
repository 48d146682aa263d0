//! Answer generator trait.
//!
//! A generator turns a question plus the retrieved context passages into a
//! natural-language answer. Concrete backends live in the `doc-qa` app
//! crate; the session layer only sees this trait.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Answer `question` from `contexts`, ordered best match first.
    ///
    /// `contexts` may be empty. Failures are opaque and surface to callers
    /// as [`Error::Upstream`](crate::Error::Upstream).
    async fn generate(&self, contexts: &[String], question: &str) -> Result<String>;
}
