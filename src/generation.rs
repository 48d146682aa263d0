//! Answer generator implementations.
//!
//! - **[`ExtractiveGenerator`]**: offline; answers with the first sentence of
//!   the best-matching context. The default.
//! - **[`OpenAIGenerator`]**: OpenAI chat completions (or any compatible server).
//! - **[`OllamaGenerator`]**: a local Ollama instance's `/api/generate`.
//!
//! The model-backed generators send the prompt rendered by
//! [`doc_qa_core::prompt::render`] and return the completion trimmed.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use doc_qa_core::generation::AnswerGenerator;
use doc_qa_core::prompt::{render, UNKNOWN_ANSWER};
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::http;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

// ============ Extractive ============

/// Answers with the leading sentence of the top-ranked context.
pub struct ExtractiveGenerator;

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, contexts: &[String], _question: &str) -> Result<String> {
        Ok(contexts
            .iter()
            .map(|c| first_sentence(c))
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_ANSWER.to_string()))
    }
}

/// Leading sentence of `text` with whitespace runs collapsed.
fn first_sentence(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = flat.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            match chars.peek() {
                None | Some((_, ' ')) => return flat[..i + c.len_utf8()].to_string(),
                _ => {}
            }
        }
    }
    flat
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    endpoint: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_BASE_URL);

        Ok(Self {
            model,
            endpoint: http::openai_endpoint(base, "chat/completions"),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout())?,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, contexts: &[String], question: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": render(contexts, question) }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let json = http::post_json_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        parse_chat_completion(&json)
    }
}

fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))?;
    Ok(content.trim().to_string())
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());

        Ok(Self {
            model,
            url: url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout())?,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, contexts: &[String], question: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": render(contexts, question),
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });
        let endpoint = format!("{}/api/generate", self.url);
        let json = http::post_json_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await
        .with_context(|| format!("is Ollama running at {}?", self.url))?;
        parse_ollama_generate(&json)
    }
}

fn parse_ollama_generate(json: &serde_json::Value) -> Result<String> {
    let response = json
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))?;
    Ok(response.trim().to_string())
}

/// Create the [`AnswerGenerator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
