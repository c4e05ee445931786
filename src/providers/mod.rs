//! Completion and embedding provider abstraction.
//!
//! Both capabilities are enums over concrete backends — add a new variant +
//! module for each additional backend. Provider instances are shared
//! immutable capabilities; clone them freely.
//!
//! An absent external service is the explicit `Unavailable` variant, routed
//! through [`ProviderError`]: the graph/retrieval logic never depends on a
//! provider being reachable, and callers degrade to raw findings when the
//! completion side is down.

pub mod dummy;
pub mod embedder;
#[cfg(feature = "http-providers")]
pub mod openai_compatible;

use thiserror::Error;

use crate::config::{EmbeddingConfig, LlmConfig};

pub use embedder::Embedder;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    /// No provider is configured; a deliberate offline state, not a failure.
    #[error("provider unavailable")]
    Unavailable,
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
    /// A transient failure survived every backoff retry.
    #[error("provider retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    /// Every retrieval agent in one orchestrated call failed.
    #[error("all retrieval agents failed")]
    AllAgentsFailed,
}

// ── Completion ────────────────────────────────────────────────────────────────

/// Text-completion backends. Used only for final answer phrasing; retrieval
/// itself never calls this.
#[derive(Debug, Clone)]
pub enum CompletionProvider {
    Dummy(dummy::DummyCompletion),
    #[cfg(feature = "http-providers")]
    OpenAiCompatible(openai_compatible::OpenAiCompletion),
    Unavailable,
}

impl CompletionProvider {
    pub fn is_available(&self) -> bool {
        !matches!(self, CompletionProvider::Unavailable)
    }

    /// Send `prompt` to the provider and return its text reply.
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        match self {
            CompletionProvider::Dummy(p) => p.complete(prompt).await,
            #[cfg(feature = "http-providers")]
            CompletionProvider::OpenAiCompatible(p) => p.complete(prompt).await,
            CompletionProvider::Unavailable => Err(ProviderError::Unavailable),
        }
    }
}

// ── Embedding ─────────────────────────────────────────────────────────────────

/// Embedding backends with a fixed output dimension declared at startup.
#[derive(Debug, Clone)]
pub enum EmbeddingProvider {
    Dummy(dummy::DummyEmbedding),
    #[cfg(feature = "http-providers")]
    OpenAiCompatible(openai_compatible::OpenAiEmbedding),
    Unavailable,
}

impl EmbeddingProvider {
    pub fn is_available(&self) -> bool {
        !matches!(self, EmbeddingProvider::Unavailable)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        match self {
            EmbeddingProvider::Dummy(p) => p.embed(text).await,
            #[cfg(feature = "http-providers")]
            EmbeddingProvider::OpenAiCompatible(p) => p.embed(text).await,
            EmbeddingProvider::Unavailable => Err(ProviderError::Unavailable),
        }
    }
}

// ── Construction ──────────────────────────────────────────────────────────────

/// Build the provider pair selected by config.
///
/// `api_key` comes from the `LLM_API_KEY` env var — never TOML.
pub fn build(
    llm: &LlmConfig,
    embedding: &EmbeddingConfig,
    api_key: Option<String>,
) -> Result<(CompletionProvider, EmbeddingProvider), ProviderError> {
    match llm.provider.as_str() {
        "dummy" => Ok((
            CompletionProvider::Dummy(dummy::DummyCompletion),
            EmbeddingProvider::Dummy(dummy::DummyEmbedding::new(embedding.dimension)),
        )),
        "unavailable" => Ok((CompletionProvider::Unavailable, EmbeddingProvider::Unavailable)),
        #[cfg(feature = "http-providers")]
        "openai" => {
            let completion = openai_compatible::OpenAiCompletion::new(
                llm.openai.api_base_url.clone(),
                llm.openai.model.clone(),
                llm.openai.temperature,
                llm.openai.timeout_seconds,
                api_key.clone(),
            )?;
            let embed = openai_compatible::OpenAiEmbedding::new(
                llm.openai.embeddings_url.clone(),
                llm.openai.embedding_model.clone(),
                embedding.dimension,
                llm.openai.timeout_seconds,
                api_key,
            )?;
            Ok((
                CompletionProvider::OpenAiCompatible(completion),
                EmbeddingProvider::OpenAiCompatible(embed),
            ))
        }
        #[cfg(not(feature = "http-providers"))]
        "openai" => Err(ProviderError::UnknownProvider(
            "openai (built without the http-providers feature)".to_string(),
        )),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}
