//! Configuration loading with env-var overrides.
//!
//! Library users normally construct [`EngineConfig::default()`] and tweak
//! fields directly. Deployments can instead keep a `config/default.toml` and
//! call [`load`], which applies the `LEXGRAPH_LOG_LEVEL` env override on top.
//! The LLM API key is only ever read from the `LLM_API_KEY` env var — never
//! from TOML.

use std::{env, fs, path::Path};

use serde::Deserialize;

use crate::error::EngineError;

/// Scoring and shape parameters shared by the ranking paths.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Per-hop relevance decay factor, in `(0, 1]`.
    pub decay: f32,
    /// Weight of lexical/semantic relevance in composite scores.
    pub alpha: f32,
    /// Weight of graph centrality in composite scores.
    pub beta: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { decay: 0.85, alpha: 0.7, beta: 0.3 }
    }
}

/// Bounds for subgraph construction and community filtering.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// BFS depth used when building a query-scoped subgraph.
    pub subgraph_depth: usize,
    /// Minimum internal edge density for a community to be kept.
    pub min_community_density: f32,
    /// Traversal depth used by each retrieval agent.
    pub agent_depth: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self { subgraph_depth: 2, min_community_density: 0.1, agent_depth: 2 }
    }
}

/// Fan-out limits for the agent orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-agent deadline in milliseconds.
    pub agent_timeout_ms: u64,
    /// Overall deadline for one orchestrated call, in milliseconds.
    pub total_deadline_ms: u64,
    /// Number of findings each agent shares in the exchange round.
    pub exchange_top_k: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { agent_timeout_ms: 1500, total_deadline_ms: 5000, exchange_top_k: 3 }
    }
}

/// Limits for embedding-provider calls.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Fixed embedding dimension, declared at engine construction.
    pub dimension: usize,
    /// Maximum concurrent provider calls.
    pub concurrency: usize,
    /// Retry cap for transient provider errors.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; doubles per retry.
    pub backoff_base_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimension: 1536, concurrency: 4, max_retries: 3, backoff_base_ms: 100 }
    }
}

/// OpenAI-compatible provider endpoints.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Full embeddings endpoint URL.
    pub embeddings_url: String,
    /// Model name passed in completion request bodies.
    pub model: String,
    /// Model name passed in embedding request bodies.
    pub embedding_model: String,
    /// Sampling temperature for completions.
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:11434/v1/chat/completions".to_string(),
            embeddings_url: "http://localhost:11434/v1/embeddings".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.2,
            timeout_seconds: 30,
        }
    }
}

/// Provider selection.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which backend is active: `"dummy"`, `"openai"`, or `"unavailable"`.
    pub provider: String,
    /// Config for the OpenAI-compatible backend (`[llm.openai]`).
    pub openai: OpenAiConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { provider: "dummy".to_string(), openai: OpenAiConfig::default() }
    }
}

/// Fully-resolved engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub traversal: TraversalConfig,
    pub orchestrator: OrchestratorConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
}

/// Process-level configuration: engine settings plus logging.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub engine: EngineConfig,
    /// API key from `LLM_API_KEY` env — `None` for keyless local models.
    pub llm_api_key: Option<String>,
}

/// Load `config/default.toml` relative to the current working directory.
pub fn load() -> Result<Config, EngineError> {
    load_from(Path::new("config/default.toml"))
}

/// Load a config file, then apply env overrides.
pub fn load_from(path: &Path) -> Result<Config, EngineError> {
    let raw_text = fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
    let raw: RawConfig = toml::from_str(&raw_text)
        .map_err(|e| EngineError::Config(format!("cannot parse {}: {e}", path.display())))?;
    Ok(resolve(raw))
}

fn resolve(raw: RawConfig) -> Config {
    let defaults = EngineConfig::default();

    let scoring = ScoringConfig {
        decay: raw.scoring.decay.unwrap_or(defaults.scoring.decay),
        alpha: raw.scoring.alpha.unwrap_or(defaults.scoring.alpha),
        beta: raw.scoring.beta.unwrap_or(defaults.scoring.beta),
    };
    let traversal = TraversalConfig {
        subgraph_depth: raw.traversal.subgraph_depth.unwrap_or(defaults.traversal.subgraph_depth),
        min_community_density: raw
            .traversal
            .min_community_density
            .unwrap_or(defaults.traversal.min_community_density),
        agent_depth: raw.traversal.agent_depth.unwrap_or(defaults.traversal.agent_depth),
    };
    let orchestrator = OrchestratorConfig {
        agent_timeout_ms: raw
            .orchestrator
            .agent_timeout_ms
            .unwrap_or(defaults.orchestrator.agent_timeout_ms),
        total_deadline_ms: raw
            .orchestrator
            .total_deadline_ms
            .unwrap_or(defaults.orchestrator.total_deadline_ms),
        exchange_top_k: raw
            .orchestrator
            .exchange_top_k
            .unwrap_or(defaults.orchestrator.exchange_top_k),
    };
    let embedding = EmbeddingConfig {
        dimension: raw.embedding.dimension.unwrap_or(defaults.embedding.dimension),
        concurrency: raw.embedding.concurrency.unwrap_or(defaults.embedding.concurrency),
        max_retries: raw.embedding.max_retries.unwrap_or(defaults.embedding.max_retries),
        backoff_base_ms: raw
            .embedding
            .backoff_base_ms
            .unwrap_or(defaults.embedding.backoff_base_ms),
    };
    let openai_defaults = OpenAiConfig::default();
    let openai = OpenAiConfig {
        api_base_url: raw.llm.openai.api_base_url.unwrap_or(openai_defaults.api_base_url),
        embeddings_url: raw.llm.openai.embeddings_url.unwrap_or(openai_defaults.embeddings_url),
        model: raw.llm.openai.model.unwrap_or(openai_defaults.model),
        embedding_model: raw
            .llm
            .openai
            .embedding_model
            .unwrap_or(openai_defaults.embedding_model),
        temperature: raw.llm.openai.temperature.unwrap_or(openai_defaults.temperature),
        timeout_seconds: raw
            .llm
            .openai
            .timeout_seconds
            .unwrap_or(openai_defaults.timeout_seconds),
    };
    let llm = LlmConfig {
        provider: raw.llm.provider.unwrap_or_else(|| defaults.llm.provider.clone()),
        openai,
    };

    let log_level = env::var("LEXGRAPH_LOG_LEVEL")
        .ok()
        .filter(|s| !s.is_empty())
        .or(raw.log_level)
        .unwrap_or_else(|| "info".to_string());

    Config {
        log_level,
        engine: EngineConfig { scoring, traversal, orchestrator, embedding, llm },
        llm_api_key: env::var("LLM_API_KEY").ok().filter(|s| !s.is_empty()),
    }
}

// ── Raw TOML shapes — serde targets before resolution ─────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    scoring: RawScoring,
    #[serde(default)]
    traversal: RawTraversal,
    #[serde(default)]
    orchestrator: RawOrchestrator,
    #[serde(default)]
    embedding: RawEmbedding,
    #[serde(default)]
    llm: RawLlm,
}

#[derive(Deserialize, Default)]
struct RawScoring {
    decay: Option<f32>,
    alpha: Option<f32>,
    beta: Option<f32>,
}

#[derive(Deserialize, Default)]
struct RawTraversal {
    subgraph_depth: Option<usize>,
    min_community_density: Option<f32>,
    agent_depth: Option<usize>,
}

#[derive(Deserialize, Default)]
struct RawOrchestrator {
    agent_timeout_ms: Option<u64>,
    total_deadline_ms: Option<u64>,
    exchange_top_k: Option<usize>,
}

#[derive(Deserialize, Default)]
struct RawEmbedding {
    dimension: Option<usize>,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
    backoff_base_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct RawLlm {
    #[serde(rename = "default")]
    provider: Option<String>,
    #[serde(default)]
    openai: RawOpenAi,
}

#[derive(Deserialize, Default)]
struct RawOpenAi {
    api_base_url: Option<String>,
    embeddings_url: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    temperature: Option<f32>,
    timeout_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = EngineConfig::default();
        assert!((cfg.scoring.decay - 0.85).abs() < f32::EPSILON);
        assert!((cfg.scoring.alpha - 0.7).abs() < f32::EPSILON);
        assert!((cfg.scoring.beta - 0.3).abs() < f32::EPSILON);
        assert_eq!(cfg.embedding.dimension, 1536);
        assert_eq!(cfg.embedding.concurrency, 4);
        assert_eq!(cfg.embedding.max_retries, 3);
        assert_eq!(cfg.orchestrator.total_deadline_ms, 5000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            f,
            "log_level = \"debug\"\n\n[scoring]\ndecay = 0.9\n\n[llm]\ndefault = \"openai\"\n"
        )
        .expect("write");
        let cfg = load_from(f.path()).expect("load");
        assert!((cfg.engine.scoring.decay - 0.9).abs() < f32::EPSILON);
        assert!((cfg.engine.scoring.alpha - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.engine.llm.provider, "openai");
        assert_eq!(cfg.engine.embedding.dimension, 1536);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_from(Path::new("/nonexistent/lexgraph.toml")).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
