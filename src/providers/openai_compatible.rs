//! OpenAI-compatible HTTP adapters (`/v1/chat/completions`, `/v1/embeddings`).
//!
//! Covers OpenAI itself plus compatible local servers (Ollama, LM Studio…).
//! All wire types are private to this module — callers never see them.
//! Constructed once at startup, then cheaply cloned because
//! `reqwest::Client` is an `Arc` internally.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::ProviderError;

// ── Completion ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiCompletion {
    client: Client,
    api_base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiCompletion {
    /// `api_key` is `None` for keyless local models. When present it is sent
    /// as `Authorization: Bearer <key>` on every request.
    pub fn new(
        api_base_url: String,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, api_base_url, model, temperature, api_key })
    }

    /// One round-trip: `prompt` as the sole user message.
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message { role: "user".to_string(), content: prompt.to_string() }],
            temperature: self.temperature,
        };
        debug!(model = %payload.model, prompt_len = prompt.len(), "sending completion request");

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "completion HTTP request failed");
            ProviderError::Request(e.to_string())
        })?;
        let response = check_status(response).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Request("empty or missing content in response".into()))
    }
}

// ── Embedding ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenAiEmbedding {
    client: Client,
    embeddings_url: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
}

impl OpenAiEmbedding {
    pub fn new(
        embeddings_url: String,
        model: String,
        dimension: usize,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, embeddings_url, model, dimension, api_key })
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let payload = EmbeddingRequest {
            model: self.model.clone(),
            input: text.to_string(),
        };
        debug!(model = %payload.model, text_len = text.len(), "sending embedding request");

        let mut req = self.client.post(&self.embeddings_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.map_err(|e| {
            error!(url = %self.embeddings_url, error = %e, "embedding HTTP request failed");
            ProviderError::Request(e.to_string())
        })?;
        let response = check_status(response).await?;

        let parsed = response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| ProviderError::Request(format!("failed to parse response body: {e}")))?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Request("empty embedding response".into()))?;
        if vector.len() != self.dimension {
            return Err(ProviderError::Request(format!(
                "embedding dimension {} does not match declared dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(vector)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };
    error!(%status, %message, "provider returned HTTP error");
    Err(ProviderError::Request(message))
}
