//! Concurrency-bounded, retrying wrapper around the embedding provider.
//!
//! Every embedding call in the engine goes through here: a semaphore of
//! configurable width gates concurrent provider calls, and transient request
//! failures are retried with exponential backoff before a fatal
//! [`ProviderError`] surfaces. `Unavailable` is never retried — an absent
//! provider is a state, not a transient fault.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::EmbeddingConfig;

use super::{EmbeddingProvider, ProviderError};

#[derive(Debug, Clone)]
pub struct Embedder {
    provider: EmbeddingProvider,
    semaphore: Arc<Semaphore>,
    dimension: usize,
    max_retries: u32,
    backoff_base: Duration,
}

impl Embedder {
    pub fn new(provider: EmbeddingProvider, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            dimension: config.dimension,
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_available(&self) -> bool {
        self.provider.is_available()
    }

    /// Embed `text`, holding a semaphore permit for the duration of the call
    /// (including retries).
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProviderError::Request("embedding semaphore closed".into()))?;

        let mut delay = self.backoff_base;
        let mut failures: u32 = 0;
        loop {
            match self.provider.embed(text).await {
                Ok(vector) => return Ok(vector),
                Err(ProviderError::Unavailable) => return Err(ProviderError::Unavailable),
                Err(e) => {
                    failures += 1;
                    if failures > self.max_retries {
                        return Err(ProviderError::Exhausted {
                            attempts: failures,
                            last: e.to_string(),
                        });
                    }
                    warn!(attempt = failures, error = %e, "embedding call failed, backing off");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::dummy::DummyEmbedding;

    fn config(dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig { dimension, concurrency: 2, max_retries: 3, backoff_base_ms: 1 }
    }

    #[tokio::test]
    async fn embed_passes_through_dummy() {
        let embedder =
            Embedder::new(EmbeddingProvider::Dummy(DummyEmbedding::new(16)), &config(16));
        let v = embedder.embed("tazminat davası").await.expect("embed");
        assert_eq!(v.len(), 16);
        assert_eq!(embedder.dimension(), 16);
    }

    #[tokio::test]
    async fn unavailable_is_not_retried() {
        let embedder = Embedder::new(EmbeddingProvider::Unavailable, &config(16));
        assert!(!embedder.is_available());
        let start = std::time::Instant::now();
        let err = embedder.embed("metin").await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable));
        // No backoff sleeps on the unavailable path.
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn concurrent_embeds_share_the_semaphore() {
        let embedder =
            Embedder::new(EmbeddingProvider::Dummy(DummyEmbedding::new(8)), &config(8));
        let mut handles = Vec::new();
        for i in 0..8 {
            let e = embedder.clone();
            handles.push(tokio::spawn(async move { e.embed(&format!("metin {i}")).await }));
        }
        for h in handles {
            assert!(h.await.expect("join").is_ok());
        }
    }
}
