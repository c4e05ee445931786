//! Deterministic offline providers.
//!
//! The completion half echoes its prompt; the embedding half derives a unit
//! vector from `sha256(text)` so the same text always embeds identically.
//! Both exist so the full engine can be exercised without network access.

use sha2::{Digest, Sha256};

use super::ProviderError;

#[derive(Debug, Clone)]
pub struct DummyCompletion;

impl DummyCompletion {
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        Ok(format!("[echo] {prompt}"))
    }
}

#[derive(Debug, Clone)]
pub struct DummyEmbedding {
    dimension: usize,
}

impl DummyEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Hash-derived embedding: 32 bytes of `sha256(text ‖ block)` per block,
    /// each byte mapped into `[-1, 1]`, then L2-normalised.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vector = Vec::with_capacity(self.dimension);
        let mut block: u32 = 0;
        while vector.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(block.to_be_bytes());
            let digest = hasher.finalize();
            for byte in digest.iter() {
                if vector.len() == self.dimension {
                    break;
                }
                vector.push((*byte as f32 / 255.0) * 2.0 - 1.0);
            }
            block += 1;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}
