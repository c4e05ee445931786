//! Engine-wide error types.
//!
//! The taxonomy is small and deliberate: validation and lookup failures are
//! returned to the caller immediately and never retried; provider failures
//! are retried locally (see [`crate::providers::Embedder`]) before they
//! surface here; agent-level timeouts are absorbed into degraded findings and
//! only become an `EngineError` when every agent fails.

use thiserror::Error;

use crate::providers::ProviderError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed ingestion input, wrong embedding dimension, or an edge
    /// referencing a node that does not exist.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown node ID.
    #[error("not found: {0}")]
    NotFound(String),

    /// An embedding or completion call exhausted its retries, or every
    /// retrieval agent failed in the same orchestrated call.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A traversal or orchestrated call exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn validation_error_display() {
        let e = EngineError::Validation("empty law name".into());
        assert!(e.to_string().contains("empty law name"));
        assert!(e.to_string().starts_with("validation error"));
    }

    #[test]
    fn not_found_display() {
        let e = EngineError::NotFound("node abc123".into());
        assert!(e.to_string().contains("abc123"));
    }

    #[test]
    fn provider_error_converts() {
        let e: EngineError = ProviderError::Unavailable.into();
        assert!(matches!(e, EngineError::Provider(_)));
        let _: &dyn Error = &e;
    }
}
