//! Keyword and embedding indexes over graph nodes.
//!
//! The index is a derived projection of [`crate::graph::GraphStore`] content
//! and is kept consistent synchronously: every node insert or update
//! re-indexes the node's text before the write is acknowledged.

use std::collections::{BTreeSet, HashMap};

use crate::error::EngineError;
use crate::graph::NodeId;

/// Lowercased tokens of `text`, split on whitespace and punctuation.
/// Unicode letters (ç, ş, ö…) are kept, so Turkish legal vocabulary
/// tokenizes cleanly.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[derive(Debug)]
pub struct IndexEngine {
    /// token -> set of node IDs whose text contains the token.
    postings: HashMap<String, BTreeSet<NodeId>>,
    /// Reverse map used to drop stale postings on re-index.
    node_tokens: HashMap<NodeId, BTreeSet<String>>,
    embeddings: HashMap<NodeId, Vec<f32>>,
    dimension: usize,
}

impl IndexEngine {
    /// `dimension` fixes the embedding length for the engine's lifetime.
    pub fn new(dimension: usize) -> Self {
        Self {
            postings: HashMap::new(),
            node_tokens: HashMap::new(),
            embeddings: HashMap::new(),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// (Re-)index a node's text. Prior postings for the node are removed
    /// first so the index never holds stale entries.
    pub fn index_node(&mut self, id: &str, text: &str) {
        if let Some(old_tokens) = self.node_tokens.remove(id) {
            for token in old_tokens {
                if let Some(set) = self.postings.get_mut(&token) {
                    set.remove(id);
                    if set.is_empty() {
                        self.postings.remove(&token);
                    }
                }
            }
        }
        let tokens: BTreeSet<String> = tokenize(text).into_iter().collect();
        for token in &tokens {
            self.postings.entry(token.clone()).or_default().insert(id.to_string());
        }
        if !tokens.is_empty() {
            self.node_tokens.insert(id.to_string(), tokens);
        }
    }

    /// Nodes whose token set contains `term`, ascending by ID, capped at
    /// `limit`. Callers rank; the index only matches.
    pub fn search(&self, term: &str, limit: usize) -> Vec<NodeId> {
        let term = term.to_lowercase();
        self.postings
            .get(&term)
            .map(|set| set.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// First `n` indexed tokens of a node, ascending. Used as fallback
    /// exchange terms when a finding has no title.
    pub fn node_token_prefix(&self, id: &str, n: usize) -> Vec<String> {
        self.node_tokens
            .get(id)
            .map(|tokens| tokens.iter().take(n).cloned().collect())
            .unwrap_or_default()
    }

    /// Store a node's embedding. The vector must match the engine dimension.
    pub fn embed_node(&mut self, id: &str, vector: Vec<f32>) -> Result<(), EngineError> {
        if vector.len() != self.dimension {
            return Err(EngineError::Validation(format!(
                "embedding dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        self.embeddings.insert(id.to_string(), vector);
        Ok(())
    }

    pub fn embedding(&self, id: &str) -> Option<&Vec<f32>> {
        self.embeddings.get(id)
    }

    /// Drop a node's vector, used when its text changed and the stored
    /// embedding no longer describes it.
    pub fn remove_embedding(&mut self, id: &str) {
        self.embeddings.remove(id);
    }

    /// All `(node, vector)` pairs, ascending by node ID for deterministic
    /// scan order.
    pub fn embeddings(&self) -> Vec<(&NodeId, &Vec<f32>)> {
        let mut all: Vec<_> = self.embeddings.iter().collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }

    pub fn token_count(&self) -> usize {
        self.postings.len()
    }
}
