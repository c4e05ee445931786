//! Embedding-based nearest-neighbour search with graph-context re-ranking.
//!
//! A linear scan over every indexed node vector is fine at this engine's
//! scale; swapping in an approximate index would not change the contract.
//! The final score blends cosine similarity with the node's normalised
//! incident-edge count, so well-connected nodes outrank isolated ones at
//! equal semantic distance.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::GraphState;
use crate::error::EngineError;
use crate::graph::{Node, NodeId};

/// Why a hit ranked where it did: its connectivity at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeContext {
    /// Incident edge count.
    pub relationships: usize,
    /// IDs on the far side of those edges, ascending, deduplicated.
    pub related: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticHit {
    pub node: Node,
    /// Blended final score: `α·cosine + β·graph context`.
    pub score: f32,
    pub cosine: f32,
    pub context: NodeContext,
}

/// Cosine similarity; 0 for zero-norm vectors.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Scan all indexed vectors against `query_vector` and re-rank.
///
/// Centrality is normalised over the scanned candidate set, mirroring the
/// synthesis ranking. Results are filtered to `final score ≥ min_score` and
/// ordered score-descending with node-ID ascending tie-breaks.
pub fn search_vectors(
    state: &GraphState,
    query_vector: &[f32],
    limit: usize,
    min_score: f32,
    alpha: f32,
    beta: f32,
) -> Result<Vec<SemanticHit>, EngineError> {
    if query_vector.len() != state.index.dimension() {
        return Err(EngineError::Validation(format!(
            "query embedding dimension {} does not match index dimension {}",
            query_vector.len(),
            state.index.dimension()
        )));
    }

    let candidates = state.index.embeddings();
    let max_centrality = candidates
        .iter()
        .map(|(id, _)| state.store.incident_count(id))
        .max()
        .unwrap_or(0);

    let mut hits: Vec<SemanticHit> = Vec::new();
    for (id, vector) in candidates {
        let node = match state.store.get_node(id) {
            Ok(n) => n,
            Err(_) => continue,
        };
        let relationships = state.store.incident_count(id);
        let graph_context = if max_centrality == 0 {
            0.0
        } else {
            relationships as f32 / max_centrality as f32
        };
        let cos = cosine(query_vector, vector);
        let score = alpha * cos + beta * graph_context;
        if score < min_score {
            continue;
        }
        let mut related: Vec<NodeId> = state
            .store
            .neighbors(id, None, None)
            .iter()
            .map(|r| r.other().clone())
            .collect();
        related.sort();
        related.dedup();
        hits.push(SemanticHit {
            node: node.clone(),
            score,
            cosine: cos,
            context: NodeContext { relationships, related },
        });
    }

    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.node.id.cmp(&b.node.id)));
    hits.truncate(limit);
    debug!(hits = hits.len(), "semantic scan done");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeType, Node, NodeType};

    /// Two-dimensional index with hand-placed vectors for exact cosines.
    fn planar_state() -> (GraphState, NodeId, NodeId, NodeId) {
        let mut state = GraphState::new(2);
        let a = state
            .upsert_indexed(Node::new(NodeType::Article, "A", "birinci madde"))
            .expect("a");
        let b = state
            .upsert_indexed(Node::new(NodeType::Article, "B", "ikinci madde"))
            .expect("b");
        let c = state
            .upsert_indexed(Node::new(NodeType::Case, "C", "ilgili dava"))
            .expect("c");
        state.index.embed_node(&a, vec![1.0, 0.0]).expect("ea");
        state.index.embed_node(&b, vec![0.0, 1.0]).expect("eb");
        state.index.embed_node(&c, vec![1.0, 1.0]).expect("ec");
        state.store.add_edge(&c, &a, EdgeType::Cites).expect("edge");
        (state, a, b, c)
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0, "zero vector similarity is 0");
    }

    #[test]
    fn dimension_mismatch_is_validation_error() {
        let (state, _, _, _) = planar_state();
        let err = search_vectors(&state, &[1.0, 0.0, 0.0], 10, 0.0, 0.7, 0.3).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn blended_score_prefers_connected_nodes() {
        let (state, a, b, _) = planar_state();
        // Query aligned with A; A also carries the only edges besides C.
        let hits = search_vectors(&state, &[1.0, 0.0], 10, 0.0, 0.7, 0.3).expect("hits");
        assert_eq!(hits[0].node.id, a);
        assert!((hits[0].cosine - 1.0).abs() < 1e-6);
        assert!((hits[0].score - 1.0).abs() < 1e-6, "α·1 + β·1 for the connected exact match");
        let b_hit = hits.iter().find(|h| h.node.id == b).expect("b scanned");
        assert_eq!(b_hit.context.relationships, 0);
        assert!(b_hit.score.abs() < 1e-6);
    }

    #[test]
    fn min_score_filters_and_limit_caps() {
        let (state, _, _, _) = planar_state();
        let all = search_vectors(&state, &[1.0, 0.0], 10, 0.0, 0.7, 0.3).expect("all");
        assert_eq!(all.len(), 3);
        let filtered = search_vectors(&state, &[1.0, 0.0], 10, 0.5, 0.7, 0.3).expect("filtered");
        assert!(filtered.len() < all.len());
        assert!(filtered.iter().all(|h| h.score >= 0.5));
        let capped = search_vectors(&state, &[1.0, 0.0], 1, 0.0, 0.7, 0.3).expect("capped");
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn context_lists_related_nodes() {
        let (state, a, _, c) = planar_state();
        let hits = search_vectors(&state, &[1.0, 1.0], 10, 0.0, 0.7, 0.3).expect("hits");
        let a_hit = hits.iter().find(|h| h.node.id == a).expect("a");
        assert_eq!(a_hit.context.related, vec![c.clone()]);
        let c_hit = hits.iter().find(|h| h.node.id == c).expect("c");
        assert_eq!(c_hit.context.related, vec![a.clone()]);
    }

    #[test]
    fn ordering_is_deterministic() {
        let (state, _, _, _) = planar_state();
        let x = search_vectors(&state, &[0.6, 0.8], 10, 0.0, 0.7, 0.3).expect("x");
        let y = search_vectors(&state, &[0.6, 0.8], 10, 0.0, 0.7, 0.3).expect("y");
        let ids = |hits: &[SemanticHit]| hits.iter().map(|h| h.node.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&x), ids(&y));
    }
}
