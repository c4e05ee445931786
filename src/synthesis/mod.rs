//! Deduplication and composite ranking of merged findings.
//!
//! Findings from agents or communities are deduplicated by node (maximum
//! relevance wins, contributing sources accumulate) and ranked by
//! `α·relevance + β·centrality`, where centrality is the node's incident
//! edge count normalised to the maximum within the result set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::{GraphStore, NodeId};

/// One raw retrieval finding before synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub node_id: NodeId,
    pub source_agent: String,
    pub relevance: f32,
}

/// A deduplicated, composite-scored finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedFinding {
    pub node_id: NodeId,
    /// All agents/communities that surfaced this node, ascending.
    pub sources: Vec<String>,
    /// Best relevance any source reported.
    pub relevance: f32,
    /// Incident-edge count normalised to `[0, 1]` within the result set.
    pub centrality: f32,
    /// `α·relevance + β·centrality`.
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub findings: Vec<RankedFinding>,
    /// Mean composite score of the returned findings; 0 when empty.
    pub confidence: f32,
}

/// Merge, dedupe, score, and rank `findings`, returning at most `top_k`.
pub fn synthesize(
    store: &GraphStore,
    findings: Vec<Finding>,
    alpha: f32,
    beta: f32,
    top_k: usize,
) -> Synthesis {
    // node -> (max relevance, sorted source set)
    let mut merged: BTreeMap<NodeId, (f32, std::collections::BTreeSet<String>)> = BTreeMap::new();
    for f in findings {
        let entry = merged.entry(f.node_id).or_insert((f.relevance, Default::default()));
        if f.relevance > entry.0 {
            entry.0 = f.relevance;
        }
        entry.1.insert(f.source_agent);
    }

    let raw_centrality: BTreeMap<&NodeId, usize> =
        merged.keys().map(|id| (id, store.incident_count(id))).collect();
    let max_centrality = raw_centrality.values().copied().max().unwrap_or(0);

    let mut ranked: Vec<RankedFinding> = merged
        .iter()
        .map(|(id, (relevance, sources))| {
            let centrality = if max_centrality == 0 {
                0.0
            } else {
                raw_centrality[id] as f32 / max_centrality as f32
            };
            RankedFinding {
                node_id: id.clone(),
                sources: sources.iter().cloned().collect(),
                relevance: *relevance,
                centrality,
                score: alpha * relevance + beta * centrality,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.node_id.cmp(&b.node_id)));
    ranked.truncate(top_k);

    let confidence = if ranked.is_empty() {
        0.0
    } else {
        ranked.iter().map(|f| f.score).sum::<f32>() / ranked.len() as f32
    };
    Synthesis { findings: ranked, confidence }
}
