//! Bounded multi-hop traversal for precedent discovery.
//!
//! Seeds come from the inverted index (one lookup per query term, union of
//! postings). Each seed carries a lexical score — the fraction of distinct
//! query terms its text matches — and relevance decays multiplicatively per
//! hop. A node's final score is the maximum over all paths reaching it, with
//! the shortest such path recorded for explainability.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{GraphStore, Node, NodeId, NodeType};
use crate::index::{IndexEngine, tokenize};

/// Bounds and scoring knobs for one traversal call.
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    pub max_depth: usize,
    pub min_similarity: f32,
    pub limit: usize,
    /// Per-hop relevance decay factor in `(0, 1]`.
    pub decay: f32,
    /// When set, seeds and expansion are restricted to these node types.
    pub allowed_types: Option<Vec<NodeType>>,
}

/// One ranked traversal hit: the node, the shortest best-scoring path from a
/// seed (seed first, node last), and the decayed relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecedentMatch {
    pub node: Node,
    pub path: Vec<NodeId>,
    pub score: f32,
}

/// Lexical seed scores for `query`: node -> fraction of distinct query terms
/// whose posting set contains the node. Ascending by node ID.
pub fn seed_scores(
    index: &IndexEngine,
    query: &str,
    allowed: Option<&HashSet<NodeId>>,
) -> BTreeMap<NodeId, f32> {
    let terms: Vec<String> = {
        let mut t = tokenize(query);
        t.sort();
        t.dedup();
        t
    };
    let mut matched: BTreeMap<NodeId, usize> = BTreeMap::new();
    for term in &terms {
        for id in index.search(term, usize::MAX) {
            if allowed.is_some_and(|set| !set.contains(&id)) {
                continue;
            }
            *matched.entry(id).or_insert(0) += 1;
        }
    }
    let total = terms.len().max(1) as f32;
    matched.into_iter().map(|(id, n)| (id, n as f32 / total)).collect()
}

/// Breadth-first precedent search per the ranking contract: score descending,
/// then path length ascending, then node ID ascending.
pub fn find_precedents(
    store: &GraphStore,
    index: &IndexEngine,
    query: &str,
    opts: &TraversalOptions,
) -> Vec<PrecedentMatch> {
    let allowed: Option<HashSet<NodeId>> = opts
        .allowed_types
        .as_ref()
        .map(|types| store.ids_of_types(types).into_iter().collect());
    let seeds = seed_scores(index, query, allowed.as_ref());
    debug!(query, seeds = seeds.len(), max_depth = opts.max_depth, "traversal start");

    // node -> (best score, shortest path achieving it)
    let mut best: BTreeMap<NodeId, (f32, Vec<NodeId>)> = BTreeMap::new();

    // Seeds expand in ascending ID order and neighbours in ascending
    // (NodeId, EdgeType) order, so equal (score, length) candidates always
    // resolve to the same path.
    for (seed_id, seed_score) in &seeds {
        let mut visited: HashSet<NodeId> = HashSet::new();
        visited.insert(seed_id.clone());
        let mut frontier: VecDeque<(NodeId, usize, Vec<NodeId>)> = VecDeque::new();
        frontier.push_back((seed_id.clone(), 0, vec![seed_id.clone()]));

        while let Some((node_id, depth, path)) = frontier.pop_front() {
            let score = seed_score * opts.decay.powi(depth as i32);
            record(&mut best, &node_id, score, &path);

            if depth >= opts.max_depth {
                continue;
            }
            for (neighbour, _edge_type) in store.adjacent_ids(&node_id) {
                if visited.contains(&neighbour) {
                    continue;
                }
                if allowed.as_ref().is_some_and(|set| !set.contains(&neighbour)) {
                    continue;
                }
                visited.insert(neighbour.clone());
                let mut next_path = path.clone();
                next_path.push(neighbour.clone());
                frontier.push_back((neighbour, depth + 1, next_path));
            }
        }
    }

    let mut results: Vec<PrecedentMatch> = best
        .into_iter()
        .filter(|(_, (score, _))| *score >= opts.min_similarity)
        .filter_map(|(id, (score, path))| {
            store.get_node(&id).ok().map(|node| PrecedentMatch { node: node.clone(), path, score })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.path.len().cmp(&b.path.len()))
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    results.truncate(opts.limit);
    debug!(results = results.len(), "traversal done");
    results
}

/// Keep the maximum score per node; on equal score keep the shorter path.
/// First writer wins full ties, which is the lexicographically first path
/// given the deterministic expansion order.
fn record(best: &mut BTreeMap<NodeId, (f32, Vec<NodeId>)>, id: &str, score: f32, path: &[NodeId]) {
    match best.get_mut(id) {
        None => {
            best.insert(id.to_string(), (score, path.to_vec()));
        }
        Some((existing_score, existing_path)) => {
            if score > *existing_score
                || (score == *existing_score && path.len() < existing_path.len())
            {
                *existing_score = score;
                *existing_path = path.to_vec();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeType, Node};

    fn opts(max_depth: usize, min_similarity: f32) -> TraversalOptions {
        TraversalOptions { max_depth, min_similarity, limit: 20, decay: 0.85, allowed_types: None }
    }

    /// seed("kira sözleşmesi") — A cites B cites C; only A matches the query.
    fn chain() -> (GraphStore, IndexEngine, NodeId, NodeId, NodeId) {
        let mut store = GraphStore::new();
        let mut index = IndexEngine::new(4);
        let a = store
            .upsert_node(Node::new(NodeType::Article, "TBK#299", "kira sözleşmesi tanımı"))
            .expect("a");
        let b = store
            .upsert_node(Node::new(NodeType::Case, "YARG-2023-10", "fesih davası kararı"))
            .expect("b");
        let c = store
            .upsert_node(Node::new(NodeType::Precedent, "YARG-2020-4", "emsal nitelikli karar"))
            .expect("c");
        for node in [&a, &b, &c] {
            let text = store.get_node(node).expect("node").text.clone();
            index.index_node(node, &text);
        }
        store.add_edge(&b, &a, EdgeType::Cites).expect("ba");
        store.add_edge(&c, &b, EdgeType::EmsalKarar).expect("cb");
        (store, index, a, b, c)
    }

    #[test]
    fn seed_score_is_fraction_of_terms_matched() {
        let (_, index, a, _, _) = chain();
        let seeds = seed_scores(&index, "kira sözleşmesi", None);
        assert_eq!(seeds.get(&a).copied(), Some(1.0));
        let seeds = seed_scores(&index, "kira davası", None);
        assert_eq!(seeds.get(&a).copied(), Some(0.5));
    }

    #[test]
    fn two_hop_decay_matches_contract() {
        let (store, index, a, b, c) = chain();
        let results = find_precedents(&store, &index, "kira sözleşmesi", &opts(2, 0.3));
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].node.id, a);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[1].node.id, b);
        assert!((results[1].score - 0.85).abs() < 1e-6);
        assert_eq!(results[2].node.id, c);
        assert!((results[2].score - 0.7225).abs() < 1e-6, "two hops decay to 1.0×0.85×0.85");
        assert_eq!(results[2].path, vec![a, b, c]);
    }

    #[test]
    fn min_similarity_filters_and_depth_bounds() {
        let (store, index, _, _, c) = chain();
        let shallow = find_precedents(&store, &index, "kira sözleşmesi", &opts(1, 0.3));
        assert!(shallow.iter().all(|r| r.node.id != c), "depth 1 must not reach 2-hop node");
        let strict = find_precedents(&store, &index, "kira sözleşmesi", &opts(2, 0.9));
        assert_eq!(strict.len(), 1);
    }

    #[test]
    fn score_is_max_over_paths_not_sum() {
        // Two seeds both reaching X: X keeps the single best decayed score.
        let mut store = GraphStore::new();
        let mut index = IndexEngine::new(4);
        let s1 = store.upsert_node(Node::new(NodeType::Article, "S1", "kira madde")).expect("s1");
        let s2 = store.upsert_node(Node::new(NodeType::Article, "S2", "kira hüküm")).expect("s2");
        let x = store.upsert_node(Node::new(NodeType::Case, "X", "bağlantılı dava")).expect("x");
        for id in [&s1, &s2, &x] {
            let text = store.get_node(id).expect("node").text.clone();
            index.index_node(id, &text);
        }
        store.add_edge(&s1, &x, EdgeType::Cites).expect("s1x");
        store.add_edge(&s2, &x, EdgeType::Cites).expect("s2x");

        let results = find_precedents(&store, &index, "kira", &opts(2, 0.0));
        let hit = results.iter().find(|r| r.node.id == x).expect("x reachable");
        assert!((hit.score - 0.85).abs() < 1e-6, "max across paths, not 0.85 + 0.85");
        assert_eq!(hit.path.len(), 2);
    }

    #[test]
    fn ranking_is_deterministic_across_runs() {
        let (store, index, _, _, _) = chain();
        let first = find_precedents(&store, &index, "kira sözleşmesi karar", &opts(2, 0.0));
        let second = find_precedents(&store, &index, "kira sözleşmesi karar", &opts(2, 0.0));
        let ids_a: Vec<_> = first.iter().map(|r| (&r.node.id, r.score)).collect();
        let ids_b: Vec<_> = second.iter().map(|r| (&r.node.id, r.score)).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn partition_restriction_excludes_other_types() {
        let (store, index, a, b, c) = chain();
        let mut o = opts(2, 0.0);
        o.allowed_types = Some(vec![NodeType::Article]);
        let results = find_precedents(&store, &index, "kira sözleşmesi", &o);
        assert!(results.iter().any(|r| r.node.id == a));
        assert!(results.iter().all(|r| r.node.id != b && r.node.id != c));
    }
}
