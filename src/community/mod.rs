//! Query-scoped subgraph construction and community detection.
//!
//! A subgraph is collected by BFS from the query's lexical seeds; communities
//! are its connected components (deterministic union-find over edges in
//! insertion order), filtered by a minimum internal edge density. Components
//! below the density threshold are discarded as noise.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{Edge, GraphStore, NodeId};
use crate::index::IndexEngine;
use crate::traversal::seed_scores;

/// A query-scoped slice of the graph. `nodes` is in first-discovery order,
/// which fixes community numbering.
#[derive(Debug, Clone)]
pub struct Subgraph {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<Edge>,
}

/// A densely connected cluster of the subgraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: usize,
    /// Member nodes in subgraph discovery order.
    pub nodes: Vec<NodeId>,
    /// Internal edges over possible undirected pairs; 0 for singletons.
    pub density: f32,
}

/// BFS from the query's seed nodes up to `depth` hops, collecting visited
/// nodes and every stored edge between them.
pub fn build_query_subgraph(
    store: &GraphStore,
    index: &IndexEngine,
    query: &str,
    depth: usize,
) -> Subgraph {
    use std::collections::{HashSet, VecDeque};

    let seeds = seed_scores(index, query, None);
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut order: Vec<NodeId> = Vec::new();
    let mut frontier: VecDeque<(NodeId, usize)> = VecDeque::new();

    for seed in seeds.keys() {
        if visited.insert(seed.clone()) {
            order.push(seed.clone());
            frontier.push_back((seed.clone(), 0));
        }
    }
    while let Some((id, d)) = frontier.pop_front() {
        if d >= depth {
            continue;
        }
        for (neighbour, _) in store.adjacent_ids(&id) {
            if visited.insert(neighbour.clone()) {
                order.push(neighbour.clone());
                frontier.push_back((neighbour, d + 1));
            }
        }
    }

    let edges: Vec<Edge> = store
        .edges()
        .iter()
        .filter(|e| visited.contains(&e.from) && visited.contains(&e.to))
        .cloned()
        .collect();
    debug!(query, nodes = order.len(), edges = edges.len(), "query subgraph built");
    Subgraph { nodes: order, edges }
}

/// Partition `subgraph` into connected components and keep those whose
/// density clears `min_density`. IDs are assigned in order of each kept
/// component's first-discovered node.
pub fn detect_communities(subgraph: &Subgraph, min_density: f32) -> Vec<Community> {
    use std::collections::HashMap;

    let position: HashMap<&str, usize> =
        subgraph.nodes.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
    let mut uf = UnionFind::new(subgraph.nodes.len());
    for edge in &subgraph.edges {
        if let (Some(&a), Some(&b)) = (position.get(edge.from.as_str()), position.get(edge.to.as_str())) {
            uf.union(a, b);
        }
    }

    // Group member positions by root, keyed by the smallest position so the
    // grouping order follows first node discovery.
    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..subgraph.nodes.len() {
        members.entry(uf.find(i)).or_default().push(i);
    }
    let mut components: Vec<Vec<usize>> = members.into_values().collect();
    components.sort_by_key(|m| m[0]);

    let mut communities = Vec::new();
    for member_positions in components {
        let n = member_positions.len();
        let internal_edges = if n < 2 {
            0
        } else {
            let set: std::collections::HashSet<usize> = member_positions.iter().copied().collect();
            subgraph
                .edges
                .iter()
                .filter(|e| {
                    position.get(e.from.as_str()).is_some_and(|p| set.contains(p))
                        && position.get(e.to.as_str()).is_some_and(|p| set.contains(p))
                })
                .count()
        };
        let density = if n < 2 {
            0.0
        } else {
            internal_edges as f32 / (n * (n - 1) / 2) as f32
        };
        if density < min_density {
            continue;
        }
        communities.push(Community {
            id: communities.len(),
            nodes: member_positions.iter().map(|&p| subgraph.nodes[p].clone()).collect(),
            density,
        });
    }
    debug!(communities = communities.len(), "community detection done");
    communities
}

/// A representative multi-hop path through one community, reported alongside
/// the community itself for explainability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityPath {
    pub community_id: usize,
    /// Hub first, most distant member last.
    pub path: Vec<NodeId>,
    /// `decay^(hops)` for the path's hop count.
    pub score: f32,
}

/// The community's longest shortest-path from its best-connected member.
///
/// The hub is the member with the most incident edges (earliest-discovered
/// wins ties); BFS restricted to the community then keeps the first deepest
/// path reached under the deterministic expansion order.
pub fn representative_path(
    store: &GraphStore,
    community: &Community,
    decay: f32,
) -> CommunityPath {
    use std::collections::{HashMap, HashSet, VecDeque};

    let members: HashSet<&str> = community.nodes.iter().map(|n| n.as_str()).collect();
    // Strictly-greater comparison keeps the earliest-discovered member on ties.
    let hub = community
        .nodes
        .iter()
        .fold(None::<(&NodeId, usize)>, |best, id| {
            let count = store.incident_count(id);
            match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((id, count)),
            }
        })
        .map(|(id, _)| id.clone())
        .unwrap_or_default();

    let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
    let mut depth_of: HashMap<NodeId, usize> = HashMap::new();
    let mut frontier: VecDeque<(NodeId, usize)> = VecDeque::new();
    depth_of.insert(hub.clone(), 0);
    frontier.push_back((hub.clone(), 0));
    let mut deepest = (hub.clone(), 0usize);

    while let Some((id, d)) = frontier.pop_front() {
        if d > deepest.1 {
            deepest = (id.clone(), d);
        }
        for (neighbour, _) in store.adjacent_ids(&id) {
            if !members.contains(neighbour.as_str()) || depth_of.contains_key(&neighbour) {
                continue;
            }
            depth_of.insert(neighbour.clone(), d + 1);
            parent.insert(neighbour.clone(), id.clone());
            frontier.push_back((neighbour, d + 1));
        }
    }

    let mut path = vec![deepest.0.clone()];
    let mut cursor = deepest.0;
    while let Some(prev) = parent.get(&cursor) {
        path.push(prev.clone());
        cursor = prev.clone();
    }
    path.reverse();
    CommunityPath {
        community_id: community.id,
        score: decay.powi(deepest.1 as i32),
        path,
    }
}

/// Plain union-find with path compression; union by smaller root index keeps
/// the representative deterministic.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        // Lower index wins as root.
        if ra < rb {
            self.parent[rb] = ra;
        } else {
            self.parent[ra] = rb;
        }
    }
}
