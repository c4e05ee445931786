//! In-memory graph store.
//!
//! `GraphStore` exclusively owns node and edge storage. The keyword and
//! embedding indexes ([`crate::index::IndexEngine`]) hold a derived
//! projection and are never authoritative. The store is append/merge-only:
//! nodes are created or attribute-merged on upsert, edges deduplicate on
//! `(from, to, type)`, and nothing is ever deleted.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

use super::types::{Edge, EdgeType, Node, NodeId, NodeType, node_id_for, now_iso8601};

/// Orientation of an edge relative to the node it was looked up from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// An edge seen from one endpoint, as returned by [`GraphStore::neighbors`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub direction: Direction,
}

impl Relationship {
    /// The endpoint on the far side of the relationship.
    pub fn other(&self) -> &NodeId {
        match self.direction {
            Direction::Outgoing => &self.to,
            Direction::Incoming => &self.from,
        }
    }
}

/// Storage seam for swapping in an external graph database.
///
/// Satisfied by the in-memory [`crate::engine::GraphState`]; an adapter for a
/// durable backend implements the same four operations.
pub trait GraphBackend {
    fn upsert_node(&mut self, node: Node) -> Result<NodeId, EngineError>;
    fn add_edge(&mut self, from: &str, to: &str, edge_type: EdgeType) -> Result<bool, EngineError>;
    fn neighbors(
        &self,
        id: &str,
        edge_type: Option<EdgeType>,
        direction: Option<Direction>,
    ) -> Vec<Relationship>;
    fn search_by_token(&self, term: &str, limit: usize) -> Vec<NodeId>;
}

#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: HashMap<NodeId, Node>,
    by_natural_key: HashMap<String, NodeId>,
    edges: Vec<Edge>,
    edge_keys: HashSet<(NodeId, NodeId, EdgeType)>,
    /// Undirected adjacency used by traversal: both endpoints see the edge.
    adjacency: HashMap<NodeId, Vec<(NodeId, EdgeType)>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Write path ────────────────────────────────────────────────────────

    /// Insert a node, or merge it into the existing node with the same
    /// natural key.
    ///
    /// Merging is key-by-key over the attribute map with new values winning.
    /// Non-empty incoming text replaces the stored text and invalidates any
    /// stale embedding. `created_at` of the original node is kept.
    pub fn upsert_node(&mut self, node: Node) -> Result<NodeId, EngineError> {
        if node.natural_key.is_empty() {
            return Err(EngineError::Validation("node natural_key must not be empty".into()));
        }
        // IDs are derived, never trusted from the caller.
        let id = node_id_for(&node.natural_key);

        if let Some(existing_id) = self.by_natural_key.get(&node.natural_key) {
            let existing = self
                .nodes
                .get_mut(existing_id)
                .ok_or_else(|| EngineError::NotFound(format!("node {existing_id}")))?;
            for (k, v) in node.attributes {
                existing.attributes.insert(k, v);
            }
            if !node.text.is_empty() && node.text != existing.text {
                existing.text = node.text;
                existing.embedding = None;
            }
            return Ok(existing_id.clone());
        }

        let mut node = node;
        node.id = id.clone();
        self.by_natural_key.insert(node.natural_key.clone(), id.clone());
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Add a directed edge. Returns `false` when the identical
    /// `(from, to, type)` edge already exists (the call is a no-op).
    pub fn add_edge(&mut self, from: &str, to: &str, edge_type: EdgeType) -> Result<bool, EngineError> {
        if !self.nodes.contains_key(from) {
            return Err(EngineError::Validation(format!("edge endpoint {from} does not exist")));
        }
        if !self.nodes.contains_key(to) {
            return Err(EngineError::Validation(format!("edge endpoint {to} does not exist")));
        }
        let key = (from.to_string(), to.to_string(), edge_type);
        if !self.edge_keys.insert(key) {
            return Ok(false);
        }
        self.edges.push(Edge {
            from: from.to_string(),
            to: to.to_string(),
            edge_type,
            created_at: now_iso8601(),
        });
        self.adjacency
            .entry(from.to_string())
            .or_default()
            .push((to.to_string(), edge_type));
        if from != to {
            self.adjacency
                .entry(to.to_string())
                .or_default()
                .push((from.to_string(), edge_type));
        }
        Ok(true)
    }

    // ── Read path ─────────────────────────────────────────────────────────

    pub fn get_node(&self, id: &str) -> Result<&Node, EngineError> {
        self.nodes.get(id).ok_or_else(|| EngineError::NotFound(format!("node {id}")))
    }

    pub fn get_node_mut(&mut self, id: &str) -> Result<&mut Node, EngineError> {
        self.nodes.get_mut(id).ok_or_else(|| EngineError::NotFound(format!("node {id}")))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All edges incident to `id`, optionally filtered by type and direction.
    pub fn neighbors(
        &self,
        id: &str,
        edge_type: Option<EdgeType>,
        direction: Option<Direction>,
    ) -> Vec<Relationship> {
        self.edges
            .iter()
            .filter_map(|e| {
                let dir = if e.from == id {
                    Direction::Outgoing
                } else if e.to == id {
                    Direction::Incoming
                } else {
                    return None;
                };
                if edge_type.is_some_and(|t| t != e.edge_type) {
                    return None;
                }
                if direction.is_some_and(|d| d != dir) {
                    return None;
                }
                Some(Relationship {
                    from: e.from.clone(),
                    to: e.to.clone(),
                    edge_type: e.edge_type,
                    direction: dir,
                })
            })
            .collect()
    }

    /// Undirected neighbour IDs in ascending `(NodeId, EdgeType)` order.
    /// Traversal relies on this ordering for deterministic path choice.
    pub fn adjacent_ids(&self, id: &str) -> Vec<(NodeId, EdgeType)> {
        let mut out = self.adjacency.get(id).cloned().unwrap_or_default();
        out.sort();
        out.dedup();
        out
    }

    /// Number of incident edges; the raw centrality used by the rankers.
    pub fn incident_count(&self, id: &str) -> usize {
        self.edges.iter().filter(|e| e.from == id || e.to == id).count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Per-type node counts keyed by the display name (`"LAW"`, `"ARTICLE"`…).
    pub fn node_type_counts(&self) -> std::collections::BTreeMap<String, usize> {
        let mut counts = std::collections::BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.node_type.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn edge_type_counts(&self) -> std::collections::BTreeMap<String, usize> {
        let mut counts = std::collections::BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.edge_type.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Invariant check: every edge endpoint resolves to a stored node.
    /// Cheap enough to assert after ingestion in tests.
    pub fn has_dangling_edges(&self) -> bool {
        self.edges
            .iter()
            .any(|e| !self.nodes.contains_key(&e.from) || !self.nodes.contains_key(&e.to))
    }

    /// IDs of nodes whose type is in `types`, ascending. Used to scope a
    /// retrieval agent to its partition.
    pub fn ids_of_types(&self, types: &[NodeType]) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| types.contains(&n.node_type))
            .map(|n| n.id.clone())
            .collect();
        ids.sort();
        ids
    }
}
