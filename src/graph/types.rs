//! Node and edge types for the legal knowledge graph.
//!
//! Node IDs are content-derived: the first 16 hex chars of
//! `sha256(natural_key)`. The same natural key always maps to the same ID,
//! which is what makes ingestion idempotent.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque node identifier. Ordering on the hex string gives the total order
/// used for deterministic tie-breaking across every ranked result list.
pub type NodeId = String;

/// Semantic category of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Law,
    Article,
    Case,
    Judge,
    Court,
    Precedent,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeType::Law => "LAW",
            NodeType::Article => "ARTICLE",
            NodeType::Case => "CASE",
            NodeType::Judge => "JUDGE",
            NodeType::Court => "COURT",
            NodeType::Precedent => "PRECEDENT",
        };
        write!(f, "{s}")
    }
}

/// Relationship type of a directed edge.
///
/// `EmsalKarar` marks a precedent-decision link (emsal karar = precedent
/// ruling in Turkish legal usage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Contains,
    Cites,
    EmsalKarar,
    RelatedArticle,
    Overrules,
    Supports,
    ConflictsWith,
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EdgeType::Contains => "CONTAINS",
            EdgeType::Cites => "CITES",
            EdgeType::EmsalKarar => "EMSAL_KARAR",
            EdgeType::RelatedArticle => "RELATED_ARTICLE",
            EdgeType::Overrules => "OVERRULES",
            EdgeType::Supports => "SUPPORTS",
            EdgeType::ConflictsWith => "CONFLICTS_WITH",
        };
        write!(f, "{s}")
    }
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable 16-hex-char ID derived from `sha256(natural_key)`.
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Content-derived key used for upsert deduplication, e.g. `"TCK#1"`.
    pub natural_key: String,
    /// Ordered attribute map; upsert merges key-by-key, new values win.
    pub attributes: BTreeMap<String, String>,
    /// Indexable content. Re-indexed whenever the node is upserted.
    pub text: String,
    /// Fixed-dimension embedding, populated lazily by the embed pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: String,
}

impl Node {
    /// Build a node from its natural key, deriving the ID and timestamp.
    pub fn new(node_type: NodeType, natural_key: impl Into<String>, text: impl Into<String>) -> Self {
        let natural_key = natural_key.into();
        Self {
            id: node_id_for(&natural_key),
            node_type,
            natural_key,
            attributes: BTreeMap::new(),
            text: text.into(),
            embedding: None,
            created_at: now_iso8601(),
        }
    }

    /// Set one attribute, builder-style.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Human-facing label: the `title` attribute when present, the `name`
    /// attribute otherwise, falling back to the natural key.
    pub fn label(&self) -> &str {
        self.attributes
            .get("title")
            .or_else(|| self.attributes.get("name"))
            .map(|s| s.as_str())
            .unwrap_or(&self.natural_key)
    }
}

/// A directed edge. `(from, to, edge_type)` triples are unique per graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub created_at: String,
}

/// Derive a node ID from a natural key: first 16 hex chars of `sha256(key)`.
pub fn node_id_for(natural_key: &str) -> NodeId {
    let mut hasher = Sha256::new();
    hasher.update(natural_key.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Current UTC time as an RFC 3339 string with second precision, e.g.
/// `"2025-04-01T12:00:00Z"`.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
