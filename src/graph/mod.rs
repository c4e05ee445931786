//! Typed legal knowledge graph: data model and in-memory store.

pub mod store;
pub mod types;

pub use store::{Direction, GraphBackend, GraphStore, Relationship};
pub use types::{Edge, EdgeType, Node, NodeId, NodeType, node_id_for, now_iso8601};
