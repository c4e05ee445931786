//! The engine facade: one explicit instance per graph.
//!
//! `Engine` owns the graph state behind a single-writer/multiple-reader lock.
//! Ingestion holds the write half for a whole document; every query path
//! takes read access only and never holds a lock across an `.await`, so
//! queries run concurrently with each other and only serialise against an
//! in-progress write.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agents::{self, AgentReport};
use crate::community::{self, Community, CommunityPath};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::{
    Direction, Edge, EdgeType, GraphBackend, GraphStore, Node, NodeId, NodeType, Relationship,
};
use crate::index::IndexEngine;
use crate::ingest::{self, BuildReport, LawDocument};
use crate::ontology::{Contradiction, Inference, Ontology};
use crate::providers::{self, CompletionProvider, Embedder, EmbeddingProvider};
use crate::semantic::{self, SemanticHit};
use crate::synthesis::{self, Finding, RankedFinding};
use crate::traversal::{self, PrecedentMatch, TraversalOptions};

/// Result cap (and confidence scope) for the synthesis-backed paths.
const SYNTHESIS_LIMIT: usize = 10;

// ── Graph state ───────────────────────────────────────────────────────────────

/// The store plus its derived indexes, locked and mutated as one unit so the
/// index is always consistent with store content.
#[derive(Debug)]
pub struct GraphState {
    pub store: GraphStore,
    pub index: IndexEngine,
}

impl GraphState {
    pub fn new(embedding_dimension: usize) -> Self {
        Self { store: GraphStore::new(), index: IndexEngine::new(embedding_dimension) }
    }

    /// Upsert a node and synchronously (re-)index its text before the write
    /// is acknowledged. An upsert that replaced the text also drops the
    /// node's now-stale vector.
    pub fn upsert_indexed(&mut self, node: Node) -> Result<NodeId, EngineError> {
        let id = self.store.upsert_node(node)?;
        let node = self.store.get_node(&id)?;
        let text = node.text.clone();
        if node.embedding.is_none() {
            self.index.remove_embedding(&id);
        }
        self.index.index_node(&id, &text);
        Ok(id)
    }
}

impl GraphBackend for GraphState {
    fn upsert_node(&mut self, node: Node) -> Result<NodeId, EngineError> {
        self.upsert_indexed(node)
    }

    fn add_edge(&mut self, from: &str, to: &str, edge_type: EdgeType) -> Result<bool, EngineError> {
        self.store.add_edge(from, to, edge_type)
    }

    fn neighbors(
        &self,
        id: &str,
        edge_type: Option<EdgeType>,
        direction: Option<Direction>,
    ) -> Vec<Relationship> {
        self.store.neighbors(id, edge_type, direction)
    }

    fn search_by_token(&self, term: &str, limit: usize) -> Vec<NodeId> {
        self.index.search(term, limit)
    }
}

// ── Result types ──────────────────────────────────────────────────────────────

/// Filters for [`Engine::query_graph`].
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub node_type: Option<NodeType>,
    pub edge_type: Option<EdgeType>,
    pub limit: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { node_type: None, edge_type: None, limit: 10 }
    }
}

/// One keyword-query hit with its incident relationships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMatch {
    pub node: Node,
    pub relationships: Vec<Relationship>,
    /// Fraction of query terms the node's text matches.
    pub relevance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiGraphRagResult {
    /// Phrased answer, absent when the completion provider is down.
    pub answer: Option<String>,
    pub agent_results: Vec<AgentReport>,
    pub findings: Vec<RankedFinding>,
    pub confidence: f32,
    /// Some agents are missing or degraded in this result.
    pub partial: bool,
    pub queries_issued: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyRagResult {
    pub answer: Option<String>,
    pub concepts: Vec<String>,
    pub inferences: Vec<Inference>,
    pub contradictions: Vec<Contradiction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRagResult {
    pub answer: Option<String>,
    pub communities: Vec<Community>,
    pub paths: Vec<CommunityPath>,
    pub findings: Vec<RankedFinding>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
    pub indexed_tokens: usize,
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct Engine {
    state: Arc<RwLock<GraphState>>,
    config: EngineConfig,
    ontology: Ontology,
    completion: CompletionProvider,
    embedder: Embedder,
}

impl Engine {
    /// Build an engine with the providers selected by config.
    /// `api_key` comes from the `LLM_API_KEY` env var — never TOML.
    pub fn new(config: EngineConfig, api_key: Option<String>) -> Result<Self, EngineError> {
        let (completion, embedding) = providers::build(&config.llm, &config.embedding, api_key)?;
        Ok(Self::with_providers(config, completion, embedding))
    }

    /// Build an engine around explicit provider instances.
    pub fn with_providers(
        config: EngineConfig,
        completion: CompletionProvider,
        embedding: EmbeddingProvider,
    ) -> Self {
        let embedder = Embedder::new(embedding, &config.embedding);
        let state = Arc::new(RwLock::new(GraphState::new(config.embedding.dimension)));
        Self { state, config, ontology: Ontology::turkish_legal(), completion, embedder }
    }

    /// Replace the default Turkish legal ontology.
    pub fn with_ontology(mut self, ontology: Ontology) -> Self {
        self.ontology = ontology;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // A poisoned lock means a writer panicked mid-ingest; the store is
    // append-only so readers continue on whatever state is there.
    fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    // ── Write path ────────────────────────────────────────────────────────

    /// Ingest one law document atomically (exclusive write section).
    pub fn build_graph(&self, doc: &LawDocument) -> Result<BuildReport, EngineError> {
        ingest::build_graph(&mut self.write(), doc)
    }

    pub fn upsert_node(&self, node: Node) -> Result<NodeId, EngineError> {
        self.write().upsert_indexed(node)
    }

    pub fn add_edge(&self, from: &str, to: &str, edge_type: EdgeType) -> Result<bool, EngineError> {
        self.write().store.add_edge(from, to, edge_type)
    }

    /// Embed every node that has text but no vector yet. Returns how many
    /// vectors were written. Provider calls run outside the lock; the write
    /// section covers only the final index update.
    pub async fn embed_pending(&self) -> Result<usize, EngineError> {
        let pending: Vec<(NodeId, String)> = {
            let state = self.read();
            state
                .store
                .nodes()
                .filter(|n| !n.text.is_empty() && state.index.embedding(&n.id).is_none())
                .map(|n| (n.id.clone(), n.text.clone()))
                .collect()
        };
        let mut vectors = Vec::with_capacity(pending.len());
        for (id, text) in pending {
            let vector = self.embedder.embed(&text).await?;
            vectors.push((id, vector));
        }
        let count = vectors.len();
        let mut state = self.write();
        for (id, vector) in vectors {
            state.index.embed_node(&id, vector.clone())?;
            if let Ok(node) = state.store.get_node_mut(&id) {
                node.embedding = Some(vector);
            }
        }
        debug!(embedded = count, "pending embeddings written");
        Ok(count)
    }

    // ── Read path ─────────────────────────────────────────────────────────

    pub fn get_node(&self, id: &str) -> Result<Node, EngineError> {
        self.read().store.get_node(id).cloned()
    }

    pub fn neighbors(
        &self,
        id: &str,
        edge_type: Option<EdgeType>,
        direction: Option<Direction>,
    ) -> Vec<Relationship> {
        self.read().store.neighbors(id, edge_type, direction)
    }

    /// Keyword lookup: IDs of nodes whose token set contains `term`.
    pub fn search(&self, term: &str, limit: usize) -> Vec<NodeId> {
        self.read().index.search(term, limit)
    }

    /// Keyword query with type filters and incident relationships attached.
    pub fn query_graph(&self, query: &str, options: &QueryOptions) -> Vec<GraphMatch> {
        let state = self.read();
        let scores = traversal::seed_scores(&state.index, query, None);
        let mut matches: Vec<GraphMatch> = scores
            .into_iter()
            .filter_map(|(id, relevance)| {
                let node = state.store.get_node(&id).ok()?;
                if options.node_type.is_some_and(|t| t != node.node_type) {
                    return None;
                }
                Some(GraphMatch {
                    node: node.clone(),
                    relationships: state.store.neighbors(&id, options.edge_type, None),
                    relevance,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.relevance.total_cmp(&a.relevance).then_with(|| a.node.id.cmp(&b.node.id))
        });
        matches.truncate(options.limit);
        matches
    }

    /// Bounded multi-hop precedent discovery (§ traversal ranking contract).
    pub fn find_precedents(
        &self,
        case_description: &str,
        max_depth: usize,
        min_similarity: f32,
        limit: usize,
    ) -> Vec<PrecedentMatch> {
        let state = self.read();
        let opts = TraversalOptions {
            max_depth,
            min_similarity,
            limit,
            decay: self.config.scoring.decay,
            allowed_types: None,
        };
        traversal::find_precedents(&state.store, &state.index, case_description, &opts)
    }

    /// Concurrent multi-agent retrieval with an optional exchange round.
    ///
    /// `extra_rounds` must be 0 or 1; anything else is a `ValidationError`.
    pub async fn multi_graph_rag(
        &self,
        question: &str,
        extra_rounds: u8,
    ) -> Result<MultiGraphRagResult, EngineError> {
        if extra_rounds > 1 {
            return Err(EngineError::Validation(format!(
                "extra_rounds must be 0 or 1, got {extra_rounds}"
            )));
        }
        let outcome =
            agents::run(Arc::clone(&self.state), question, extra_rounds, &self.config).await?;

        let synthesis = {
            let state = self.read();
            let all: Vec<Finding> =
                outcome.reports.iter().flat_map(|r| r.findings.iter().cloned()).collect();
            synthesis::synthesize(
                &state.store,
                all,
                self.config.scoring.alpha,
                self.config.scoring.beta,
                SYNTHESIS_LIMIT,
            )
        };

        let answer = if synthesis.findings.is_empty() {
            None
        } else {
            let prompt = self.context_prompt(question, &synthesis.findings);
            self.phrase_answer(prompt).await
        };

        Ok(MultiGraphRagResult {
            answer,
            agent_results: outcome.reports,
            findings: synthesis.findings,
            confidence: synthesis.confidence,
            partial: outcome.partial,
            queries_issued: outcome.queries_issued,
        })
    }

    /// Concept extraction plus forward-chained inference over the ontology.
    pub async fn ontology_based_rag(&self, question: &str) -> Result<OntologyRagResult, EngineError> {
        let concepts = self.ontology.extract_concepts(question);
        let outcome = self.ontology.reason(&concepts);

        let answer = if outcome.derived.is_empty() {
            None
        } else {
            let mut lines: Vec<String> = outcome
                .inferences
                .iter()
                .map(|i| format!("- {} is a kind of {}", i.sub, i.sup))
                .collect();
            for c in &outcome.contradictions {
                lines.push(format!("- note: {} and {} are disjoint branches", c.class_a, c.class_b));
            }
            let prompt = format!(
                "Question: {question}\n\nDerived legal classification:\n{}\n\nAnswer the question in terms of the classification above.",
                lines.join("\n")
            );
            self.phrase_answer(prompt).await
        };

        Ok(OntologyRagResult {
            answer,
            concepts: outcome.concepts,
            inferences: outcome.inferences,
            contradictions: outcome.contradictions,
        })
    }

    /// Community-scoped reasoning: query subgraph, dense communities, one
    /// representative path per community, synthesised ranking.
    pub async fn graph_rag(&self, query: &str) -> Result<GraphRagResult, EngineError> {
        let (communities, paths, synthesis) = {
            let state = self.read();
            let subgraph = community::build_query_subgraph(
                &state.store,
                &state.index,
                query,
                self.config.traversal.subgraph_depth,
            );
            let communities = community::detect_communities(
                &subgraph,
                self.config.traversal.min_community_density,
            );
            let paths: Vec<CommunityPath> = communities
                .iter()
                .map(|c| community::representative_path(&state.store, c, self.config.scoring.decay))
                .collect();
            let findings: Vec<Finding> = communities
                .iter()
                .flat_map(|c| {
                    c.nodes.iter().map(|id| Finding {
                        node_id: id.clone(),
                        source_agent: format!("community_{}", c.id),
                        relevance: c.density.min(1.0),
                    })
                })
                .collect();
            let synthesis = synthesis::synthesize(
                &state.store,
                findings,
                self.config.scoring.alpha,
                self.config.scoring.beta,
                SYNTHESIS_LIMIT,
            );
            (communities, paths, synthesis)
        };

        let answer = if synthesis.findings.is_empty() {
            None
        } else {
            let prompt = self.context_prompt(query, &synthesis.findings);
            self.phrase_answer(prompt).await
        };

        Ok(GraphRagResult {
            answer,
            communities,
            paths,
            findings: synthesis.findings,
            confidence: synthesis.confidence,
        })
    }

    /// Embedding similarity with graph-context re-ranking.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<SemanticHit>, EngineError> {
        let query_vector = self.embedder.embed(query).await?;
        let state = self.read();
        semantic::search_vectors(
            &state,
            &query_vector,
            limit,
            min_score,
            self.config.scoring.alpha,
            self.config.scoring.beta,
        )
    }

    pub fn statistics(&self) -> GraphStatistics {
        let state = self.read();
        GraphStatistics {
            total_nodes: state.store.node_count(),
            total_edges: state.store.edge_count(),
            nodes_by_type: state.store.node_type_counts(),
            edges_by_type: state.store.edge_type_counts(),
            indexed_tokens: state.index.token_count(),
        }
    }

    /// Invariant probe used by tests: edges may never dangle.
    pub fn has_dangling_edges(&self) -> bool {
        self.read().store.has_dangling_edges()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.read().store.edges().to_vec()
    }

    // ── Answer phrasing ───────────────────────────────────────────────────

    /// Context block for the completion provider: finding labels with their
    /// composite scores.
    fn context_prompt(&self, question: &str, findings: &[RankedFinding]) -> String {
        let state = self.read();
        let lines: Vec<String> = findings
            .iter()
            .map(|f| {
                let label = state
                    .store
                    .get_node(&f.node_id)
                    .map(|n| n.label().to_string())
                    .unwrap_or_else(|_| f.node_id.clone());
                format!("- {label} (score {:.2}, via {})", f.score, f.sources.join(", "))
            })
            .collect();
        format!(
            "Question: {question}\n\nRetrieved legal context:\n{}\n\nAnswer using only the context above.",
            lines.join("\n")
        )
    }

    /// One completion call under the overall deadline. Any provider failure
    /// degrades to `None` — callers return raw findings instead of erroring.
    async fn phrase_answer(&self, prompt: String) -> Option<String> {
        if !self.completion.is_available() {
            return None;
        }
        let budget = Duration::from_millis(self.config.orchestrator.total_deadline_ms);
        match tokio::time::timeout(budget, self.completion.complete(&prompt)).await {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                warn!(error = %e, "completion provider failed, returning raw findings");
                None
            }
            Err(_) => {
                warn!("completion provider timed out, returning raw findings");
                None
            }
        }
    }
}
