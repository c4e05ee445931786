//! Concurrent multi-agent retrieval over typed graph partitions.
//!
//! A fixed registry of specialists each owns a disjoint slice of the graph,
//! selected by node type. One orchestrated call fans out a query round across
//! all agents (each under its own timeout), joins at a barrier, and — when
//! one extra round is requested — lets every agent re-query with the top
//! findings of its peers as additional search terms. Total work is bounded
//! at `2 × |agents|` queries no matter the question.
//!
//! Partial-failure semantics: an agent that times out or errors contributes
//! an empty finding set and a `degraded` flag; the call only fails when
//! every agent does.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::engine::GraphState;
use crate::error::EngineError;
use crate::graph::NodeType;
use crate::providers::ProviderError;
use crate::synthesis::Finding;
use crate::traversal::{self, TraversalOptions};

/// Findings an agent may return from one query.
const AGENT_RESULT_LIMIT: usize = 20;

/// A retrieval specialist bound to a node-type partition.
#[derive(Debug, Clone, Copy)]
pub struct AgentSpec {
    pub id: &'static str,
    pub specialty: &'static str,
    pub types: &'static [NodeType],
}

/// The fixed agent registry. Partitions are disjoint by construction.
pub const AGENTS: &[AgentSpec] = &[
    AgentSpec {
        id: "agent_law",
        specialty: "Law Articles & Legislation",
        types: &[NodeType::Law, NodeType::Article],
    },
    AgentSpec { id: "agent_case", specialty: "Case Law & Decisions", types: &[NodeType::Case] },
    AgentSpec {
        id: "agent_doctrine",
        specialty: "Precedents & Doctrine",
        types: &[NodeType::Precedent],
    },
    AgentSpec {
        id: "agent_procedure",
        specialty: "Courts & Procedure",
        types: &[NodeType::Judge, NodeType::Court],
    },
];

/// One agent's entry in the orchestrated result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent_id: String,
    pub specialty: String,
    pub findings: Vec<Finding>,
    /// Set when the agent timed out or errored in any round.
    pub degraded: bool,
}

/// Raw orchestration outcome, handed to the synthesis engine by the caller.
#[derive(Debug)]
pub struct OrchestratorOutcome {
    pub reports: Vec<AgentReport>,
    /// The overall deadline expired or at least one agent degraded.
    pub partial: bool,
    /// Agent queries issued across all rounds; never exceeds `2 × |agents|`.
    pub queries_issued: usize,
}

/// Per-agent query implementation, injectable for tests.
pub type QueryFn =
    Arc<dyn Fn(&GraphState, &AgentSpec, &str) -> Result<Vec<Finding>, EngineError> + Send + Sync>;

/// The production query: a partition-restricted traversal (§ traversal) whose
/// match scores become finding relevances.
pub fn traversal_query(config: &EngineConfig) -> QueryFn {
    let depth = config.traversal.agent_depth;
    let decay = config.scoring.decay;
    Arc::new(move |state, spec, query| {
        let opts = TraversalOptions {
            max_depth: depth,
            min_similarity: 0.0,
            limit: AGENT_RESULT_LIMIT,
            decay,
            allowed_types: Some(spec.types.to_vec()),
        };
        let matches = traversal::find_precedents(&state.store, &state.index, query, &opts);
        Ok(matches
            .into_iter()
            .map(|m| Finding {
                node_id: m.node.id,
                source_agent: spec.id.to_string(),
                relevance: m.score,
            })
            .collect())
    })
}

/// Run the full orchestration: round 1, optional exchange round, merge.
///
/// `extra_rounds` must already be validated to `{0, 1}` at the API boundary.
pub async fn run(
    state: Arc<RwLock<GraphState>>,
    question: &str,
    extra_rounds: u8,
    config: &EngineConfig,
) -> Result<OrchestratorOutcome, EngineError> {
    run_with_query(state, question, extra_rounds, config, traversal_query(config)).await
}

/// [`run`] with an injected per-agent query function.
pub async fn run_with_query(
    state: Arc<RwLock<GraphState>>,
    question: &str,
    extra_rounds: u8,
    config: &EngineConfig,
    query_fn: QueryFn,
) -> Result<OrchestratorOutcome, EngineError> {
    let agent_timeout = Duration::from_millis(config.orchestrator.agent_timeout_ms);
    let deadline = Instant::now() + Duration::from_millis(config.orchestrator.total_deadline_ms);

    // ── Round 1: every agent queries the raw question ─────────────────────
    let round1: Vec<(usize, String)> =
        (0..AGENTS.len()).map(|i| (i, question.to_string())).collect();
    let mut queries_issued = round1.len();
    let (results, mut deadline_hit) =
        run_round(&state, round1, agent_timeout, deadline, &query_fn).await;

    let mut per_agent: Vec<Option<Vec<Finding>>> = vec![None; AGENTS.len()];
    for (idx, findings) in results {
        per_agent[idx] = findings;
    }
    let mut reports: Vec<AgentReport> = AGENTS
        .iter()
        .zip(per_agent)
        .map(|(spec, findings)| AgentReport {
            agent_id: spec.id.to_string(),
            specialty: spec.specialty.to_string(),
            degraded: findings.is_none(),
            findings: findings.unwrap_or_default(),
        })
        .collect();

    // ── Round 2: cross-agent exchange, capped at exactly one extra round ──
    if extra_rounds == 1 && !deadline_hit {
        let terms = exchange_terms(&state, &reports, config.orchestrator.exchange_top_k);
        let round2: Vec<(usize, String)> = terms
            .into_iter()
            .enumerate()
            .filter(|(_, t)| !t.is_empty())
            .map(|(i, t)| (i, format!("{question} {}", t.join(" "))))
            .collect();
        if !round2.is_empty() {
            queries_issued += round2.len();
            debug!(agents = round2.len(), "exchange round start");
            let queried: Vec<usize> = round2.iter().map(|(i, _)| *i).collect();
            let (results, hit) = run_round(&state, round2, agent_timeout, deadline, &query_fn).await;
            deadline_hit |= hit;
            let mut answered = vec![false; AGENTS.len()];
            for (idx, findings) in results {
                answered[idx] = true;
                match findings {
                    Some(extra) => merge_findings(&mut reports[idx].findings, extra),
                    None => reports[idx].degraded = true,
                }
            }
            // Agents queried this round but aborted by the deadline never
            // reported back; agents skipped for lack of exchange terms are
            // untouched.
            for idx in queried {
                if !answered[idx] {
                    reports[idx].degraded = true;
                }
            }
        }
    }

    if reports.iter().all(|r| r.degraded && r.findings.is_empty()) {
        return Err(EngineError::Provider(ProviderError::AllAgentsFailed));
    }
    let partial = deadline_hit || reports.iter().any(|r| r.degraded);
    Ok(OrchestratorOutcome { reports, partial, queries_issued })
}

/// Fan one round out over a `JoinSet` and join behind the overall deadline.
///
/// Each agent query runs on the blocking pool under its own timeout; the
/// round returns either when every agent resolved or when the deadline
/// expires, in which case the remaining tasks are aborted (best-effort).
async fn run_round(
    state: &Arc<RwLock<GraphState>>,
    queries: Vec<(usize, String)>,
    agent_timeout: Duration,
    deadline: Instant,
    query_fn: &QueryFn,
) -> (Vec<(usize, Option<Vec<Finding>>)>, bool) {
    let mut join_set = JoinSet::new();
    for (agent_idx, query) in queries {
        let state = Arc::clone(state);
        let query_fn = Arc::clone(query_fn);
        join_set.spawn(async move {
            let spec = &AGENTS[agent_idx];
            let handle = tokio::task::spawn_blocking(move || {
                let guard = state.read().unwrap_or_else(|e| e.into_inner());
                query_fn(&guard, spec, &query)
            });
            let findings = match tokio::time::timeout(agent_timeout, handle).await {
                Ok(Ok(Ok(findings))) => Some(findings),
                Ok(Ok(Err(e))) => {
                    warn!(agent = spec.id, error = %e, "agent query failed");
                    None
                }
                Ok(Err(e)) => {
                    warn!(agent = spec.id, error = %e, "agent task join error");
                    None
                }
                Err(_) => {
                    warn!(agent = spec.id, timeout_ms = agent_timeout.as_millis() as u64, "agent query timed out");
                    None
                }
            };
            (agent_idx, findings)
        });
    }

    let mut results = Vec::new();
    let mut deadline_hit = false;
    loop {
        match tokio::time::timeout_at(deadline, join_set.join_next()).await {
            Ok(Some(Ok(pair))) => results.push(pair),
            Ok(Some(Err(e))) => warn!(error = %e, "agent join error"),
            Ok(None) => break,
            Err(_) => {
                warn!("orchestration deadline expired, aborting in-flight agents");
                join_set.abort_all();
                deadline_hit = true;
                break;
            }
        }
    }
    (results, deadline_hit)
}

/// For each agent, the top-k finding labels of all *other* agents,
/// deduplicated, in relevance order. Labels prefer the node's `title`
/// attribute and fall back to its first indexed tokens.
fn exchange_terms(
    state: &Arc<RwLock<GraphState>>,
    reports: &[AgentReport],
    top_k: usize,
) -> Vec<Vec<String>> {
    let guard = state.read().unwrap_or_else(|e| e.into_inner());
    reports
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let mut peers: Vec<&Finding> = reports
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, r)| r.findings.iter())
                .collect();
            peers.sort_by(|a, b| {
                b.relevance.total_cmp(&a.relevance).then_with(|| a.node_id.cmp(&b.node_id))
            });
            let mut seen = std::collections::BTreeSet::new();
            let mut terms = Vec::new();
            for finding in peers.into_iter().take(top_k) {
                let label = match guard.store.get_node(&finding.node_id) {
                    Ok(node) if node.attributes.contains_key("title") => node.label().to_string(),
                    _ => guard.index.node_token_prefix(&finding.node_id, 2).join(" "),
                };
                if !label.is_empty() && seen.insert(label.clone()) {
                    terms.push(label);
                }
            }
            terms
        })
        .collect()
}

/// Merge round-2 findings into an agent's report, deduplicating by node and
/// keeping the maximum relevance.
fn merge_findings(existing: &mut Vec<Finding>, extra: Vec<Finding>) {
    for f in extra {
        match existing.iter_mut().find(|e| e.node_id == f.node_id) {
            Some(e) => {
                if f.relevance > e.relevance {
                    e.relevance = f.relevance;
                }
            }
            None => existing.push(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GraphState;
    use crate::graph::{EdgeType, Node};

    fn sample_state() -> Arc<RwLock<GraphState>> {
        let mut state = GraphState::new(16);
        let law = state
            .upsert_indexed(Node::new(NodeType::Law, "TCK", "TCK ceza kanunu").with_attr("title", "TCK"))
            .expect("law");
        let article = state
            .upsert_indexed(
                Node::new(NodeType::Article, "TCK#1", "ceza hükmü madde")
                    .with_attr("title", "TCK Madde 1"),
            )
            .expect("article");
        let case = state
            .upsert_indexed(Node::new(NodeType::Case, "YARG-1", "ceza davası kararı"))
            .expect("case");
        state.store.add_edge(&law, &article, EdgeType::Contains).expect("edge");
        state.store.add_edge(&case, &article, EdgeType::Cites).expect("edge");
        Arc::new(RwLock::new(state))
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn registry_partitions_are_disjoint() {
        let mut seen = std::collections::BTreeSet::new();
        for agent in AGENTS {
            for t in agent.types {
                assert!(seen.insert(*t), "{t} appears in two partitions");
            }
        }
        assert_eq!(AGENTS.len(), 4);
    }

    #[tokio::test]
    async fn round_one_scopes_findings_to_partitions() {
        let outcome = run(sample_state(), "ceza", 0, &config()).await.expect("run");
        assert_eq!(outcome.queries_issued, AGENTS.len());
        assert!(!outcome.partial);
        let law_report = &outcome.reports[0];
        assert!(!law_report.findings.is_empty());
        let case_report = &outcome.reports[1];
        assert!(case_report.findings.iter().all(|f| f.source_agent == "agent_case"));
        // Procedure agent has no Judge/Court nodes to find.
        assert!(outcome.reports[3].findings.is_empty());
        assert!(!outcome.reports[3].degraded, "empty is not degraded");
    }

    #[tokio::test]
    async fn comprehensive_depth_bounds_fanout() {
        let outcome = run(sample_state(), "ceza", 1, &config()).await.expect("run");
        assert!(outcome.queries_issued <= 2 * AGENTS.len(), "fan-out must stay within 2×agents");
    }

    #[tokio::test]
    async fn one_erroring_agent_degrades_without_failing() {
        let base = traversal_query(&config());
        let query_fn: QueryFn = Arc::new(move |state, spec, q| {
            if spec.id == "agent_case" {
                return Err(EngineError::Timeout("simulated case-graph outage".into()));
            }
            base(state, spec, q)
        });
        let outcome = run_with_query(sample_state(), "ceza", 0, &config(), query_fn)
            .await
            .expect("must not fail while other agents succeed");
        assert!(outcome.partial);
        let case_report = &outcome.reports[1];
        assert!(case_report.degraded);
        assert!(case_report.findings.is_empty());
        assert!(outcome.reports[0].findings.iter().any(|f| f.source_agent == "agent_law"));
    }

    #[tokio::test]
    async fn all_agents_failing_is_a_provider_error() {
        let query_fn: QueryFn =
            Arc::new(|_, _, _| Err(EngineError::Timeout("total outage".into())));
        let err = run_with_query(sample_state(), "ceza", 0, &config(), query_fn)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Provider(ProviderError::AllAgentsFailed)));
    }

    #[tokio::test]
    async fn deadline_expiry_yields_partial_with_surviving_findings() {
        let base = traversal_query(&config());
        let query_fn: QueryFn = Arc::new(move |state, spec, q| {
            if spec.id == "agent_procedure" {
                // Stall well past the overall deadline.
                std::thread::sleep(Duration::from_millis(2000));
            }
            base(state, spec, q)
        });
        let mut cfg = config();
        cfg.orchestrator.agent_timeout_ms = 5000;
        cfg.orchestrator.total_deadline_ms = 300;
        let outcome = run_with_query(sample_state(), "ceza", 0, &cfg, query_fn)
            .await
            .expect("fast agents carry the call");
        assert!(outcome.partial);
        assert!(outcome.reports[3].degraded, "stalled agent must be marked degraded");
        assert!(!outcome.reports[0].findings.is_empty());
    }

    #[tokio::test]
    async fn exchange_round_merges_peer_context() {
        let state = sample_state();
        let r0 = run(Arc::clone(&state), "ceza", 0, &config()).await.expect("round 1 only");
        let r1 = run(state, "ceza", 1, &config()).await.expect("with exchange");
        let total =
            |o: &OrchestratorOutcome| o.reports.iter().map(|r| r.findings.len()).sum::<usize>();
        assert!(total(&r1) >= total(&r0), "exchange must never lose findings");
        assert!(r1.queries_issued > r0.queries_issued);
    }
}
