//! Law-document ingestion: the engine's only write path.
//!
//! A document is validated in full before anything is written, so a rejected
//! ingest leaves no partial graph state. Natural keys make the whole pipeline
//! idempotent: the law keys on its name, article `i` on `"{law_name}#{i}"`
//! (1-based), and re-ingesting merges instead of duplicating.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::GraphState;
use crate::error::EngineError;
use crate::graph::{EdgeType, Node, NodeId, NodeType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawDocument {
    pub law_name: String,
    pub articles: Vec<ArticleInput>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// IDs created (or re-resolved) by one ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub law_id: NodeId,
    pub article_ids: Vec<NodeId>,
}

/// Ingest one law document into the graph.
///
/// Articles are indexed under the law name as well as their own text, so a
/// search for the law's short name surfaces the law node and every article.
pub fn build_graph(state: &mut GraphState, doc: &LawDocument) -> Result<BuildReport, EngineError> {
    validate(doc)?;

    let mut law_node = Node::new(NodeType::Law, doc.law_name.clone(), doc.law_name.clone())
        .with_attr("title", doc.law_name.clone());
    for (k, v) in &doc.metadata {
        law_node.attributes.insert(k.clone(), v.clone());
    }
    let law_id = state.upsert_indexed(law_node)?;

    let mut article_ids = Vec::with_capacity(doc.articles.len());
    for (i, article) in doc.articles.iter().enumerate() {
        let number = i + 1;
        let natural_key = format!("{}#{number}", doc.law_name);
        let text = format!(
            "{} {} {} {}",
            doc.law_name,
            article.title,
            article.content,
            article.keywords.join(" ")
        );
        let node = Node::new(NodeType::Article, natural_key, text.trim_end().to_string())
            .with_attr("title", article.title.clone())
            .with_attr("number", number.to_string());
        let article_id = state.upsert_indexed(node)?;
        state.store.add_edge(&law_id, &article_id, EdgeType::Contains)?;
        article_ids.push(article_id);
    }

    info!(law = %doc.law_name, articles = article_ids.len(), "law document ingested");
    Ok(BuildReport { law_id, article_ids })
}

fn validate(doc: &LawDocument) -> Result<(), EngineError> {
    if doc.law_name.trim().is_empty() {
        return Err(EngineError::Validation("law_name must not be empty".into()));
    }
    for (i, article) in doc.articles.iter().enumerate() {
        if article.title.trim().is_empty() {
            return Err(EngineError::Validation(format!("article {} has an empty title", i + 1)));
        }
        if article.content.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "article {} has an empty content body",
                i + 1
            )));
        }
    }
    Ok(())
}

/// Deterministic sample Turkish legal corpus: TCK, TBK, and TMK with three
/// articles each. Used by tests and offline demos.
pub fn demo_corpus() -> Vec<LawDocument> {
    let laws: [(&str, &str, &[&str]); 3] = [
        ("TCK", "Türk Ceza Kanunu", &["ceza", "suç"]),
        ("TBK", "Türk Borçlar Kanunu", &["borç", "kira", "sözleşme"]),
        ("TMK", "Türk Medeni Kanunu", &["miras", "velayet"]),
    ];
    laws.iter()
        .map(|(short, full, keywords)| LawDocument {
            law_name: short.to_string(),
            articles: (1..=3)
                .map(|n| ArticleInput {
                    title: format!("{short} Madde {n}"),
                    content: format!("{full} kapsamında Madde {n} hükümleri"),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                })
                .collect(),
            metadata: BTreeMap::from([("name".to_string(), full.to_string())]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> LawDocument {
        demo_corpus().remove(0)
    }

    #[test]
    fn ingest_creates_law_articles_and_contains_edges() {
        let mut state = GraphState::new(8);
        let report = build_graph(&mut state, &doc()).expect("ingest");
        assert_eq!(report.article_ids.len(), 3);
        assert_eq!(state.store.node_count(), 4);
        assert_eq!(state.store.edge_count(), 3);
        assert!(!state.store.has_dangling_edges());
        let law = state.store.get_node(&report.law_id).expect("law");
        assert_eq!(law.node_type, NodeType::Law);
        assert_eq!(law.attributes.get("name").map(String::as_str), Some("Türk Ceza Kanunu"));
    }

    #[test]
    fn ingest_is_idempotent_per_natural_key() {
        let mut state = GraphState::new(8);
        let first = build_graph(&mut state, &doc()).expect("first");
        let second = build_graph(&mut state, &doc()).expect("second");
        assert_eq!(first.law_id, second.law_id);
        assert_eq!(first.article_ids, second.article_ids);
        assert_eq!(state.store.node_count(), 4, "re-ingest must not duplicate nodes");
        assert_eq!(state.store.edge_count(), 3, "re-ingest must not duplicate edges");
    }

    #[test]
    fn articles_index_under_the_law_name() {
        let mut state = GraphState::new(8);
        let report = build_graph(&mut state, &doc()).expect("ingest");
        let hits = state.index.search("tck", 10);
        assert_eq!(hits.len(), 4, "law node and all three articles match");
        assert!(hits.contains(&report.law_id));
    }

    #[test]
    fn invalid_document_writes_nothing() {
        let mut state = GraphState::new(8);
        let mut bad = doc();
        bad.articles[2].content = "   ".to_string();
        let err = build_graph(&mut state, &bad).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(state.store.node_count(), 0, "failed ingest must leave no partial state");
        assert_eq!(state.store.edge_count(), 0);
    }

    #[test]
    fn empty_law_name_rejected() {
        let mut state = GraphState::new(8);
        let mut bad = doc();
        bad.law_name = "".to_string();
        assert!(matches!(build_graph(&mut state, &bad), Err(EngineError::Validation(_))));
    }

    #[test]
    fn demo_corpus_is_deterministic() {
        let a = demo_corpus();
        let b = demo_corpus();
        assert_eq!(a.len(), 3);
        assert_eq!(
            serde_json::to_string(&a).expect("json"),
            serde_json::to_string(&b).expect("json")
        );
    }
}
