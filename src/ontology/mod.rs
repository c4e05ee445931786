//! Concept extraction and forward-chaining subclass inference.
//!
//! Concepts are found by dictionary lookup: known vocabulary substrings of
//! the question map to ontology classes, and unmatched text simply yields no
//! concepts. Reasoning applies `sub ⊑ sup` axioms in declaration order until
//! no new class is derivable. Disjointness violations are flagged in the
//! result, never raised.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;

/// One applied subclass axiom: `sup` was derived because `sub` held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inference {
    pub sub: String,
    pub sup: String,
}

/// Two classes derived for the same question despite being declared disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contradiction {
    pub class_a: String,
    pub class_b: String,
}

/// Outcome of one reasoning pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningOutcome {
    /// Classes extracted directly from the question, declaration order.
    pub concepts: Vec<String>,
    /// All classes held after the fixed point, derivation order.
    pub derived: Vec<String>,
    pub inferences: Vec<Inference>,
    pub contradictions: Vec<Contradiction>,
}

/// A concept dictionary plus a small subclass/disjointness axiom set.
///
/// The axiom set must be acyclic; [`Ontology::new`] validates this at load
/// time so the fixed-point pass is bounded by the axiom count.
#[derive(Debug, Clone)]
pub struct Ontology {
    /// `(vocabulary substring, class)` pairs, matched case-insensitively
    /// against the question in declaration order.
    dictionary: Vec<(String, String)>,
    /// `sub ⊑ sup` axioms in declaration order.
    subclass: Vec<(String, String)>,
    disjoint: Vec<(String, String)>,
}

impl Ontology {
    /// Build an ontology from custom parts, rejecting cyclic axiom sets.
    pub fn new(
        dictionary: Vec<(String, String)>,
        subclass: Vec<(String, String)>,
        disjoint: Vec<(String, String)>,
    ) -> Result<Self, EngineError> {
        validate_acyclic(&subclass)?;
        let dictionary = dictionary
            .into_iter()
            .map(|(vocab, class)| (vocab.to_lowercase(), class))
            .collect();
        Ok(Self { dictionary, subclass, disjoint })
    }

    /// The default Turkish legal ontology: branch classes under
    /// PublicLaw/PrivateLaw, which are disjoint and both subclasses of Law.
    pub fn turkish_legal() -> Self {
        let dictionary = [
            ("ceza", "CriminalLaw"),
            ("suç", "CriminalLaw"),
            ("hapis", "CriminalLaw"),
            ("kira", "ObligationsLaw"),
            ("sözleşme", "ObligationsLaw"),
            ("borç", "ObligationsLaw"),
            ("tazminat", "ObligationsLaw"),
            ("şirket", "CommercialLaw"),
            ("ticaret", "CommercialLaw"),
            ("anayasa", "ConstitutionalLaw"),
            ("temel hak", "ConstitutionalLaw"),
            ("idari", "AdministrativeLaw"),
            ("idare mahkemesi", "AdministrativeLaw"),
            ("miras", "CivilLaw"),
            ("velayet", "CivilLaw"),
            ("boşanma", "CivilLaw"),
            ("mülkiyet", "CivilLaw"),
            ("işçi", "LaborLaw"),
            ("kıdem", "LaborLaw"),
            ("usul", "ProcedureLaw"),
            ("duruşma", "ProcedureLaw"),
            ("temyiz", "ProcedureLaw"),
        ];
        let subclass = [
            ("CriminalLaw", "PublicLaw"),
            ("ConstitutionalLaw", "PublicLaw"),
            ("AdministrativeLaw", "PublicLaw"),
            ("ProcedureLaw", "PublicLaw"),
            ("ObligationsLaw", "PrivateLaw"),
            ("CommercialLaw", "PrivateLaw"),
            ("CivilLaw", "PrivateLaw"),
            ("LaborLaw", "PrivateLaw"),
            ("PublicLaw", "Law"),
            ("PrivateLaw", "Law"),
        ];
        // Construction is infallible here: the static axiom set above is a
        // tree, and the acyclicity test below pins that down.
        Self {
            dictionary: dictionary
                .iter()
                .map(|(v, c)| (v.to_lowercase(), c.to_string()))
                .collect(),
            subclass: subclass.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect(),
            disjoint: vec![("PublicLaw".to_string(), "PrivateLaw".to_string())],
        }
    }

    /// Classes whose vocabulary appears in `question`, declaration order,
    /// deduplicated. Unmatched text yields an empty list, never an error.
    pub fn extract_concepts(&self, question: &str) -> Vec<String> {
        let question = question.to_lowercase();
        let mut seen = BTreeSet::new();
        let mut concepts = Vec::new();
        for (vocab, class) in &self.dictionary {
            if question.contains(vocab.as_str()) && seen.insert(class.clone()) {
                concepts.push(class.clone());
            }
        }
        concepts
    }

    /// Forward-chain the subclass axioms from `concepts` to a fixed point.
    pub fn reason(&self, concepts: &[String]) -> ReasoningOutcome {
        let mut held: BTreeSet<String> = concepts.iter().cloned().collect();
        let mut derived: Vec<String> = concepts.to_vec();
        let mut inferences = Vec::new();

        // Acyclic axioms cap derivation chains at the axiom count, so this
        // terminates within `subclass.len()` passes.
        for _ in 0..=self.subclass.len() {
            let mut changed = false;
            for (sub, sup) in &self.subclass {
                if held.contains(sub) && !held.contains(sup) {
                    held.insert(sup.clone());
                    derived.push(sup.clone());
                    inferences.push(Inference { sub: sub.clone(), sup: sup.clone() });
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let contradictions: Vec<Contradiction> = self
            .disjoint
            .iter()
            .filter(|(a, b)| held.contains(a) && held.contains(b))
            .map(|(a, b)| Contradiction { class_a: a.clone(), class_b: b.clone() })
            .collect();
        if !contradictions.is_empty() {
            debug!(count = contradictions.len(), "disjointness contradictions flagged");
        }

        ReasoningOutcome { concepts: concepts.to_vec(), derived, inferences, contradictions }
    }
}

/// Reject subclass axiom sets containing a cycle (DFS three-colouring).
fn validate_acyclic(subclass: &[(String, String)]) -> Result<(), EngineError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        InProgress,
        Done,
    }
    use std::collections::HashMap;

    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for (sub, sup) in subclass {
        edges.entry(sub.as_str()).or_default().push(sup.as_str());
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    // Iterative DFS with an explicit stack; (node, children-expanded) frames.
    for start in edges.keys().copied().collect::<Vec<_>>() {
        if marks.contains_key(start) {
            continue;
        }
        let mut stack: Vec<(&str, bool)> = vec![(start, false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                marks.insert(node, Mark::Done);
                continue;
            }
            match marks.get(node) {
                Some(Mark::Done) => continue,
                Some(Mark::InProgress) => {
                    return Err(EngineError::Validation(format!(
                        "cyclic subclass axioms involving class {node}"
                    )));
                }
                None => {}
            }
            marks.insert(node, Mark::InProgress);
            stack.push((node, true));
            for next in edges.get(node).into_iter().flatten().copied() {
                match marks.get(next) {
                    Some(Mark::InProgress) => {
                        return Err(EngineError::Validation(format!(
                            "cyclic subclass axioms involving class {next}"
                        )));
                    }
                    Some(Mark::Done) => {}
                    None => stack.push((next, false)),
                }
            }
        }
    }
    Ok(())
}
