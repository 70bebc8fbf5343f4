//! Single-pass two-hop composition engine.
//!
//! For every active rule `[T1, T2] ⟹ C`, each directed path
//! `u -T1-> v -T2-> w` over distinct nodes yields one derived relation
//! `u -C-> w` with confidence `(c1 × c2) × factor`. Derived relations are
//! never fed back within a call.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::visit::EdgeRef;

use crate::graph::{Entity, KnowledgeGraph, Relation};
use crate::value::Properties;

use super::InferResult;
use super::rules::{InferenceRule, RuleSet};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Result of one composition pass.
#[derive(Debug, Clone, Default)]
pub struct RuleEngineResult {
    /// Derived relations in rule order, then path discovery order.
    pub derived: Vec<Relation>,
    /// Per-rule derivation counts.
    pub rule_stats: HashMap<String, usize>,
    /// Paths matched but dropped because an endpoint could not be resolved.
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Rule engine
// ---------------------------------------------------------------------------

/// Rule-based composition engine.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: RuleSet,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(RuleSet::builtin())
    }
}

impl RuleEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleSet {
        &mut self.rules
    }

    pub fn add_rule(&mut self, rule: InferenceRule) -> InferResult<()> {
        self.rules.add_rule(rule)
    }

    pub fn remove_rule(&mut self, rule_id: &str) -> InferResult<InferenceRule> {
        self.rules.remove_rule(rule_id)
    }

    /// Apply every active rule once to a batch of relations.
    ///
    /// The working graph holds only this batch. Endpoint entities are taken
    /// from the batch: sources from relation sources, targets from relation
    /// targets.
    pub fn infer(&self, relations: &[Relation]) -> InferResult<RuleEngineResult> {
        let kg = KnowledgeGraph::from_relations(relations)?;

        let mut sources: HashMap<&str, &Entity> = HashMap::new();
        let mut targets: HashMap<&str, &Entity> = HashMap::new();
        for r in relations {
            sources.entry(r.source.id.as_str()).or_insert(&r.source);
            targets.entry(r.target.id.as_str()).or_insert(&r.target);
        }

        Ok(self.compose(
            &kg,
            |id| sources.get(id).map(|e| (*e).clone()),
            |id| targets.get(id).map(|e| (*e).clone()),
        ))
    }

    /// Apply every active rule once to an existing graph snapshot.
    pub fn infer_graph(&self, kg: &KnowledgeGraph) -> RuleEngineResult {
        self.compose(kg, |id| kg.entity(id), |id| kg.entity(id))
    }

    fn compose<S, T>(
        &self,
        kg: &KnowledgeGraph,
        resolve_source: S,
        resolve_target: T,
    ) -> RuleEngineResult
    where
        S: Fn(&str) -> Option<Entity>,
        T: Fn(&str) -> Option<Entity>,
    {
        let mut result = RuleEngineResult::default();

        for rule in self.rules.active() {
            let [first, second] = &rule.premises;
            let mut count = 0usize;

            for head in kg.relations_of_type(first) {
                let (u, v) = (head.source.id.as_str(), head.target.id.as_str());
                if u == v {
                    continue;
                }
                for (w, c2) in second_hops(kg, v, second) {
                    if w == u || w == v {
                        continue;
                    }
                    let (Some(source), Some(target)) =
                        (resolve_source(u), resolve_target(w.as_str()))
                    else {
                        tracing::warn!(
                            rule_id = %rule.id,
                            source = u,
                            target = %w,
                            "skipping path with unresolved endpoint"
                        );
                        result.skipped += 1;
                        continue;
                    };
                    let confidence = (head.confidence * c2) * rule.confidence_factor;
                    let properties = Properties::new()
                        .with("inferred", true)
                        .with("rule_id", rule.id.as_str());
                    result.derived.push(Relation::derived(
                        source,
                        target,
                        rule.conclusion.as_str(),
                        confidence,
                        properties,
                    ));
                    count += 1;
                }
            }
            if count > 0 {
                *result.rule_stats.entry(rule.id.clone()).or_insert(0) += count;
            }
        }

        tracing::debug!(
            derived = result.derived.len(),
            skipped = result.skipped,
            rules = self.rules.active().count(),
            "composition pass complete"
        );
        result
    }
}

/// `(target id, confidence)` of every outgoing edge of `from` with the given type.
fn second_hops(kg: &KnowledgeGraph, from: &str, relation_type: &str) -> Vec<(String, f64)> {
    let Some(idx) = kg.node(from) else {
        return vec![];
    };
    let graph = kg.graph();
    graph
        .edges_directed(idx, Direction::Outgoing)
        .filter(|e| e.weight().relation_type == relation_type)
        .map(|e| (graph[e.target()].id.clone(), e.weight().confidence))
        .collect()
}

/// Merge originals with derived relations, keeping the highest-confidence
/// relation per (source, target, type). First occurrence wins ties, so
/// originals listed first are preferred.
pub fn resolve_conflicts(relations: impl IntoIterator<Item = Relation>) -> Vec<Relation> {
    let mut order: Vec<(String, String, String)> = Vec::new();
    let mut best: HashMap<(String, String, String), Relation> = HashMap::new();

    for relation in relations {
        let key = (
            relation.source.id.clone(),
            relation.target.id.clone(),
            relation.relation_type.clone(),
        );
        let replace = match best.get(&key) {
            Some(existing) => existing.confidence < relation.confidence,
            None => {
                order.push(key.clone());
                true
            }
        };
        if replace {
            best.insert(key, relation);
        }
    }

    order.into_iter().filter_map(|k| best.remove(&k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str) -> Entity {
        Entity::new(id, id, "concept")
    }

    fn rel(s: &str, t: &str, ty: &str, c: f64) -> Relation {
        Relation::new(entity(s), entity(t), ty, c).unwrap()
    }

    fn engine_with(rule: InferenceRule) -> RuleEngine {
        let mut rules = RuleSet::new("test");
        rules.add_rule(rule).unwrap();
        RuleEngine::new(rules)
    }

    #[test]
    fn part_of_chain_multiplies_confidences() {
        let engine = engine_with(InferenceRule::new("R1", ["part_of", "part_of"], "part_of", 0.9));
        let result = engine
            .infer(&[rel("E1", "E2", "part_of", 0.9), rel("E2", "E3", "part_of", 0.95)])
            .unwrap();

        assert_eq!(result.derived.len(), 1);
        let d = &result.derived[0];
        assert_eq!(d.source.id, "E1");
        assert_eq!(d.target.id, "E3");
        assert_eq!(d.relation_type, "part_of");
        assert_eq!(d.confidence, (0.9 * 0.95) * 0.9);
        assert!((d.confidence - 0.7695).abs() < 1e-12);
        assert!(d.is_inferred());
        assert_eq!(d.rule_id(), Some("R1"));
        assert_eq!(result.rule_stats["R1"], 1);
    }

    #[test]
    fn no_conclusion_from_a_cycle_back() {
        let engine = engine_with(InferenceRule::new("R", ["r", "r"], "r", 1.0));
        let result = engine.infer(&[rel("A", "B", "r", 1.0), rel("B", "A", "r", 1.0)]).unwrap();
        assert!(result.derived.is_empty());
    }

    #[test]
    fn self_loop_edges_never_form_a_path() {
        let engine = engine_with(InferenceRule::new("R", ["r", "r"], "r", 1.0));
        let result = engine.infer(&[rel("A", "A", "r", 1.0), rel("A", "B", "r", 1.0)]).unwrap();
        assert!(result.derived.is_empty());
    }

    #[test]
    fn mixed_premises_follow_path_order() {
        let engine = RuleEngine::default();
        let result = engine
            .infer(&[
                rel("office", "building", "located_in", 1.0),
                rel("building", "city", "contains", 0.8),
            ])
            .unwrap();
        assert_eq!(result.derived.len(), 1);
        assert_eq!(result.derived[0].relation_type, "located_in");
        assert!((result.derived[0].confidence - 0.8 * 0.85).abs() < 1e-12);

        // Reversed order does not match [located_in, contains].
        let result = engine
            .infer(&[
                rel("building", "city", "located_in", 1.0),
                rel("office", "building", "contains", 0.8),
            ])
            .unwrap();
        assert!(result.derived.is_empty());
    }

    #[test]
    fn single_pass_does_not_chain_derivations() {
        let engine = engine_with(InferenceRule::new("R", ["is_a", "is_a"], "is_a", 1.0));
        let result = engine
            .infer(&[
                rel("A", "B", "is_a", 1.0),
                rel("B", "C", "is_a", 1.0),
                rel("C", "D", "is_a", 1.0),
            ])
            .unwrap();
        // A->C and B->D only; A->D would need a second pass.
        assert_eq!(result.derived.len(), 2);
        assert!(!result.derived.iter().any(|r| r.source.id == "A" && r.target.id == "D"));
    }

    #[test]
    fn inactive_rules_do_not_fire() {
        let mut engine = RuleEngine::default();
        engine.rules_mut().set_active("transitive-is-a", false).unwrap();
        let result = engine
            .infer(&[rel("A", "B", "is_a", 1.0), rel("B", "C", "is_a", 1.0)])
            .unwrap();
        assert!(result.derived.is_empty());
    }

    #[test]
    fn invalid_input_relation_is_an_error() {
        let engine = RuleEngine::default();
        let mut bad = rel("A", "B", "is_a", 1.0);
        bad.confidence = 2.0;
        assert!(engine.infer(&[bad]).is_err());
    }

    #[test]
    fn graph_snapshot_inference_matches_batch() {
        let batch = [rel("A", "B", "causes", 0.5), rel("B", "C", "causes", 0.5)];
        let kg = KnowledgeGraph::from_relations(&batch).unwrap();
        let engine = RuleEngine::default();
        let from_graph = engine.infer_graph(&kg);
        let from_batch = engine.infer(&batch).unwrap();
        assert_eq!(from_graph.derived, from_batch.derived);
        assert!((from_graph.derived[0].confidence - 0.2).abs() < 1e-12);
    }

    #[test]
    fn conflicts_keep_highest_confidence() {
        let merged = resolve_conflicts(vec![
            rel("A", "C", "is_a", 0.5),
            rel("A", "C", "is_a", 0.8),
            rel("A", "C", "part_of", 0.3),
            rel("A", "C", "is_a", 0.8),
        ]);
        assert_eq!(merged.len(), 2);
        assert!((merged[0].confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(merged[1].relation_type, "part_of");
    }
}
