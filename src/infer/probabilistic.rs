//! Probabilistic chain inference.
//!
//! Hop probabilities along a chain multiply. A chain is accepted when the
//! product reaches the configured threshold; its evidence is the union of
//! hop evidence, with per-evidence confidence max-merged across hops.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::InferError;
use crate::graph::{Entity, Relation};
use crate::value::Properties;

use super::layer::RelationLayer;
use super::{InferResult, InferenceConfig};

/// A relation annotated with a probability and supporting evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticRelation {
    pub relation: Relation,
    pub probability: f64,
    pub evidence: BTreeSet<String>,
    /// Confidence per evidence id.
    pub confidence_scores: BTreeMap<String, f64>,
}

fn check_probability(value: f64) -> InferResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(InferError::InvalidProbability { value })
    }
}

impl ProbabilisticRelation {
    /// Annotate a relation. Every evidence item starts with confidence 1.0.
    pub fn new(
        relation: Relation,
        probability: f64,
        evidence: impl IntoIterator<Item = String>,
    ) -> InferResult<Self> {
        relation.validate()?;
        check_probability(probability)?;
        let evidence: BTreeSet<String> = evidence.into_iter().collect();
        let confidence_scores = evidence.iter().map(|e| (e.clone(), 1.0)).collect();
        Ok(Self {
            relation,
            probability,
            evidence,
            confidence_scores,
        })
    }

    /// Override per-evidence confidences. Unknown ids are added to the evidence set.
    pub fn with_evidence_confidence(
        mut self,
        scores: impl IntoIterator<Item = (String, f64)>,
    ) -> InferResult<Self> {
        for (id, score) in scores {
            check_probability(score)?;
            self.evidence.insert(id.clone());
            self.confidence_scores.insert(id, score);
        }
        Ok(self)
    }

    /// Lift a relation carrying a `probability` property and an optional
    /// `evidence` list of strings. `None` when there is no probability.
    pub fn from_relation(relation: &Relation) -> Option<InferResult<Self>> {
        let probability = relation.properties.get_f64("probability")?;
        let evidence = match relation.properties.get("evidence") {
            None => Ok(Vec::new()),
            Some(value) => value.as_string_list().ok_or_else(|| InferError::InvalidEvidence {
                relation: relation.describe(),
            }),
        };
        Some(evidence.and_then(|ev| Self::new(relation.clone(), probability, ev)))
    }
}

/// Derive `source -relation_type-> target` from every chain of at most
/// `max_path_length` hops whose probability product reaches the threshold.
pub fn infer_chains(
    layer: &RelationLayer<ProbabilisticRelation>,
    source: &Entity,
    target: &Entity,
    relation_type: &str,
    config: &InferenceConfig,
) -> Vec<ProbabilisticRelation> {
    let mut inferred = Vec::new();

    for chain in layer.paths(&source.id, &target.id, config.max_path_length) {
        let probability: f64 = chain.iter().map(|p| p.probability).product();
        if probability < config.probability_threshold {
            continue;
        }

        let mut evidence = BTreeSet::new();
        let mut confidence_scores: BTreeMap<String, f64> = BTreeMap::new();
        for hop in &chain {
            evidence.extend(hop.evidence.iter().cloned());
            for (id, &score) in &hop.confidence_scores {
                confidence_scores
                    .entry(id.clone())
                    .and_modify(|s| *s = s.max(score))
                    .or_insert(score);
            }
        }

        let properties = Properties::new()
            .with("inferred", true)
            .with("inference", "probabilistic")
            .with("path_length", chain.len());
        inferred.push(ProbabilisticRelation {
            relation: Relation::derived(
                source.clone(),
                target.clone(),
                relation_type,
                probability,
                properties,
            ),
            probability,
            evidence,
            confidence_scores,
        });
    }

    tracing::debug!(
        source = %source.id,
        target = %target.id,
        inferred = inferred.len(),
        "probabilistic inference"
    );
    inferred
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str) -> Entity {
        Entity::new(id, id, "concept")
    }

    fn prob(s: &str, t: &str, p: f64, evidence: &[&str]) -> ProbabilisticRelation {
        let rel = Relation::new(entity(s), entity(t), "causes", 0.9).unwrap();
        ProbabilisticRelation::new(rel, p, evidence.iter().map(|e| e.to_string())).unwrap()
    }

    fn layer(rels: Vec<ProbabilisticRelation>) -> RelationLayer<ProbabilisticRelation> {
        let mut layer = RelationLayer::new();
        for r in rels {
            let (s, t) = (r.relation.source.id.clone(), r.relation.target.id.clone());
            layer.insert(&s, &t, r);
        }
        layer
    }

    #[test]
    fn product_at_threshold_is_accepted() {
        let config = InferenceConfig::default();
        let layer = layer(vec![prob("A", "B", 0.8, &["d1"]), prob("B", "C", 0.75, &["d2"])]);
        let out = infer_chains(&layer, &entity("A"), &entity("C"), "causes", &config);
        assert_eq!(out.len(), 1);
        assert!((out[0].probability - 0.6).abs() < 1e-12);
        assert_eq!(out[0].relation.confidence, out[0].probability);
        let ev: Vec<_> = out[0].evidence.iter().map(String::as_str).collect();
        assert_eq!(ev, vec!["d1", "d2"]);
    }

    #[test]
    fn product_below_threshold_is_rejected() {
        let config = InferenceConfig::default();
        let layer = layer(vec![prob("A", "B", 0.7, &[]), prob("B", "C", 0.8, &[])]);
        assert!(infer_chains(&layer, &entity("A"), &entity("C"), "causes", &config).is_empty());
    }

    #[test]
    fn evidence_confidence_is_max_merged() {
        let config = InferenceConfig {
            probability_threshold: 0.1,
            ..Default::default()
        };
        let ab = prob("A", "B", 0.9, &["shared"])
            .with_evidence_confidence([("shared".to_string(), 0.4)])
            .unwrap();
        let bc = prob("B", "C", 0.9, &[])
            .with_evidence_confidence([("shared".to_string(), 0.7), ("x".to_string(), 0.2)])
            .unwrap();
        let out = infer_chains(&layer(vec![ab, bc]), &entity("A"), &entity("C"), "causes", &config);
        let scores = &out[0].confidence_scores;
        assert!((scores["shared"] - 0.7).abs() < f64::EPSILON);
        assert!((scores["x"] - 0.2).abs() < f64::EPSILON);
        assert_eq!(out[0].evidence.len(), 2);
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let rel = Relation::new(entity("A"), entity("B"), "causes", 0.9).unwrap();
        let err = ProbabilisticRelation::new(rel, 1.3, Vec::new()).unwrap_err();
        assert!(matches!(err, InferError::InvalidProbability { .. }));
    }

    #[test]
    fn lifted_from_relation_properties() {
        let rel = Relation::new(entity("A"), entity("B"), "causes", 0.9)
            .unwrap()
            .with_properties(
                Properties::new()
                    .with("probability", 0.7)
                    .with("evidence", vec!["doc-1"]),
            );
        let p = ProbabilisticRelation::from_relation(&rel).unwrap().unwrap();
        assert!((p.probability - 0.7).abs() < f64::EPSILON);
        assert_eq!(p.confidence_scores["doc-1"], 1.0);

        let bad = rel.clone().with_properties(
            Properties::new().with("probability", 0.7).with("evidence", 3i64),
        );
        assert!(matches!(
            ProbabilisticRelation::from_relation(&bad),
            Some(Err(InferError::InvalidEvidence { .. }))
        ));

        let plain = Relation::new(entity("A"), entity("B"), "causes", 0.9).unwrap();
        assert!(ProbabilisticRelation::from_relation(&plain).is_none());
    }
}
