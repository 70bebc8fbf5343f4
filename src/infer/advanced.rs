//! Composite temporal / probabilistic / multi-hop reasoner.
//!
//! Owns the two auxiliary layers. Relations with temporal bounds feed the
//! temporal layer; relations with a `probability` property feed the
//! probabilistic layer. Multi-hop runs directly on the knowledge graph.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::graph::{Entity, KnowledgeGraph, Relation};

use super::layer::RelationLayer;
use super::probabilistic::{self, ProbabilisticRelation};
use super::temporal::{self, TemporalRelation};
use super::{InferResult, InferenceConfig, multi_hop};

/// Relations derived by each reasoner for one query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InferenceReport {
    pub temporal: Vec<Relation>,
    pub probabilistic: Vec<Relation>,
    pub multi_hop: Vec<Relation>,
}

impl InferenceReport {
    pub fn len(&self) -> usize {
        self.temporal.len() + self.probabilistic.len() + self.multi_hop.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Temporal, probabilistic and multi-hop inference over one snapshot.
#[derive(Debug, Clone, Default)]
pub struct AdvancedInferenceEngine {
    config: InferenceConfig,
    temporal: RelationLayer<TemporalRelation>,
    probabilistic: RelationLayer<ProbabilisticRelation>,
}

impl AdvancedInferenceEngine {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            config,
            temporal: RelationLayer::new(),
            probabilistic: RelationLayer::new(),
        }
    }

    /// Build both layers from a relation batch.
    pub fn from_relations(config: InferenceConfig, relations: &[Relation]) -> InferResult<Self> {
        let mut engine = Self::new(config);
        for relation in relations {
            if let Some(t) = TemporalRelation::from_relation(relation) {
                engine.insert_temporal(t?);
            }
            if let Some(p) = ProbabilisticRelation::from_relation(relation) {
                engine.insert_probabilistic(p?);
            }
        }
        tracing::debug!(
            temporal = engine.temporal.len(),
            probabilistic = engine.probabilistic.len(),
            "auxiliary layers loaded"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Annotate and register a temporal relation.
    pub fn add_temporal_relation(
        &mut self,
        relation: Relation,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        duration_secs: Option<f64>,
    ) -> InferResult<TemporalRelation> {
        let t = TemporalRelation::new(relation, start_time, end_time, duration_secs)?;
        self.insert_temporal(t.clone());
        Ok(t)
    }

    /// Annotate and register a probabilistic relation. Each evidence item
    /// gets confidence 1.0.
    pub fn add_probabilistic_relation(
        &mut self,
        relation: Relation,
        probability: f64,
        evidence: Vec<String>,
    ) -> InferResult<ProbabilisticRelation> {
        let p = ProbabilisticRelation::new(relation, probability, evidence)?;
        self.insert_probabilistic(p.clone());
        Ok(p)
    }

    pub fn insert_temporal(&mut self, t: TemporalRelation) {
        let (s, d) = (t.relation.source.id.clone(), t.relation.target.id.clone());
        self.temporal.insert(&s, &d, t);
    }

    pub fn insert_probabilistic(&mut self, p: ProbabilisticRelation) {
        let (s, d) = (p.relation.source.id.clone(), p.relation.target.id.clone());
        self.probabilistic.insert(&s, &d, p);
    }

    pub fn temporal_inference(
        &self,
        source: &Entity,
        target: &Entity,
        relation_type: &str,
    ) -> Vec<TemporalRelation> {
        temporal::infer_chains(&self.temporal, source, target, relation_type, &self.config)
    }

    pub fn probabilistic_inference(
        &self,
        source: &Entity,
        target: &Entity,
        relation_type: &str,
    ) -> Vec<ProbabilisticRelation> {
        probabilistic::infer_chains(&self.probabilistic, source, target, relation_type, &self.config)
    }

    pub fn multi_hop_inference(
        &self,
        kg: &KnowledgeGraph,
        start: &str,
        max_hops: usize,
        min_confidence: f64,
    ) -> Vec<Relation> {
        multi_hop::multi_hop_inference(kg, start, max_hops, min_confidence)
    }

    /// Run all three reasoners for one (source, target, type). Multi-hop
    /// explores from `source` with the configured bounds.
    pub fn infer_all(
        &self,
        kg: &KnowledgeGraph,
        source: &Entity,
        target: &Entity,
        relation_type: &str,
    ) -> InferenceReport {
        let report = InferenceReport {
            temporal: self
                .temporal_inference(source, target, relation_type)
                .into_iter()
                .map(|t| t.relation)
                .collect(),
            probabilistic: self
                .probabilistic_inference(source, target, relation_type)
                .into_iter()
                .map(|p| p.relation)
                .collect(),
            multi_hop: self.multi_hop_inference(
                kg,
                &source.id,
                self.config.max_hops,
                self.config.min_confidence,
            ),
        };
        tracing::info!(
            source = %source.id,
            target = %target.id,
            relation_type,
            temporal = report.temporal.len(),
            probabilistic = report.probabilistic.len(),
            multi_hop = report.multi_hop.len(),
            "composite inference"
        );
        report
    }

    /// One line per derived relation.
    pub fn explain(report: &InferenceReport) -> Vec<String> {
        let line = |kind: &str, r: &Relation| {
            format!(
                "{kind}: {} and {} are linked by {} (confidence {:.2})",
                r.source.name, r.target.name, r.relation_type, r.confidence
            )
        };
        let mut lines = Vec::with_capacity(report.len());
        lines.extend(report.temporal.iter().map(|r| line("temporal", r)));
        lines.extend(report.probabilistic.iter().map(|r| line("probabilistic", r)));
        lines.extend(report.multi_hop.iter().map(|r| {
            let hops = r.properties.get_i64("path_length").unwrap_or(0);
            line(&format!("{hops}-hop"), r)
        }));
        lines
    }
}
