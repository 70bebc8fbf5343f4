//! Temporal chain inference.
//!
//! A chain of relations is temporally valid when every hop ends no later
//! than the next hop starts. Hops without an end time never break a chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{Entity, Relation, TemporalBounds};
use crate::value::Properties;

use super::layer::RelationLayer;
use super::{InferResult, InferenceConfig, geometric_mean};

/// A relation annotated with when it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalRelation {
    pub relation: Relation,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl TemporalRelation {
    /// Annotate a relation, validating it and the interval.
    pub fn new(
        relation: Relation,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        duration_secs: Option<f64>,
    ) -> InferResult<Self> {
        let bounds = TemporalBounds {
            start: start_time,
            end: end_time,
            duration_secs,
        };
        let relation = relation.with_temporal(bounds);
        relation.validate()?;
        Ok(Self {
            relation,
            start_time,
            end_time,
            duration_secs,
        })
    }

    /// Lift a relation that already carries temporal bounds.
    pub fn from_relation(relation: &Relation) -> Option<InferResult<Self>> {
        let bounds = relation.temporal.clone()?;
        Some(Self::new(
            relation.clone(),
            bounds.start,
            bounds.end,
            bounds.duration_secs,
        ))
    }
}

/// Whether each hop ends no later than the following hop starts.
pub fn is_ordered(chain: &[&TemporalRelation]) -> bool {
    chain.windows(2).all(|pair| match pair[0].end_time {
        Some(end) => end <= pair[1].start_time,
        None => true,
    })
}

/// Derive `source -relation_type-> target` from every time-ordered chain of
/// at most `max_path_length` hops in the temporal layer.
///
/// The derived interval spans the earliest start to the latest end; its
/// confidence is the geometric mean of hop confidences. Every ordered chain
/// is emitted, however weak.
pub fn infer_chains(
    layer: &RelationLayer<TemporalRelation>,
    source: &Entity,
    target: &Entity,
    relation_type: &str,
    config: &InferenceConfig,
) -> Vec<TemporalRelation> {
    let mut inferred = Vec::new();

    for chain in layer.paths(&source.id, &target.id, config.max_path_length) {
        if !is_ordered(&chain) {
            continue;
        }
        let confidence = geometric_mean(chain.iter().map(|t| t.relation.confidence));
        let Some(start_time) = chain.iter().map(|t| t.start_time).min() else {
            continue;
        };
        let end_time = chain.iter().filter_map(|t| t.end_time).max();

        let properties = Properties::new()
            .with("inferred", true)
            .with("inference", "temporal")
            .with("path_length", chain.len());
        let relation = Relation::derived(
            source.clone(),
            target.clone(),
            relation_type,
            confidence,
            properties,
        )
        .with_temporal(TemporalBounds {
            start: start_time,
            end: end_time,
            duration_secs: None,
        });

        inferred.push(TemporalRelation {
            relation,
            start_time,
            end_time,
            duration_secs: None,
        });
    }

    tracing::debug!(
        source = %source.id,
        target = %target.id,
        inferred = inferred.len(),
        "temporal inference"
    );
    inferred
}
