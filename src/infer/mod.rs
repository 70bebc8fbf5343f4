//! Inference over the knowledge graph.
//!
//! - **Rules** ([`rules`], [`rule_engine`]): declarative two-hop composition,
//!   applied once per call
//! - **Temporal** ([`temporal`]): chains of time-ordered relations
//! - **Probabilistic** ([`probabilistic`]): evidence-backed chains combined by
//!   product of probabilities
//! - **Multi-hop** ([`multi_hop`]): bounded depth-first exploration from a start
//!   entity
//! - **Composite** ([`advanced`]): owns the auxiliary graphs and runs all three
//!
//! Every reasoner returns new [`Relation`](crate::graph::Relation) values
//! tagged `inferred = true`; none of them mutates its input.

pub mod advanced;
pub mod layer;
pub mod multi_hop;
pub mod probabilistic;
pub mod rule_engine;
pub mod rules;
pub mod temporal;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, InferError};

pub use advanced::{AdvancedInferenceEngine, InferenceReport};
pub use probabilistic::ProbabilisticRelation;
pub use rule_engine::{RuleEngine, RuleEngineResult, resolve_conflicts};
pub use rules::{InferenceRule, RuleSet};
pub use temporal::TemporalRelation;

/// Result type for inference operations.
pub type InferResult<T> = std::result::Result<T, InferError>;

/// Tuning knobs for the temporal, probabilistic and multi-hop reasoners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Minimum combined probability for a probabilistic chain (default: 0.6).
    pub probability_threshold: f64,
    /// Confidence floor carried with the temporal settings (default: 0.2).
    /// Validated but not applied: ordered temporal chains are always emitted.
    pub min_path_confidence: f64,
    /// Hop cutoff for temporal and probabilistic path search (default: 5).
    pub max_path_length: usize,
    /// Minimum path confidence for multi-hop emission (default: 0.5).
    pub min_confidence: f64,
    /// Depth bound for multi-hop exploration (default: 3).
    pub max_hops: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            probability_threshold: 0.6,
            min_path_confidence: 0.2,
            max_path_length: 5,
            min_confidence: 0.5,
            max_hops: 3,
        }
    }
}

impl InferenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("probability_threshold", self.probability_threshold),
            ("min_path_confidence", self.min_path_confidence),
            ("min_confidence", self.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    message: format!("inference.{name} = {value} is outside [0, 1]"),
                });
            }
        }
        if self.max_path_length == 0 || self.max_hops == 0 {
            return Err(ConfigError::Invalid {
                message: "inference.max_path_length and inference.max_hops must be at least 1"
                    .into(),
            });
        }
        Ok(())
    }
}

/// Geometric mean of confidences. Zero for an empty sequence.
pub(crate) fn geometric_mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (product, n) = values
        .into_iter()
        .fold((1.0_f64, 0usize), |(p, n), v| (p * v, n + 1));
    if n == 0 {
        0.0
    } else {
        product.powf(1.0 / n as f64)
    }
}
