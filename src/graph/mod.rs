//! Knowledge graph: entities (nodes) and typed, weighted relations (edges).
//!
//! - **Data model**: [`Entity`], [`Relation`], [`TemporalBounds`]
//! - **Store** ([`KnowledgeGraph`]): petgraph-backed directed graph with id and
//!   relation-type indexes
//! - **Traversal** ([`traverse`]): bounded simple paths and BFS neighborhoods
//! - **Analytics** ([`analytics`]): degree centrality and density
//!
//! Reasoning components only read a graph; they return new [`Relation`] values
//! instead of mutating it.

pub mod analytics;
pub mod index;
pub mod traverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::value::Properties;

pub use index::{GraphResult, KnowledgeGraph};

/// A typed, named node. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier within a snapshot.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Type tag (e.g. `person`, `concept`).
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Reject entities with empty required fields.
    pub fn validate(&self) -> GraphResult<()> {
        if self.id.trim().is_empty() {
            return Err(GraphError::MissingField { kind: "entity", field: "id" });
        }
        if self.name.trim().is_empty() {
            return Err(GraphError::MissingField { kind: "entity", field: "name" });
        }
        if self.entity_type.trim().is_empty() {
            return Err(GraphError::MissingField { kind: "entity", field: "type" });
        }
        Ok(())
    }
}

/// When a relation holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalBounds {
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Duration in seconds, when the extractor reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl TemporalBounds {
    pub fn starting(start: DateTime<Utc>) -> Self {
        Self { start, end: None, duration_secs: None }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end: Some(end), duration_secs: None }
    }
}

/// A typed, confidence-weighted directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: Entity,
    pub target: Entity,
    pub relation_type: String,
    /// Belief strength in [0.0, 1.0].
    pub confidence: f64,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalBounds>,
}

impl Relation {
    /// Create a validated relation with empty properties.
    pub fn new(
        source: Entity,
        target: Entity,
        relation_type: impl Into<String>,
        confidence: f64,
    ) -> GraphResult<Self> {
        let relation = Self {
            source,
            target,
            relation_type: relation_type.into(),
            confidence,
            properties: Properties::new(),
            temporal: None,
        };
        relation.validate()?;
        Ok(relation)
    }

    /// Build a relation produced by inference. Confidence is computed from
    /// values already in [0, 1], so no validation round-trip is needed.
    pub(crate) fn derived(
        source: Entity,
        target: Entity,
        relation_type: impl Into<String>,
        confidence: f64,
        properties: Properties,
    ) -> Self {
        debug_assert!((0.0..=1.0).contains(&confidence), "derived confidence {confidence}");
        Self {
            source,
            target,
            relation_type: relation_type.into(),
            confidence,
            properties,
            temporal: None,
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_temporal(mut self, temporal: TemporalBounds) -> Self {
        self.temporal = Some(temporal);
        self
    }

    /// Check confidence range, required fields and interval ordering.
    pub fn validate(&self) -> GraphResult<()> {
        self.source.validate()?;
        self.target.validate()?;
        if self.relation_type.trim().is_empty() {
            return Err(GraphError::MissingField { kind: "relation", field: "relation_type" });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(GraphError::InvalidConfidence {
                context: format!("relation {}", self.describe()),
                value: self.confidence,
            });
        }
        if let Some(bounds) = &self.temporal {
            if bounds.end.is_some_and(|end| end < bounds.start) {
                return Err(GraphError::InvalidInterval { relation: self.describe() });
            }
        }
        Ok(())
    }

    /// Whether this relation was produced by an inference component.
    pub fn is_inferred(&self) -> bool {
        self.properties.get_bool("inferred").unwrap_or(false)
    }

    /// The rule that produced this relation, if it came from the rule engine.
    pub fn rule_id(&self) -> Option<&str> {
        self.properties.get_str("rule_id")
    }

    /// `source -type-> target`, for logs and error messages.
    pub fn describe(&self) -> String {
        format!("{} -{}-> {}", self.source.id, self.relation_type, self.target.id)
    }
}

/// Relation as supplied by the extractor: endpoints named by entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub source: String,
    pub target: String,
    pub relation_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalBounds>,
}

/// The hand-off from the extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionBatch {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<RelationRecord>,
}

impl ExtractionBatch {
    /// Resolve every record against the batch's entity list.
    ///
    /// Fails on the first unknown endpoint or invalid relation.
    pub fn resolve_relations(&self) -> GraphResult<Vec<Relation>> {
        let by_id: std::collections::HashMap<&str, &Entity> =
            self.entities.iter().map(|e| (e.id.as_str(), e)).collect();
        let lookup = |id: &str| {
            by_id
                .get(id)
                .map(|e| (*e).clone())
                .ok_or_else(|| GraphError::UnknownEntity { id: id.to_string() })
        };

        self.relations
            .iter()
            .map(|rec| {
                let relation = Relation {
                    source: lookup(&rec.source)?,
                    target: lookup(&rec.target)?,
                    relation_type: rec.relation_type.clone(),
                    confidence: rec.confidence,
                    properties: rec.properties.clone(),
                    temporal: rec.temporal.clone(),
                };
                relation.validate()?;
                Ok(relation)
            })
            .collect()
    }
}

/// Edge payload stored on petgraph edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    pub relation_type: String,
    pub confidence: f64,
    pub properties: Properties,
    pub temporal: Option<TemporalBounds>,
}

impl From<&Relation> for EdgeData {
    fn from(r: &Relation) -> Self {
        Self {
            relation_type: r.relation_type.clone(),
            confidence: r.confidence,
            properties: r.properties.clone(),
            temporal: r.temporal.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entity(id: &str) -> Entity {
        Entity::new(id, id, "concept")
    }

    #[test]
    fn relation_rejects_out_of_range_confidence() {
        let err = Relation::new(entity("A"), entity("B"), "is_a", 1.2).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfidence { .. }));
        let err = Relation::new(entity("A"), entity("B"), "is_a", -0.1).unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfidence { .. }));
        assert!(Relation::new(entity("A"), entity("B"), "is_a", 1.0).is_ok());
    }

    #[test]
    fn entity_requires_fields() {
        let err = Entity::new("", "x", "t").validate().unwrap_err();
        assert!(matches!(err, GraphError::MissingField { field: "id", .. }));
        let err = Relation::new(entity("A"), entity("B"), " ", 0.5).unwrap_err();
        assert!(matches!(err, GraphError::MissingField { field: "relation_type", .. }));
    }

    #[test]
    fn reversed_interval_is_rejected() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let rel = Relation::new(entity("A"), entity("B"), "precedes", 0.9)
            .unwrap()
            .with_temporal(TemporalBounds::between(start, end));
        assert!(matches!(rel.validate(), Err(GraphError::InvalidInterval { .. })));
    }

    #[test]
    fn batch_resolves_endpoints() {
        let json = r#"{
            "entities": [
                {"id": "E1", "name": "Wheel", "type": "part"},
                {"id": "E2", "name": "Car", "type": "vehicle"}
            ],
            "relations": [
                {"source": "E1", "target": "E2", "relation_type": "part_of", "confidence": 0.9}
            ]
        }"#;
        let batch: ExtractionBatch = serde_json::from_str(json).unwrap();
        let relations = batch.resolve_relations().unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].source.name, "Wheel");
        assert_eq!(relations[0].target.entity_type, "vehicle");
    }

    #[test]
    fn batch_with_unknown_endpoint_fails() {
        let batch = ExtractionBatch {
            entities: vec![entity("E1")],
            relations: vec![RelationRecord {
                source: "E1".into(),
                target: "E9".into(),
                relation_type: "is_a".into(),
                confidence: 0.5,
                properties: Properties::new(),
                temporal: None,
            }],
        };
        let err = batch.resolve_relations().unwrap_err();
        assert!(matches!(err, GraphError::UnknownEntity { ref id } if id == "E9"));
    }
}
