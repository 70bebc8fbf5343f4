//! Natural-language-ish structural queries over the knowledge graph.
//!
//! - **Parsing** ([`parse`]): keyword classification and mention extraction
//! - **Execution** ([`engine`]): path, neighbor, subgraph and general search
//! - **Planning** ([`planner`]): cost estimates, step plans, suggestions
//! - **Similarity** ([`similarity`]): TF-IDF cosine over past queries

pub mod engine;
pub mod parse;
pub mod planner;
pub mod similarity;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::cache_key;
use crate::error::ConfigError;
use crate::graph::{Entity, Relation};
use crate::value::Properties;

pub use engine::QueryEngine;
pub use parse::{Mention, ParsedQuery, QueryType};
pub use planner::{PlanStep, PlannerConfig, QueryPlan, QueryPlanner, StepKind, Suggestion};

/// Cache tag for stored query results.
pub const QUERY_DATA_TYPE: &str = "query";

/// Cache key for a query text. Shared by the engine and the planner.
pub fn query_cache_key(text: &str) -> String {
    cache_key("nlq", text.as_bytes())
}

/// Traversal bounds for query execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum hops for path queries (default: 3).
    pub path_cutoff: usize,
    /// BFS depth for neighbor queries (default: 2).
    pub neighbor_depth: usize,
    /// Maximum hops between matched nodes for subgraph queries (default: 2).
    pub subgraph_cutoff: usize,
    /// TTL for cached results; the cache default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ttl_secs: Option<u64>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            path_cutoff: 3,
            neighbor_depth: 2,
            subgraph_cutoff: 2,
            result_ttl_secs: None,
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("path_cutoff", self.path_cutoff),
            ("neighbor_depth", self.neighbor_depth),
            ("subgraph_cutoff", self.subgraph_cutoff),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    message: format!("query.{field} must be at least 1"),
                });
            }
        }
        Ok(())
    }
}

/// A node in a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultNode {
    pub id: String,
    /// Entity properties plus `name` and `type`.
    pub properties: Properties,
}

impl From<&Entity> for ResultNode {
    fn from(e: &Entity) -> Self {
        let mut properties = e.properties.clone();
        properties.insert("name", e.name.as_str());
        properties.insert("type", e.entity_type.as_str());
        Self { id: e.id.clone(), properties }
    }
}

/// An edge in a query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEdge {
    pub source: String,
    pub target: String,
    /// Relation properties plus `relation_type` and `confidence`.
    pub properties: Properties,
}

impl ResultEdge {
    pub fn relation_type(&self) -> Option<&str> {
        self.properties.get_str("relation_type")
    }
}

impl From<&Relation> for ResultEdge {
    fn from(r: &Relation) -> Self {
        let mut properties = r.properties.clone();
        properties.insert("relation_type", r.relation_type.as_str());
        properties.insert("confidence", r.confidence);
        Self {
            source: r.source.id.clone(),
            target: r.target.id.clone(),
            properties,
        }
    }
}

/// Outcome of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub nodes: Vec<ResultNode>,
    pub edges: Vec<ResultEdge>,
    /// Node-id sequences, only filled for path and subgraph queries.
    pub paths: Vec<Vec<String>>,
    /// In [0, 1].
    pub confidence: f64,
    /// Wall-clock seconds spent executing.
    pub execution_time: f64,
    pub query_type: QueryType,
    pub timestamp: DateTime<Utc>,
}

impl QueryResult {
    /// A result with nothing found.
    pub fn empty(query_type: QueryType) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            paths: Vec::new(),
            confidence: 0.0,
            execution_time: 0.0,
            query_type,
            timestamp: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.paths.is_empty()
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_and_prefixed() {
        let a = query_cache_key("path between A and B");
        assert!(a.starts_with("nlq_"));
        assert_eq!(a, query_cache_key("path between A and B"));
        assert_ne!(a, query_cache_key("path between A and C"));
    }

    #[test]
    fn result_serializes_with_lowercase_type() {
        let mut result = QueryResult::empty(QueryType::Neighbors);
        result.nodes.push(ResultNode::from(&Entity::new("A", "Alpha", "concept")));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["query_type"], "neighbors");
        assert_eq!(json["nodes"][0]["properties"]["name"], "Alpha");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let config = QueryConfig { path_cutoff: 0, ..Default::default() };
        assert!(config.validate().is_err());
        assert!(QueryConfig::default().validate().is_ok());
    }
}
