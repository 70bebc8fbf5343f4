//! Query planning: cost estimates, step lists and follow-up suggestions.
//!
//! The planner never executes a query. It classifies the text the same way
//! the [`QueryEngine`](super::QueryEngine) does, prices the work against the
//! current graph shape, and remembers what it planned so later queries can
//! be matched against history.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::error::{ConfigError, QueryError};
use crate::graph::KnowledgeGraph;
use crate::graph::analytics::central_neighbors;
use crate::value::{Properties, PropertyValue};

use super::parse::{ParsedQuery, QueryType, parse};
use super::query_cache_key;
use super::similarity::similarities;

/// Lower bound on any plan's total cost.
const MIN_PLAN_COST: f64 = 0.1;

const TEMPLATE_CONFIDENCE: f64 = 0.8;
const STRUCTURE_CONFIDENCE: f64 = 0.7;

/// Neighbors named in a structural suggestion.
const STRUCTURE_NEIGHBORS: usize = 2;

/// Planner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Queries remembered for similarity suggestions (default: 100).
    pub history_capacity: usize,
    /// Minimum TF-IDF cosine for a history suggestion (default: 0.3).
    pub similarity_threshold: f64,
    /// Depth assumed when pricing neighbor queries (default: 2).
    pub neighbor_depth: usize,
    /// Maximum path length recorded in path-search steps (default: 3).
    pub max_path_length: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            similarity_threshold: 0.3,
            neighbor_depth: 2,
            max_path_length: 3,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "planner.history_capacity must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "planner.similarity_threshold must be in [0, 1], got {}",
                    self.similarity_threshold
                ),
            });
        }
        Ok(())
    }
}

/// What a plan step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CacheCheck,
    EntityValidation,
    PathSearch,
    PathRanking,
    NeighborExpansion,
    NeighborFiltering,
    SubgraphExtraction,
    SubgraphOptimization,
    EntitySearch,
    ResultProcessing,
    CacheUpdate,
}

impl StepKind {
    /// Fixed cost of the step, before any structural estimate.
    pub fn fixed_cost(self) -> f64 {
        match self {
            Self::CacheCheck | Self::CacheUpdate => 0.1,
            Self::EntityValidation
            | Self::PathRanking
            | Self::NeighborFiltering
            | Self::ResultProcessing => 0.2,
            Self::SubgraphOptimization => 0.3,
            Self::NeighborExpansion => 0.4,
            Self::PathSearch => 0.5,
            Self::SubgraphExtraction => 0.6,
            Self::EntitySearch => 0.0,
        }
    }
}

/// One step of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub kind: StepKind,
    pub description: String,
    pub estimated_cost: f64,
    #[serde(default)]
    pub parameters: Properties,
}

impl PlanStep {
    fn new(kind: StepKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            estimated_cost: kind.fixed_cost(),
            parameters: Properties::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.parameters.insert(key, value);
        self
    }

    fn plus_cost(mut self, extra: f64) -> Self {
        self.estimated_cost += extra;
        self
    }
}

/// An ordered, priced execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub query_type: QueryType,
    pub steps: Vec<PlanStep>,
    /// Structural estimate carried by the traversal step.
    pub base_cost: f64,
    /// Sum of step costs, less the cache benefit, floored at 0.1.
    pub estimated_cost: f64,
    /// 1 when a result for this exact text is cached, else 0.
    pub cache_hits: usize,
    /// Seconds spent planning.
    pub planning_time: f64,
}

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    History,
    Template,
    Structure,
}

/// A reformulated query worth trying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub original_query: String,
    pub suggested_query: String,
    pub confidence: f64,
    pub explanation: String,
    pub source: SuggestionSource,
}

/// A planned query, kept for similarity suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    pub query_type: QueryType,
    pub mentions: Vec<String>,
    pub estimated_cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// Prices queries and proposes alternatives.
pub struct QueryPlanner {
    graph: Arc<KnowledgeGraph>,
    cache: Arc<Cache>,
    config: PlannerConfig,
    history: Mutex<VecDeque<HistoryEntry>>,
}

impl QueryPlanner {
    pub fn new(graph: Arc<KnowledgeGraph>, cache: Arc<Cache>, config: PlannerConfig) -> Self {
        let history = Mutex::new(VecDeque::with_capacity(config.history_capacity));
        Self { graph, cache, config, history }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<HistoryEntry>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.lock().clear();
    }

    /// Classify `text`, price it, and record it in the history.
    pub fn optimize(&self, text: &str) -> Result<QueryPlan, QueryError> {
        if text.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let start = Instant::now();
        let parsed = parse(text, &self.graph);
        let key = query_cache_key(text);
        let cached = self.cache.contains(&key);

        let base_cost = self.base_cost(&parsed);
        let steps = self.steps(&parsed, &key, base_cost);
        let benefit = if cached { cache_benefit(parsed.query_type) } else { 0.0 };
        let step_total: f64 = steps.iter().map(|s| s.estimated_cost).sum();
        let estimated_cost = (step_total + benefit).max(MIN_PLAN_COST);

        let plan = QueryPlan {
            query_type: parsed.query_type,
            steps,
            base_cost,
            estimated_cost,
            cache_hits: usize::from(cached),
            planning_time: start.elapsed().as_secs_f64(),
        };

        tracing::debug!(
            query = text,
            query_type = %plan.query_type,
            steps = plan.steps.len(),
            estimated_cost = plan.estimated_cost,
            cached,
            "query planned"
        );

        self.remember(HistoryEntry {
            query: text.to_string(),
            query_type: parsed.query_type,
            mentions: parsed.mention_texts(),
            estimated_cost,
            timestamp: Utc::now(),
        });
        Ok(plan)
    }

    /// A zero capacity keeps no history.
    fn remember(&self, entry: HistoryEntry) {
        let capacity = self.config.history_capacity;
        if capacity == 0 {
            return;
        }
        let mut history = self.lock();
        while history.len() >= capacity && history.pop_front().is_some() {}
        history.push_back(entry);
    }

    /// Structural estimate for the query type against the current graph.
    fn base_cost(&self, parsed: &ParsedQuery) -> f64 {
        let nodes = self.graph.node_count() as f64;
        match parsed.query_type {
            QueryType::Path => nodes * 0.4 + parsed.mentions.len() as f64 * 0.3,
            QueryType::Neighbors => {
                self.graph.average_degree() * 0.3 + self.config.neighbor_depth as f64 * 0.4
            }
            QueryType::Subgraph => nodes * 0.5 + self.graph.density() * 0.3,
            QueryType::General => 1.0,
        }
    }

    fn steps(&self, parsed: &ParsedQuery, key: &str, base_cost: f64) -> Vec<PlanStep> {
        let mut steps = vec![
            PlanStep::new(StepKind::CacheCheck, "look up a cached result").with("cache_key", key),
            PlanStep::new(StepKind::EntityValidation, "resolve entity mentions")
                .with("entities", parsed.mention_texts()),
        ];

        match parsed.query_type {
            QueryType::Path => {
                steps.push(
                    PlanStep::new(StepKind::PathSearch, "enumerate simple paths")
                        .with("max_length", self.config.max_path_length)
                        .plus_cost(base_cost),
                );
                steps.push(
                    PlanStep::new(StepKind::PathRanking, "rank paths")
                        .with("criteria", vec!["length", "confidence"]),
                );
            }
            QueryType::Neighbors => {
                steps.push(
                    PlanStep::new(StepKind::NeighborExpansion, "expand neighborhood")
                        .with("depth", self.config.neighbor_depth)
                        .plus_cost(base_cost),
                );
                steps.push(
                    PlanStep::new(StepKind::NeighborFiltering, "filter by relation type")
                        .with("relation_types", parsed.relation_types.clone()),
                );
            }
            QueryType::Subgraph => {
                steps.push(
                    PlanStep::new(StepKind::SubgraphExtraction, "extract connecting subgraph")
                        .with("include_attributes", true)
                        .plus_cost(base_cost),
                );
                steps.push(
                    PlanStep::new(StepKind::SubgraphOptimization, "prune the subgraph")
                        .with("remove_redundant", true),
                );
            }
            QueryType::General => {
                steps.push(
                    PlanStep::new(StepKind::EntitySearch, "match entities and their neighbors")
                        .plus_cost(base_cost),
                );
            }
        }

        steps.push(PlanStep::new(StepKind::ResultProcessing, "assemble the result"));
        steps.push(PlanStep::new(StepKind::CacheUpdate, "store the result"));
        steps
    }

    /// Up to `max` alternatives, highest confidence first.
    ///
    /// Draws on similar past queries, type templates instantiated with the
    /// matched entities, and the most central neighbors of those entities.
    pub fn suggest(&self, text: &str, max: usize) -> Vec<Suggestion> {
        let parsed = parse(text, &self.graph);
        let mut suggestions = self.from_history(text, max);
        suggestions.extend(self.from_template(text, &parsed));
        suggestions.extend(self.from_structure(text, &parsed));

        let mut seen = HashSet::new();
        suggestions.retain(|s| s.suggested_query != text && seen.insert(s.suggested_query.clone()));
        suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        suggestions.truncate(max);
        suggestions
    }

    fn from_history(&self, text: &str, max: usize) -> Vec<Suggestion> {
        let mut corpus: Vec<String> = Vec::new();
        for entry in self.lock().iter() {
            if entry.query != text && !corpus.contains(&entry.query) {
                corpus.push(entry.query.clone());
            }
        }
        if corpus.is_empty() {
            return Vec::new();
        }

        let refs: Vec<&str> = corpus.iter().map(String::as_str).collect();
        let mut scored: Vec<(f64, &str)> = similarities(text, &refs)
            .into_iter()
            .zip(refs.iter().copied())
            .filter(|(sim, _)| *sim > self.config.similarity_threshold)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(max);

        scored
            .into_iter()
            .map(|(sim, past)| Suggestion {
                original_query: text.to_string(),
                suggested_query: past.to_string(),
                confidence: sim.min(1.0),
                explanation: "similar to an earlier query".into(),
                source: SuggestionSource::History,
            })
            .collect()
    }

    fn from_template(&self, text: &str, parsed: &ParsedQuery) -> Option<Suggestion> {
        let names = self.resolved_names(parsed);
        let suggested = match (parsed.query_type, names.as_slice()) {
            (QueryType::Path, [a, b, ..]) => format!("find the relation between {a} and {b}"),
            (QueryType::Neighbors, [a, ..]) => format!("find concepts related to {a}"),
            (QueryType::Subgraph, [a, ..]) => format!("extract the knowledge subgraph about {a}"),
            _ => return None,
        };
        Some(Suggestion {
            original_query: text.to_string(),
            suggested_query: suggested,
            confidence: TEMPLATE_CONFIDENCE,
            explanation: format!("{} query template", parsed.query_type),
            source: SuggestionSource::Template,
        })
    }

    fn from_structure(&self, text: &str, parsed: &ParsedQuery) -> Vec<Suggestion> {
        let mut out = Vec::new();
        for mention in parsed.resolved() {
            let Some(entity) = mention.candidates.first().and_then(|id| self.graph.entity(id))
            else {
                continue;
            };
            let related: Vec<String> =
                central_neighbors(&self.graph, &entity.id, STRUCTURE_NEIGHBORS)
                    .into_iter()
                    .map(|(id, _)| self.graph.entity(&id).map(|e| e.name).unwrap_or(id))
                    .collect();
            if related.is_empty() {
                continue;
            }
            out.push(Suggestion {
                original_query: text.to_string(),
                suggested_query: format!(
                    "analyze the relation between {} and {}",
                    entity.name,
                    related.join(", ")
                ),
                confidence: STRUCTURE_CONFIDENCE,
                explanation: "central neighbors in the graph".into(),
                source: SuggestionSource::Structure,
            });
        }
        out
    }

    /// Display name of the first candidate of each resolved mention.
    fn resolved_names(&self, parsed: &ParsedQuery) -> Vec<String> {
        parsed
            .resolved()
            .filter_map(|m| m.candidates.first())
            .filter_map(|id| self.graph.entity(id))
            .map(|e| e.name)
            .collect()
    }
}

impl std::fmt::Debug for QueryPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPlanner")
            .field("config", &self.config)
            .field("history", &self.lock().len())
            .finish()
    }
}

/// Cost removed from a plan whose result is already cached.
fn cache_benefit(query_type: QueryType) -> f64 {
    match query_type {
        QueryType::Subgraph => -0.4,
        QueryType::Path | QueryType::Neighbors | QueryType::General => -0.5,
    }
}
