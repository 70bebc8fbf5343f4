//! Engine facade: top-level API for the reasoning core.
//!
//! The `Engine` owns one graph snapshot, the result cache and every
//! reasoner built over them. Embedding callers and the CLI go through it.

use std::sync::Arc;

use crate::cache::{Cache, CacheStats};
use crate::config::ReasonerConfig;
use crate::error::{GraphError, InferError, KgResult};
use crate::graph::{ExtractionBatch, KnowledgeGraph, Relation};
use crate::infer::{
    AdvancedInferenceEngine, InferenceReport, RuleEngine, RuleEngineResult, RuleSet,
    resolve_conflicts,
};
use crate::query::{QueryEngine, QueryPlan, QueryPlanner, QueryResult, Suggestion};

/// The reasoning engine.
pub struct Engine {
    config: ReasonerConfig,
    graph: Arc<KnowledgeGraph>,
    cache: Arc<Cache>,
    rules: RuleEngine,
    advanced: AdvancedInferenceEngine,
    query: QueryEngine,
    planner: QueryPlanner,
}

impl Engine {
    /// Build an engine over an extraction batch.
    ///
    /// Validates the configuration, loads the rule file if one is named,
    /// and opens the configured cache.
    pub fn new(config: ReasonerConfig, batch: &ExtractionBatch) -> KgResult<Self> {
        config.validate()?;
        let graph = KnowledgeGraph::from_batch(batch)?;
        let cache = config.open_cache()?;
        Self::from_parts(config, graph, cache)
    }

    /// Build an engine over an existing graph and cache.
    pub fn from_parts(config: ReasonerConfig, graph: KnowledgeGraph, cache: Cache) -> KgResult<Self> {
        config.validate()?;
        let rules = match &config.rules_file {
            Some(path) => load_rules(path)?,
            None => RuleSet::builtin(),
        };
        let relations = graph.relations();
        let advanced = AdvancedInferenceEngine::from_relations(config.inference.clone(), &relations)?;

        let graph = Arc::new(graph);
        let cache = Arc::new(cache);
        let query = QueryEngine::new(Arc::clone(&graph), Arc::clone(&cache), config.query.clone());
        let planner =
            QueryPlanner::new(Arc::clone(&graph), Arc::clone(&cache), config.planner.clone());

        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            rules = rules.len(),
            "initializing reasoning engine"
        );

        Ok(Self {
            config,
            graph,
            cache,
            rules: RuleEngine::new(rules),
            advanced,
            query,
            planner,
        })
    }

    pub fn config(&self) -> &ReasonerConfig {
        &self.config
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn rule_engine(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn rule_engine_mut(&mut self) -> &mut RuleEngine {
        &mut self.rules
    }

    pub fn advanced(&self) -> &AdvancedInferenceEngine {
        &self.advanced
    }

    pub fn advanced_mut(&mut self) -> &mut AdvancedInferenceEngine {
        &mut self.advanced
    }

    pub fn query_engine(&self) -> &QueryEngine {
        &self.query
    }

    pub fn planner(&self) -> &QueryPlanner {
        &self.planner
    }

    /// Apply every active rule once, keeping the most confident relation
    /// per (source, target, type).
    pub fn infer_rules(&self) -> RuleEngineResult {
        let mut result = self.rules.infer_graph(&self.graph);
        result.derived = resolve_conflicts(result.derived);
        result
    }

    /// Temporal, probabilistic and multi-hop inference for one entity pair.
    pub fn infer_advanced(
        &self,
        source: &str,
        target: &str,
        relation_type: &str,
    ) -> KgResult<InferenceReport> {
        let lookup = |id: &str| {
            self.graph
                .entity(id)
                .ok_or_else(|| GraphError::UnknownEntity { id: id.to_string() })
        };
        let (source, target) = (lookup(source)?, lookup(target)?);
        Ok(self.advanced.infer_all(&self.graph, &source, &target, relation_type))
    }

    /// Add derived relations to the graph so later queries see them.
    ///
    /// A relation whose (source, target, type) already exists is skipped.
    /// Cached query results are dropped when anything was added. Returns
    /// the number of relations added.
    pub fn materialize(&self, relations: &[Relation]) -> KgResult<usize> {
        let mut added = 0;
        for relation in relations {
            if self
                .graph
                .relation(&relation.source.id, &relation.target.id, &relation.relation_type)
                .is_some()
            {
                continue;
            }
            self.graph.add_relation(relation)?;
            added += 1;
        }
        if added > 0 {
            self.cache.clear();
            tracing::info!(added, edges = self.graph.edge_count(), "derived relations merged");
        }
        Ok(added)
    }

    pub fn query(&self, text: &str, use_cache: bool) -> KgResult<QueryResult> {
        Ok(self.query.query(text, use_cache)?)
    }

    pub fn plan(&self, text: &str) -> KgResult<QueryPlan> {
        Ok(self.planner.optimize(text)?)
    }

    pub fn suggest(&self, text: &str, max: usize) -> Vec<Suggestion> {
        self.planner.suggest(text, max)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            node_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
            relation_types: self.graph.relation_types(),
            density: self.graph.density(),
            rule_count: self.rules.rules().len(),
            active_rules: self.rules.rules().active().count(),
            cached_items: self.cache.len(),
        }
    }
}

/// Read a rule file; `.json` is parsed as a JSON array, anything else as TOML.
fn load_rules(path: &std::path::Path) -> Result<RuleSet, InferError> {
    let source = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| InferError::RuleParse {
        source_name: source.clone(),
        message: e.to_string(),
    })?;
    if path.extension().is_some_and(|ext| ext == "json") {
        RuleSet::from_json(&text, &source)
    } else {
        RuleSet::from_toml(&text, &source)
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineInfo {
    pub node_count: usize,
    pub edge_count: usize,
    pub relation_types: Vec<String>,
    pub density: f64,
    pub rule_count: usize,
    pub active_rules: usize,
    pub cached_items: usize,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "kg-reason engine info")?;
        writeln!(f, "  nodes:          {}", self.node_count)?;
        writeln!(f, "  edges:          {}", self.edge_count)?;
        writeln!(f, "  density:        {:.4}", self.density)?;
        writeln!(f, "  relation types: {}", self.relation_types.join(", "))?;
        writeln!(f, "  rules:          {} ({} active)", self.rule_count, self.active_rules)?;
        writeln!(f, "  cached items:   {}", self.cached_items)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("graph", &self.graph)
            .field("cache", &self.cache)
            .finish()
    }
}
