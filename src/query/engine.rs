//! Query execution: classify, dispatch to a structural search, score, cache.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::Cache;
use crate::error::QueryError;
use crate::graph::KnowledgeGraph;
use crate::graph::traverse::{NeighborhoodConfig, bfs_neighborhood};

use super::parse::{ParsedQuery, QueryType, parse};
use super::{QUERY_DATA_TYPE, QueryConfig, QueryResult, ResultEdge, ResultNode, query_cache_key};

/// Path count at which a path query reaches full confidence.
const PATH_SATURATION: f64 = 5.0;

/// Discovered nodes per unit of depth at which a neighbor query saturates.
const NEIGHBORS_PER_DEPTH: f64 = 10.0;

/// Answers text queries against a shared graph, memoizing results.
pub struct QueryEngine {
    graph: Arc<KnowledgeGraph>,
    cache: Arc<Cache>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(graph: Arc<KnowledgeGraph>, cache: Arc<Cache>, config: QueryConfig) -> Self {
        Self { graph, cache, config }
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Answer a query. Cached results are returned as stored.
    pub fn query(&self, text: &str, use_cache: bool) -> Result<QueryResult, QueryError> {
        if text.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let key = query_cache_key(text);
        if use_cache {
            if let Some(hit) = self.cache.get_json::<QueryResult>(&key) {
                tracing::debug!(query = text, "query served from cache");
                return Ok(hit);
            }
        }

        let start = Instant::now();
        let parsed = parse(text, &self.graph);
        tracing::debug!(
            query = text,
            query_type = %parsed.query_type,
            mentions = parsed.mentions.len(),
            relation_types = ?parsed.relation_types,
            "query parsed"
        );
        let mut result = self.execute(&parsed);
        result.execution_time = start.elapsed().as_secs_f64();

        tracing::info!(
            query_type = %result.query_type,
            nodes = result.nodes.len(),
            edges = result.edges.len(),
            paths = result.paths.len(),
            confidence = result.confidence,
            "query executed"
        );

        if use_cache {
            let ttl = self.config.result_ttl_secs.map(Duration::from_secs);
            self.cache.set_json(&key, &result, ttl, QUERY_DATA_TYPE);
        }
        Ok(result)
    }

    /// Run an already parsed query.
    pub fn execute(&self, parsed: &ParsedQuery) -> QueryResult {
        match parsed.query_type {
            QueryType::Path => {
                let mut resolved = parsed.resolved();
                match (resolved.next(), resolved.next()) {
                    (Some(from), Some(to)) => {
                        self.find_paths(&from.candidates, &to.candidates, self.config.path_cutoff)
                    }
                    _ => QueryResult::empty(QueryType::Path),
                }
            }
            QueryType::Neighbors => self.find_neighbors(
                &parsed.matched_nodes(),
                &parsed.relation_types,
                self.config.neighbor_depth,
            ),
            QueryType::Subgraph => self.subgraph(
                &parsed.matched_nodes(),
                self.config.subgraph_cutoff,
                parsed.coverage(),
            ),
            QueryType::General => self.general(
                &parsed.matched_nodes(),
                &parsed.relation_types,
                parsed.coverage(),
            ),
        }
    }

    /// Simple paths of at most `max_hops` from every source to every target.
    ///
    /// Confidence is `min(1, paths / 5)`.
    pub fn find_paths(&self, sources: &[String], targets: &[String], max_hops: usize) -> QueryResult {
        let mut paths = Vec::new();
        for source in sources {
            for target in targets {
                if source != target {
                    paths.extend(self.graph.simple_paths(source, target, max_hops));
                }
            }
        }
        let confidence = (paths.len() as f64 / PATH_SATURATION).min(1.0);
        let mut result = self.from_paths(QueryType::Path, paths);
        result.confidence = confidence;
        result
    }

    /// Breadth-first expansion from `seeds` in both directions.
    ///
    /// An empty `relation_types` follows every edge. Confidence is
    /// `min(1, discovered / (10 * depth))`, where seeds are not counted.
    pub fn find_neighbors(
        &self,
        seeds: &[String],
        relation_types: &[String],
        depth: usize,
    ) -> QueryResult {
        let known: Vec<String> = seeds
            .iter()
            .filter(|s| self.graph.has_entity(s))
            .cloned()
            .collect();
        if known.is_empty() {
            return QueryResult::empty(QueryType::Neighbors);
        }

        let depth = depth.max(1);
        let config = NeighborhoodConfig {
            max_depth: depth,
            type_filter: relation_types.iter().cloned().collect(),
        };
        let hood = bfs_neighborhood(&self.graph, &known, &config);

        let mut result = QueryResult::empty(QueryType::Neighbors);
        result.nodes = self.nodes(known.iter().chain(&hood.discovered));
        result.edges = hood.relations.iter().map(ResultEdge::from).collect();
        result.confidence =
            (hood.discovered.len() as f64 / (NEIGHBORS_PER_DEPTH * depth as f64)).min(1.0);
        result
    }

    /// Union of simple paths of at most `max_hops` between every pair of
    /// `ids`, in both directions.
    ///
    /// Confidence is `(coverage + density) / 2`, where coverage is the
    /// fraction of `ids` present in the graph.
    pub fn extract_subgraph(&self, ids: &[String], max_hops: usize) -> QueryResult {
        let coverage = self.coverage(ids);
        self.subgraph(ids, max_hops, coverage)
    }

    /// Matched nodes plus their one-hop neighbors through edges of the
    /// requested types (any type when none are requested).
    ///
    /// Confidence is `(entity coverage + relation coverage) / 2`, where
    /// relation coverage is the fraction of requested types present among
    /// the returned edges, and zero when no types are requested.
    pub fn general_search(&self, ids: &[String], relation_types: &[String]) -> QueryResult {
        let coverage = self.coverage(ids);
        self.general(ids, relation_types, coverage)
    }

    fn subgraph(&self, ids: &[String], max_hops: usize, coverage: f64) -> QueryResult {
        let mut paths = Vec::new();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                paths.extend(self.graph.simple_paths(a, b, max_hops));
                paths.extend(self.graph.simple_paths(b, a, max_hops));
            }
        }
        if paths.is_empty() {
            return QueryResult::empty(QueryType::Subgraph);
        }

        let mut result = self.from_paths(QueryType::Subgraph, paths);
        let density = edge_density(result.nodes.len(), &result.edges);
        result.confidence = ((coverage + density) / 2.0).clamp(0.0, 1.0);
        result
    }

    fn general(&self, ids: &[String], relation_types: &[String], coverage: f64) -> QueryResult {
        let matched: Vec<&String> = ids.iter().filter(|id| self.graph.has_entity(id)).collect();
        if matched.is_empty() {
            return QueryResult::empty(QueryType::General);
        }

        let wanted: HashSet<&str> = relation_types.iter().map(String::as_str).collect();
        let mut node_ids: Vec<String> = matched.iter().map(|id| id.to_string()).collect();
        let mut seen_nodes: HashSet<String> = node_ids.iter().cloned().collect();
        let mut seen_edges = HashSet::new();
        let mut edges = Vec::new();
        let mut found_types: HashSet<String> = HashSet::new();

        for id in &matched {
            let touching = self.graph.outgoing(id).into_iter().chain(self.graph.incoming(id));
            for relation in touching {
                if !wanted.is_empty() && !wanted.contains(relation.relation_type.as_str()) {
                    continue;
                }
                let key = (
                    relation.source.id.clone(),
                    relation.target.id.clone(),
                    relation.relation_type.clone(),
                );
                if !seen_edges.insert(key) {
                    continue;
                }
                let other = if relation.source.id == **id {
                    &relation.target.id
                } else {
                    &relation.source.id
                };
                if seen_nodes.insert(other.clone()) {
                    node_ids.push(other.clone());
                }
                found_types.insert(relation.relation_type.clone());
                edges.push(ResultEdge::from(&relation));
            }
        }

        let relation_coverage = if wanted.is_empty() {
            0.0
        } else {
            let hit = wanted.iter().filter(|t| found_types.contains(**t)).count();
            hit as f64 / wanted.len() as f64
        };
        let confidence = (coverage + relation_coverage) / 2.0;

        let mut result = QueryResult::empty(QueryType::General);
        result.nodes = self.nodes(node_ids.iter());
        result.edges = edges;
        result.confidence = confidence.clamp(0.0, 1.0);
        result
    }

    /// Materialize node and edge views for a set of paths. Every typed
    /// edge between consecutive path nodes is included once.
    fn from_paths(&self, query_type: QueryType, paths: Vec<Vec<String>>) -> QueryResult {
        let mut node_ids: Vec<&String> = Vec::new();
        let mut seen_nodes = HashSet::new();
        let mut hops: Vec<(&String, &String)> = Vec::new();
        let mut seen_hops = HashSet::new();

        for path in &paths {
            for id in path {
                if seen_nodes.insert(id) {
                    node_ids.push(id);
                }
            }
            for pair in path.windows(2) {
                if seen_hops.insert((&pair[0], &pair[1])) {
                    hops.push((&pair[0], &pair[1]));
                }
            }
        }

        let edges = hops
            .iter()
            .flat_map(|(s, t)| self.graph.relations_between(s, t))
            .map(|r| ResultEdge::from(&r))
            .collect();

        let mut result = QueryResult::empty(query_type);
        result.nodes = self.nodes(node_ids.into_iter());
        result.edges = edges;
        result.paths = paths;
        result
    }

    fn nodes<'a>(&self, ids: impl Iterator<Item = &'a String>) -> Vec<ResultNode> {
        ids.filter_map(|id| self.graph.entity(id))
            .map(|e| ResultNode::from(&e))
            .collect()
    }

    fn coverage(&self, ids: &[String]) -> f64 {
        if ids.is_empty() {
            return 0.0;
        }
        let known = ids.iter().filter(|id| self.graph.has_entity(id)).count();
        known as f64 / ids.len() as f64
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("nodes", &self.graph.node_count())
            .field("config", &self.config)
            .finish()
    }
}

/// Distinct directed node pairs joined by an edge, over `n * (n - 1)`.
fn edge_density(n: usize, edges: &[ResultEdge]) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let pairs: HashSet<(&str, &str)> = edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    pairs.len() as f64 / (n * (n - 1)) as f64
}
