//! Graph analytics: degree centrality.
//!
//! Functions operate on a [`KnowledgeGraph`] reference and return results
//! sorted by relevance (score desc, then id asc for stable output).

use std::collections::HashMap;

use petgraph::Direction;

use super::index::KnowledgeGraph;

// ---------------------------------------------------------------------------
// Degree centrality
// ---------------------------------------------------------------------------

/// Degree centrality metrics for a single node.
#[derive(Debug, Clone, PartialEq)]
pub struct DegreeCentrality {
    /// The entity this measurement belongs to.
    pub id: String,
    /// Number of incoming edges.
    pub in_degree: usize,
    /// Number of outgoing edges.
    pub out_degree: usize,
    /// Total degree normalized by `n - 1`.
    pub score: f64,
}

/// Compute degree centrality for all nodes. Returns sorted by score desc.
///
/// A single-node graph scores zero.
pub fn degree_centrality(kg: &KnowledgeGraph) -> Vec<DegreeCentrality> {
    let graph = kg.graph();
    let n = graph.node_count();
    let norm = if n > 1 { (n - 1) as f64 } else { 1.0 };

    let mut results: Vec<DegreeCentrality> = graph
        .node_indices()
        .map(|idx| {
            let in_degree = graph.edges_directed(idx, Direction::Incoming).count();
            let out_degree = graph.edges_directed(idx, Direction::Outgoing).count();
            let score = if n > 1 { (in_degree + out_degree) as f64 / norm } else { 0.0 };
            DegreeCentrality {
                id: graph[idx].id.clone(),
                in_degree,
                out_degree,
                score,
            }
        })
        .collect();
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    results
}

/// Centrality scores keyed by entity id.
pub fn centrality_map(kg: &KnowledgeGraph) -> HashMap<String, f64> {
    degree_centrality(kg)
        .into_iter()
        .map(|c| (c.id, c.score))
        .collect()
}

/// The `k` most central direct neighbors (either direction) of `id`.
pub fn central_neighbors(kg: &KnowledgeGraph, id: &str, k: usize) -> Vec<(String, f64)> {
    let scores = centrality_map(kg);
    let mut ranked: Vec<(String, f64)> = kg
        .neighbors(id)
        .into_iter()
        .map(|n| {
            let score = scores.get(&n).copied().unwrap_or(0.0);
            (n, score)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, Relation};

    fn build(edges: &[(&str, &str)]) -> KnowledgeGraph {
        let kg = KnowledgeGraph::new();
        for (s, t) in edges {
            let r = Relation::new(
                Entity::new(*s, *s, "concept"),
                Entity::new(*t, *t, "concept"),
                "related_to",
                0.8,
            )
            .unwrap();
            kg.add_relation(&r).unwrap();
        }
        kg
    }

    #[test]
    fn hub_ranks_first() {
        let kg = build(&[("hub", "a"), ("hub", "b"), ("c", "hub"), ("a", "b")]);
        let ranked = degree_centrality(&kg);
        assert_eq!(ranked[0].id, "hub");
        assert_eq!(ranked[0].out_degree, 2);
        assert_eq!(ranked[0].in_degree, 1);
        // 3 edges over n - 1 = 3 other nodes.
        assert!((ranked[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_graph_has_no_scores() {
        assert!(degree_centrality(&KnowledgeGraph::new()).is_empty());
    }

    #[test]
    fn central_neighbors_are_ranked_and_truncated() {
        let kg = build(&[("x", "hub"), ("hub", "a"), ("hub", "b"), ("x", "leaf")]);
        let top = central_neighbors(&kg, "x", 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].0, "hub");
        assert!(central_neighbors(&kg, "missing", 3).is_empty());
    }
}
