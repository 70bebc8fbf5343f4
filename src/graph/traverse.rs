//! Bounded graph traversal: simple-path enumeration and BFS neighborhoods.
//!
//! Every traversal takes a mandatory bound. Simple-path enumeration is
//! worst-case exponential on dense cyclic graphs.

use std::collections::{HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use super::Relation;
use super::index::KnowledgeGraph;

/// Distinct successors of a node in index order.
///
/// Parallel edges collapse so they never produce duplicate node paths.
fn distinct_successors<N, E>(graph: &DiGraph<N, E>, node: NodeIndex) -> Vec<NodeIndex> {
    let mut next: Vec<NodeIndex> = graph.neighbors_directed(node, Direction::Outgoing).collect();
    next.sort_unstable();
    next.dedup();
    next
}

/// Enumerate all simple directed paths from `from` to `to` with at most
/// `max_hops` edges.
///
/// Uses an explicit stack of pending successor lists plus a path-local
/// visited set, so depth is bounded by `max_hops` rather than the call stack.
/// A path from a node to itself is never reported.
pub fn simple_paths<N, E>(
    graph: &DiGraph<N, E>,
    from: NodeIndex,
    to: NodeIndex,
    max_hops: usize,
) -> Vec<Vec<NodeIndex>> {
    let mut paths = Vec::new();
    if from == to || max_hops == 0 {
        return paths;
    }

    let mut path = vec![from];
    let mut on_path: HashSet<NodeIndex> = HashSet::from([from]);
    let mut stack = vec![distinct_successors(graph, from).into_iter()];

    while let Some(pending) = stack.last_mut() {
        match pending.next() {
            Some(next) if on_path.contains(&next) => {}
            Some(next) if next == to => {
                let mut found = path.clone();
                found.push(to);
                paths.push(found);
            }
            Some(next) => {
                // `path.len()` edges after descending; leave room for one more.
                if path.len() < max_hops {
                    path.push(next);
                    on_path.insert(next);
                    stack.push(distinct_successors(graph, next).into_iter());
                }
            }
            None => {
                stack.pop();
                if let Some(done) = path.pop() {
                    on_path.remove(&done);
                }
            }
        }
    }
    paths
}

/// Configuration for a breadth-first neighborhood expansion.
#[derive(Debug, Clone)]
pub struct NeighborhoodConfig {
    /// Maximum hop depth from the seed nodes.
    pub max_depth: usize,
    /// Only follow edges of these relation types (empty = follow all).
    pub type_filter: HashSet<String>,
}

impl Default for NeighborhoodConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            type_filter: HashSet::new(),
        }
    }
}

/// Result of a neighborhood expansion.
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    /// Nodes reached from the seeds, in discovery order. Seeds are excluded.
    pub discovered: Vec<String>,
    /// Edges used to reach each discovered node.
    pub relations: Vec<Relation>,
    /// Maximum depth actually reached.
    pub depth_reached: usize,
}

/// Expand outward from `seeds` along edges in both directions.
///
/// A node is discovered the first time any seed's frontier reaches it
/// through an edge whose type passes the filter. Unknown seeds are ignored.
pub fn bfs_neighborhood(
    kg: &KnowledgeGraph,
    seeds: &[String],
    config: &NeighborhoodConfig,
) -> Neighborhood {
    let seed_nodes: Vec<NodeIndex> = seeds.iter().filter_map(|s| kg.node(s)).collect();
    let graph = kg.graph();

    let mut visited: HashSet<NodeIndex> = seed_nodes.iter().copied().collect();
    let mut queue: VecDeque<(NodeIndex, usize)> =
        seed_nodes.iter().map(|&n| (n, 0)).collect();
    let mut used_edges: HashSet<EdgeIndex> = HashSet::new();
    let mut result = Neighborhood::default();

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= config.max_depth {
            continue;
        }
        let edges = graph
            .edges_directed(node, Direction::Outgoing)
            .chain(graph.edges_directed(node, Direction::Incoming));
        for edge in edges {
            if !config.type_filter.is_empty()
                && !config.type_filter.contains(&edge.weight().relation_type)
            {
                continue;
            }
            let other = if edge.source() == node {
                edge.target()
            } else {
                edge.source()
            };
            if !visited.insert(other) {
                continue;
            }
            if used_edges.insert(edge.id()) {
                if let Some(rel) = KnowledgeGraph::relation_at(&graph, edge.id()) {
                    result.relations.push(rel);
                }
            }
            result.discovered.push(graph[other].id.clone());
            result.depth_reached = result.depth_reached.max(depth + 1);
            queue.push_back((other, depth + 1));
        }
    }

    tracing::debug!(
        seeds = seeds.len(),
        discovered = result.discovered.len(),
        depth = result.depth_reached,
        "neighborhood expanded"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Entity;

    fn rel(s: &str, t: &str, ty: &str) -> Relation {
        Relation::new(Entity::new(s, s, "concept"), Entity::new(t, t, "concept"), ty, 0.9)
            .unwrap()
    }

    fn build(edges: &[(&str, &str, &str)]) -> KnowledgeGraph {
        let kg = KnowledgeGraph::new();
        for (s, t, ty) in edges {
            kg.add_relation(&rel(s, t, ty)).unwrap();
        }
        kg
    }

    #[test]
    fn two_routes_are_both_found() {
        let kg = build(&[("A", "B", "r"), ("B", "C", "r"), ("A", "D", "r"), ("D", "C", "r")]);
        let mut paths = kg.simple_paths("A", "C", 3);
        paths.sort();
        assert_eq!(
            paths,
            vec![
                vec!["A".to_string(), "B".into(), "C".into()],
                vec!["A".to_string(), "D".into(), "C".into()],
            ]
        );
    }

    #[test]
    fn cutoff_limits_path_length() {
        let kg = build(&[("A", "B", "r"), ("B", "C", "r"), ("C", "D", "r"), ("A", "D", "r")]);
        assert_eq!(kg.simple_paths("A", "D", 1).len(), 1);
        assert_eq!(kg.simple_paths("A", "D", 2).len(), 1);
        assert_eq!(kg.simple_paths("A", "D", 3).len(), 2);
        assert!(kg.simple_paths("A", "D", 0).is_empty());
    }

    #[test]
    fn cycles_do_not_repeat_nodes() {
        let kg = build(&[("A", "B", "r"), ("B", "A", "r"), ("B", "C", "r"), ("C", "A", "r")]);
        let paths = kg.simple_paths("A", "C", 5);
        assert_eq!(paths, vec![vec!["A".to_string(), "B".into(), "C".into()]]);
        for path in &paths {
            let unique: HashSet<_> = path.iter().collect();
            assert_eq!(unique.len(), path.len());
        }
    }

    #[test]
    fn parallel_edges_yield_one_path() {
        let kg = build(&[("A", "B", "part_of"), ("A", "B", "is_a"), ("B", "C", "r")]);
        assert_eq!(kg.simple_paths("A", "C", 3).len(), 1);
    }

    #[test]
    fn neighborhood_is_undirected_and_depth_bounded() {
        let kg = build(&[("A", "B", "r"), ("C", "A", "r"), ("B", "D", "r"), ("D", "E", "r")]);
        let config = NeighborhoodConfig::default();
        let hood = bfs_neighborhood(&kg, &["A".to_string()], &config);

        let found: HashSet<_> = hood.discovered.iter().map(String::as_str).collect();
        assert_eq!(found, HashSet::from(["B", "C", "D"]));
        assert_eq!(hood.relations.len(), 3);
        assert_eq!(hood.depth_reached, 2);
    }

    #[test]
    fn neighborhood_respects_type_filter() {
        let kg = build(&[("A", "B", "causes"), ("A", "C", "part_of"), ("B", "D", "causes")]);
        let config = NeighborhoodConfig {
            max_depth: 2,
            type_filter: HashSet::from(["causes".to_string()]),
        };
        let hood = bfs_neighborhood(&kg, &["A".to_string()], &config);
        assert_eq!(hood.discovered, vec!["B".to_string(), "D".to_string()]);
        assert!(hood.relations.iter().all(|r| r.relation_type == "causes"));
    }

    #[test]
    fn unknown_seed_finds_nothing() {
        let kg = build(&[("A", "B", "r")]);
        let hood = bfs_neighborhood(&kg, &["Z".to_string()], &NeighborhoodConfig::default());
        assert!(hood.discovered.is_empty());
        assert_eq!(hood.depth_reached, 0);
    }
}
