//! Auxiliary relation graphs keyed by entity id.
//!
//! A layer holds at most one payload per ordered (source, target) pair; a
//! later insert for the same pair replaces the earlier payload.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::graph::traverse;

/// A directed graph of entity ids whose edges carry `T`.
#[derive(Debug, Clone)]
pub struct RelationLayer<T> {
    graph: DiGraph<String, T>,
    index: HashMap<String, NodeIndex>,
}

impl<T> Default for RelationLayer<T> {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> RelationLayer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.index.insert(id.to_string(), idx);
        idx
    }

    /// Insert or replace the payload for `source -> target`.
    /// Returns the replaced payload, if any.
    pub fn insert(&mut self, source: &str, target: &str, payload: T) -> Option<T> {
        let s = self.ensure_node(source);
        let t = self.ensure_node(target);
        match self.graph.find_edge(s, t) {
            Some(edge) => Some(std::mem::replace(&mut self.graph[edge], payload)),
            None => {
                self.graph.add_edge(s, t, payload);
                None
            }
        }
    }

    /// Payload for `source -> target`.
    pub fn edge(&self, source: &str, target: &str) -> Option<&T> {
        let (s, t) = (self.index.get(source)?, self.index.get(target)?);
        let edge = self.graph.find_edge(*s, *t)?;
        self.graph.edge_weight(edge)
    }

    /// Payload sequences along every simple path of at most `max_hops` edges.
    pub fn paths(&self, source: &str, target: &str, max_hops: usize) -> Vec<Vec<&T>> {
        let (Some(&s), Some(&t)) = (self.index.get(source), self.index.get(target)) else {
            return vec![];
        };
        traverse::simple_paths(&self.graph, s, t, max_hops)
            .into_iter()
            .filter_map(|nodes| {
                nodes
                    .windows(2)
                    .map(|pair| {
                        let edge = self.graph.find_edge(pair[0], pair[1])?;
                        self.graph.edge_weight(edge)
                    })
                    .collect::<Option<Vec<&T>>>()
            })
            .collect()
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_insert_replaces_pair() {
        let mut layer = RelationLayer::new();
        assert_eq!(layer.insert("a", "b", 1), None);
        assert_eq!(layer.insert("a", "b", 2), Some(1));
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.edge("a", "b"), Some(&2));
        assert_eq!(layer.edge("b", "a"), None);
    }

    #[test]
    fn paths_map_to_payloads() {
        let mut layer = RelationLayer::new();
        layer.insert("a", "b", "ab");
        layer.insert("b", "c", "bc");
        layer.insert("a", "c", "ac");

        let mut paths = layer.paths("a", "c", 5);
        paths.sort();
        assert_eq!(paths, vec![vec![&"ab", &"bc"], vec![&"ac"]]);
        assert_eq!(layer.paths("a", "c", 1), vec![vec![&"ac"]]);
        assert!(layer.paths("a", "zzz", 5).is_empty());
    }
}
