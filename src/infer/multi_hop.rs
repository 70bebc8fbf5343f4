//! Bounded multi-hop exploration from a start entity.
//!
//! Depth-first over outgoing edges with an explicit stack. The visited set
//! is path-local: a node is marked on descent and unmarked on backtrack, so
//! distinct paths may share nodes but no path revisits one. Exploration
//! continues past low-confidence prefixes; only emission is gated.

use std::collections::HashSet;

use petgraph::Direction;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::graph::index::EntityGraph;
use crate::graph::{KnowledgeGraph, Relation};
use crate::value::{Properties, PropertyValue};

use super::geometric_mean;

fn outgoing(graph: &EntityGraph, node: NodeIndex) -> std::vec::IntoIter<EdgeIndex> {
    let mut edges: Vec<EdgeIndex> = graph
        .edges_directed(node, Direction::Outgoing)
        .map(|e| e.id())
        .collect();
    edges.sort_unstable();
    edges.into_iter()
}

/// Emit `start -T-> end` for every simple path of 1..=`max_hops` edges whose
/// geometric-mean confidence is at least `min_confidence`. `T` is the type
/// of the path's last hop.
///
/// Properties record `path_length` (edge count) and `intermediate_nodes`.
/// An unknown start entity yields nothing.
pub fn multi_hop_inference(
    kg: &KnowledgeGraph,
    start: &str,
    max_hops: usize,
    min_confidence: f64,
) -> Vec<Relation> {
    let mut inferred = Vec::new();
    let Some(start_idx) = kg.node(start) else {
        return inferred;
    };
    if max_hops == 0 {
        return inferred;
    }

    let graph = kg.graph();
    let start_entity = graph[start_idx].clone();

    let mut path: Vec<EdgeIndex> = Vec::with_capacity(max_hops);
    let mut on_path: HashSet<NodeIndex> = HashSet::from([start_idx]);
    let mut stack = vec![outgoing(&graph, start_idx)];

    while let Some(pending) = stack.last_mut() {
        let Some(edge) = pending.next() else {
            stack.pop();
            if let Some(done) = path.pop() {
                if let Some((_, node)) = graph.edge_endpoints(done) {
                    on_path.remove(&node);
                }
            }
            continue;
        };
        let Some((_, target)) = graph.edge_endpoints(edge) else {
            continue;
        };
        if on_path.contains(&target) {
            continue;
        }

        path.push(edge);
        let confidence = geometric_mean(path.iter().map(|&e| graph[e].confidence));
        if confidence >= min_confidence {
            let intermediate: Vec<PropertyValue> = path[..path.len() - 1]
                .iter()
                .filter_map(|&e| graph.edge_endpoints(e))
                .map(|(_, n)| PropertyValue::from(graph[n].id.as_str()))
                .collect();
            let properties = Properties::new()
                .with("inferred", true)
                .with("inference", "multi_hop")
                .with("path_length", path.len())
                .with("intermediate_nodes", PropertyValue::List(intermediate));
            inferred.push(Relation::derived(
                start_entity.clone(),
                graph[target].clone(),
                graph[edge].relation_type.as_str(),
                confidence,
                properties,
            ));
        }

        if path.len() < max_hops {
            on_path.insert(target);
            stack.push(outgoing(&graph, target));
        } else {
            path.pop();
        }
    }

    tracing::debug!(start, max_hops, inferred = inferred.len(), "multi-hop inference");
    inferred
}
