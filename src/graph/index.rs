//! In-memory knowledge graph with id and relation-type indexes.
//!
//! Uses `petgraph` for the graph structure and `DashMap` for fast lookups
//! by entity id or relation type.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use dashmap::DashMap;
use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::GraphError;

use super::{EdgeData, Entity, ExtractionBatch, Relation};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// The petgraph structure underneath a [`KnowledgeGraph`].
pub type EntityGraph = DiGraph<Entity, EdgeData>;

/// In-memory knowledge graph backed by petgraph with dual-indexing.
///
/// At most one edge exists per (source, target, relation type); parallel
/// edges of different types between the same pair are allowed. Insertion
/// takes `&self` so a loader may fill it from several threads; reasoning
/// code only reads.
pub struct KnowledgeGraph {
    /// The directed graph: nodes are entities, edges carry EdgeData.
    graph: RwLock<EntityGraph>,
    /// Entity id → NodeIndex mapping for O(1) node lookups.
    node_index: DashMap<String, NodeIndex>,
    /// Relation type → edges of that type.
    type_index: DashMap<String, Vec<EdgeIndex>>,
    /// Edge count.
    edge_count: AtomicUsize,
}

impl KnowledgeGraph {
    /// Create a new empty knowledge graph.
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(DiGraph::new()),
            node_index: DashMap::new(),
            type_index: DashMap::new(),
            edge_count: AtomicUsize::new(0),
        }
    }

    /// Build a snapshot from an extraction batch.
    pub fn from_batch(batch: &ExtractionBatch) -> GraphResult<Self> {
        let kg = Self::new();
        for entity in &batch.entities {
            kg.add_entity(entity.clone())?;
        }
        for relation in batch.resolve_relations()? {
            kg.add_relation(&relation)?;
        }
        tracing::debug!(
            nodes = kg.node_count(),
            edges = kg.edge_count(),
            "knowledge graph built from batch"
        );
        Ok(kg)
    }

    /// Build a snapshot from relations alone; endpoints become nodes.
    pub fn from_relations(relations: &[Relation]) -> GraphResult<Self> {
        let kg = Self::new();
        for relation in relations {
            kg.add_relation(relation)?;
        }
        Ok(kg)
    }

    /// Read access to the underlying petgraph structure.
    ///
    /// A poisoned lock still holds a consistent graph (writers never leave
    /// it half-updated), so poisoning is ignored.
    pub fn graph(&self) -> RwLockReadGuard<'_, EntityGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// NodeIndex for an entity id. The DashMap guard is dropped before returning.
    pub fn node(&self, id: &str) -> Option<NodeIndex> {
        self.node_index.get(id).map(|idx| *idx.value())
    }

    /// Insert an entity.
    ///
    /// Returns `Ok(true)` when inserted, `Ok(false)` when an identical entity
    /// already exists, and an error when the id is taken by a different entity.
    pub fn add_entity(&self, entity: Entity) -> GraphResult<bool> {
        entity.validate()?;
        let mut graph = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(idx) = self.node(&entity.id) {
            return if graph[idx] == entity {
                Ok(false)
            } else {
                Err(GraphError::DuplicateEntity { id: entity.id })
            };
        }
        let id = entity.id.clone();
        let idx = graph.add_node(entity);
        self.node_index.insert(id, idx);
        Ok(true)
    }

    /// Ensure a node exists for `entity` while the write lock is held.
    /// An existing node with the same id is kept as-is.
    fn ensure_node(&self, graph: &mut EntityGraph, entity: &Entity) -> NodeIndex {
        if let Some(idx) = self.node(&entity.id) {
            return idx;
        }
        let idx = graph.add_node(entity.clone());
        self.node_index.insert(entity.id.clone(), idx);
        idx
    }

    /// Insert a relation, creating missing endpoint nodes.
    ///
    /// Re-adding an existing (source, target, type) replaces its payload.
    pub fn add_relation(&self, relation: &Relation) -> GraphResult<()> {
        relation.validate()?;
        let mut graph = self.graph.write().unwrap_or_else(PoisonError::into_inner);
        let src = self.ensure_node(&mut graph, &relation.source);
        let dst = self.ensure_node(&mut graph, &relation.target);

        let existing = graph
            .edges_connecting(src, dst)
            .find(|e| e.weight().relation_type == relation.relation_type)
            .map(|e| e.id());

        match existing {
            Some(edge) => {
                graph[edge] = EdgeData::from(relation);
            }
            None => {
                let edge = graph.add_edge(src, dst, EdgeData::from(relation));
                self.type_index
                    .entry(relation.relation_type.clone())
                    .or_default()
                    .push(edge);
                self.edge_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Look up an entity by id.
    pub fn entity(&self, id: &str) -> Option<Entity> {
        let idx = self.node(id)?;
        self.graph().node_weight(idx).cloned()
    }

    /// Check if a node exists.
    pub fn has_entity(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// All entities, in insertion order.
    pub fn entities(&self) -> Vec<Entity> {
        self.graph().node_weights().cloned().collect()
    }

    /// Materialize the relation stored on an edge.
    pub(crate) fn relation_at(graph: &EntityGraph, edge: EdgeIndex) -> Option<Relation> {
        let (src, dst) = graph.edge_endpoints(edge)?;
        let data = graph.edge_weight(edge)?;
        Some(Relation {
            source: graph[src].clone(),
            target: graph[dst].clone(),
            relation_type: data.relation_type.clone(),
            confidence: data.confidence,
            properties: data.properties.clone(),
            temporal: data.temporal.clone(),
        })
    }

    /// The relation of the given type from `source` to `target`, if any.
    pub fn relation(&self, source: &str, target: &str, relation_type: &str) -> Option<Relation> {
        let (src, dst) = (self.node(source)?, self.node(target)?);
        let graph = self.graph();
        let edge = graph
            .edges_connecting(src, dst)
            .find(|e| e.weight().relation_type == relation_type)?
            .id();
        Self::relation_at(&graph, edge)
    }

    /// All relations from `source` to `target`, of any type.
    pub fn relations_between(&self, source: &str, target: &str) -> Vec<Relation> {
        let (Some(src), Some(dst)) = (self.node(source), self.node(target)) else {
            return vec![];
        };
        let graph = self.graph();
        graph
            .edges_connecting(src, dst)
            .filter_map(|e| Self::relation_at(&graph, e.id()))
            .collect()
    }

    /// All relations of a given type.
    pub fn relations_of_type(&self, relation_type: &str) -> Vec<Relation> {
        let edges = self
            .type_index
            .get(relation_type)
            .map(|v| v.value().clone())
            .unwrap_or_default();
        let graph = self.graph();
        edges
            .into_iter()
            .filter_map(|e| Self::relation_at(&graph, e))
            .collect()
    }

    /// Every relation in the graph.
    pub fn relations(&self) -> Vec<Relation> {
        let graph = self.graph();
        graph
            .edge_indices()
            .filter_map(|e| Self::relation_at(&graph, e))
            .collect()
    }

    /// Outgoing relations of an entity.
    pub fn outgoing(&self, id: &str) -> Vec<Relation> {
        self.directed_relations(id, Direction::Outgoing)
    }

    /// Incoming relations of an entity.
    pub fn incoming(&self, id: &str) -> Vec<Relation> {
        self.directed_relations(id, Direction::Incoming)
    }

    fn directed_relations(&self, id: &str, dir: Direction) -> Vec<Relation> {
        let Some(idx) = self.node(id) else {
            return vec![];
        };
        let graph = self.graph();
        graph
            .edges_directed(idx, dir)
            .filter_map(|e| Self::relation_at(&graph, e.id()))
            .collect()
    }

    /// Ids of direct successors, without duplicates from parallel edges.
    pub fn successors(&self, id: &str) -> Vec<String> {
        self.adjacent_ids(id, &[Direction::Outgoing])
    }

    /// Ids of direct predecessors, without duplicates from parallel edges.
    pub fn predecessors(&self, id: &str) -> Vec<String> {
        self.adjacent_ids(id, &[Direction::Incoming])
    }

    /// Ids of successors and predecessors combined.
    pub fn neighbors(&self, id: &str) -> Vec<String> {
        self.adjacent_ids(id, &[Direction::Outgoing, Direction::Incoming])
    }

    fn adjacent_ids(&self, id: &str, dirs: &[Direction]) -> Vec<String> {
        let Some(idx) = self.node(id) else {
            return vec![];
        };
        let graph = self.graph();
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for &dir in dirs {
            for n in graph.neighbors_directed(idx, dir) {
                if seen.insert(n) {
                    out.push(graph[n].id.clone());
                }
            }
        }
        out
    }

    /// All simple paths from `source` to `target` with at most `max_hops` edges,
    /// as sequences of entity ids. Unknown endpoints yield no paths.
    pub fn simple_paths(&self, source: &str, target: &str, max_hops: usize) -> Vec<Vec<String>> {
        let (Some(src), Some(dst)) = (self.node(source), self.node(target)) else {
            return vec![];
        };
        let graph = self.graph();
        super::traverse::simple_paths(&graph, src, dst, max_hops)
            .into_iter()
            .map(|path| path.into_iter().map(|n| graph[n].id.clone()).collect())
            .collect()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.node_index.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count.load(Ordering::Relaxed)
    }

    /// Directed density: connected ordered pairs over `n (n - 1)`.
    /// Parallel edges of different types count once, so the value stays
    /// within [0, 1]. Zero for fewer than two nodes.
    pub fn density(&self) -> f64 {
        let n = self.node_count() as f64;
        if n < 2.0 {
            return 0.0;
        }
        let graph = self.graph();
        let pairs: HashSet<(NodeIndex, NodeIndex)> = graph
            .edge_references()
            .filter(|e| e.source() != e.target())
            .map(|e| (e.source(), e.target()))
            .collect();
        pairs.len() as f64 / (n * (n - 1.0))
    }

    /// Average out-degree `m / n`; zero for an empty graph.
    pub fn average_degree(&self) -> f64 {
        match self.node_count() {
            0 => 0.0,
            n => self.edge_count() as f64 / n as f64,
        }
    }

    /// Relation types present in the graph.
    pub fn relation_types(&self) -> Vec<String> {
        self.type_index.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
