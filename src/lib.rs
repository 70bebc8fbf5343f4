// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # kg-reason
//!
//! Reasoning and query core for knowledge graphs built by an upstream
//! entity/relation extractor.
//!
//! ## Architecture
//!
//! - **Graph store** (`graph`): petgraph digraph with id and relation-type indexes
//! - **Rule inference** (`infer::rule_engine`): single-pass two-hop composition
//! - **Advanced inference** (`infer::advanced`): temporal, probabilistic and multi-hop chains
//! - **Cache** (`cache`): TTL and byte-budget bounded, over memory, file or redb media
//! - **Queries** (`query`): keyword classification, path/neighbor/subgraph search, planning
//!
//! ## Library usage
//!
//! ```no_run
//! use kg_reason::config::ReasonerConfig;
//! use kg_reason::engine::Engine;
//! use kg_reason::graph::ExtractionBatch;
//!
//! let json = std::fs::read_to_string("batch.json").unwrap();
//! let batch: ExtractionBatch = serde_json::from_str(&json).unwrap();
//! let engine = Engine::new(ReasonerConfig::default(), &batch).unwrap();
//!
//! let derived = engine.infer_rules().derived;
//! engine.materialize(&derived).unwrap();
//! let result = engine.query("relation between Sun and Star", true).unwrap();
//! println!("{} paths, confidence {:.2}", result.paths.len(), result.confidence);
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod infer;
pub mod query;
pub mod value;
