//! Rich diagnostic error types for the reasoning core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. "Nothing found" is never an error here:
//! traversals and queries return empty results for that. Errors are reserved
//! for malformed input and failed I/O.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the reasoning core.
#[derive(Debug, Error, Diagnostic)]
pub enum KgError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Infer(#[from] InferError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("{context} confidence {value} is outside [0, 1]")]
    #[diagnostic(
        code(kg::graph::invalid_confidence),
        help(
            "Confidence values must lie in [0.0, 1.0]. They are never clamped; \
             fix the value at the extractor."
        )
    )]
    InvalidConfidence { context: String, value: f64 },

    #[error("missing required field `{field}` on {kind}")]
    #[diagnostic(
        code(kg::graph::missing_field),
        help("Entities need a non-empty id, name and type; relations need a non-empty type.")
    )]
    MissingField { kind: &'static str, field: &'static str },

    #[error("entity `{id}` already exists with different content")]
    #[diagnostic(
        code(kg::graph::duplicate_entity),
        help(
            "Entities are immutable once created. Give the new entity a different id, \
             or load it into a fresh snapshot."
        )
    )]
    DuplicateEntity { id: String },

    #[error("relation references unknown entity `{id}`")]
    #[diagnostic(
        code(kg::graph::unknown_entity),
        help("Every relation endpoint must be listed in the batch's `entities` array.")
    )]
    UnknownEntity { id: String },

    #[error("invalid temporal bounds on {relation}: end precedes start")]
    #[diagnostic(
        code(kg::graph::invalid_interval),
        help("A relation's end time must not be earlier than its start time.")
    )]
    InvalidInterval { relation: String },
}

// ---------------------------------------------------------------------------
// Inference errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum InferError {
    #[error("invalid rule `{rule_id}`: {message}")]
    #[diagnostic(
        code(kg::infer::invalid_rule),
        help(
            "Rules need a non-empty id, two non-empty premise types, a conclusion type, \
             and a confidence factor in (0, 1]."
        )
    )]
    InvalidRule { rule_id: String, message: String },

    #[error("rule `{rule_id}` is already registered")]
    #[diagnostic(
        code(kg::infer::duplicate_rule),
        help("Remove the existing rule first, or pick a different id.")
    )]
    DuplicateRule { rule_id: String },

    #[error("rule `{rule_id}` not found")]
    #[diagnostic(code(kg::infer::unknown_rule), help("List the registered rules to see valid ids."))]
    UnknownRule { rule_id: String },

    #[error("failed to parse rule set from {source_name}: {message}")]
    #[diagnostic(
        code(kg::infer::rule_parse),
        help("Rule files are JSON arrays or TOML documents with a `rules` table array.")
    )]
    RuleParse { source_name: String, message: String },

    #[error("probability {value} is outside [0, 1]")]
    #[diagnostic(
        code(kg::infer::invalid_probability),
        help("Probabilities and evidence confidences must lie in [0.0, 1.0].")
    )]
    InvalidProbability { value: f64 },

    #[error("evidence property on {relation} is not a list of strings")]
    #[diagnostic(
        code(kg::infer::invalid_evidence),
        help("Set `evidence` to a JSON array of evidence identifiers.")
    )]
    InvalidEvidence { relation: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Cache errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    #[diagnostic(
        code(kg::cache::io),
        help(
            "A filesystem operation failed. Check that the cache directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("redb error: {message}")]
    #[diagnostic(
        code(kg::cache::redb),
        help(
            "The embedded cache database encountered an error. \
             Cached data is disposable; deleting the cache file is safe."
        )
    )]
    Redb { message: String },

    #[error("cache serialization error: {message}")]
    #[diagnostic(
        code(kg::cache::serde),
        help("The cached payload or index could not be (de)serialized. It will be treated as a miss.")
    )]
    Serialization { message: String },

    #[error("cache key `{key}` is not usable as a file name")]
    #[diagnostic(
        code(kg::cache::invalid_key),
        help("File-backed cache keys may not be empty or contain path separators or `..`.")
    )]
    InvalidKey { key: String },

    #[error("corrupt cache index at {path}: {message}")]
    #[diagnostic(
        code(kg::cache::corrupt_index),
        help("Delete the metadata index to start with an empty cache.")
    )]
    CorruptIndex { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Query errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("query text is empty")]
    #[diagnostic(
        code(kg::query::empty),
        help("Provide a query mentioning at least one entity, e.g. \"path between A and B\".")
    )]
    EmptyQuery,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    #[diagnostic(code(kg::config::read), help("Check that the file exists and is readable."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config {path}: {source}")]
    #[diagnostic(code(kg::config::write), help("Check that the directory is writable."))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(code(kg::config::parse), help("The configuration file must be valid TOML."))]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(kg::config::invalid), help("Check the ReasonerConfig fields. {message}"))]
    Invalid { message: String },
}

/// Convenience alias for functions returning reasoning-core results.
pub type KgResult<T> = std::result::Result<T, KgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_to_kg_error() {
        let err = GraphError::DuplicateEntity { id: "E1".into() };
        let kg: KgError = err.into();
        assert!(matches!(kg, KgError::Graph(GraphError::DuplicateEntity { .. })));
    }

    #[test]
    fn infer_error_wraps_graph_error() {
        let err: InferError = GraphError::UnknownEntity { id: "X".into() }.into();
        assert!(matches!(err, InferError::Graph(GraphError::UnknownEntity { .. })));
    }

    #[test]
    fn display_messages_carry_values() {
        let err = GraphError::InvalidConfidence {
            context: "relation E1 -is_a-> E2".into(),
            value: 1.5,
        };
        let msg = format!("{err}");
        assert!(msg.contains("1.5"));
        assert!(msg.contains("E1"));
    }
}
