//! Error types for arangraph

use std::fmt;

use thiserror::Error;

use crate::schema::Revision;

/// Result type for graph operations
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Kind of resource a [`GraphError::NotFound`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Graph,
    EdgeDefinition,
    Collection,
    Document,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Graph => "graph",
            ResourceKind::EdgeDefinition => "edge definition",
            ResourceKind::Collection => "collection",
            ResourceKind::Document => "document",
        };
        f.write_str(label)
    }
}

/// Why the store refused a metadata change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// A graph with the requested name already exists
    GraphExists,
    /// The edge collection already has a definition in this graph
    DefinitionExists,
    /// The vertex collection is still referenced by an edge definition
    CollectionReferenced,
    /// The vertex collection is already part of the graph
    CollectionAlreadyInGraph,
    /// Any other store-reported conflict
    Other,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConflictReason::GraphExists => "graph already exists",
            ConflictReason::DefinitionExists => "edge definition already exists",
            ConflictReason::CollectionReferenced => {
                "collection is still referenced by an edge definition"
            }
            ConflictReason::CollectionAlreadyInGraph => "collection is already part of the graph",
            ConflictReason::Other => "conflict",
        };
        f.write_str(label)
    }
}

/// Errors that can occur in the graph client
#[derive(Error, Debug)]
pub enum GraphError {
    /// Resolver or client misconfiguration, raised locally
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Malformed entity or request
    #[error("Validation failed for '{collection}': {reason}")]
    Validation { collection: String, reason: String },

    /// Graph, edge definition, collection or record absent
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    /// Duplicate graph or definition, or a collection still in use
    #[error("Conflict on '{name}': {reason}")]
    Conflict { reason: ConflictReason, name: String },

    /// Revision mismatch on a guarded operation
    #[error(
        "Precondition failed for {collection}/{key}: expected rev {expected}, actual {}",
        .actual.as_ref().map(|r| r.as_str()).unwrap_or("unknown")
    )]
    PreconditionFailed {
        collection: String,
        key: String,
        expected: Revision,
        actual: Option<Revision>,
    },

    /// Operation attempted on a dropped graph handle
    #[error("Graph '{graph}' has been dropped; cannot {operation}")]
    InvalidState {
        graph: String,
        operation: &'static str,
    },

    /// Opaque transport or store failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl GraphError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        GraphError::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(collection: impl Into<String>, reason: impl Into<String>) -> Self {
        GraphError::Validation {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        GraphError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn conflict(reason: ConflictReason, name: impl Into<String>) -> Self {
        GraphError::Conflict {
            reason,
            name: name.into(),
        }
    }

    /// True when re-reading the record and reapplying the change may succeed.
    pub fn is_retryable_with_fresh_read(&self) -> bool {
        matches!(self, GraphError::PreconditionFailed { .. })
    }

    /// True for a `NotFound` of the given kind.
    pub fn is_not_found(&self, kind: ResourceKind) -> bool {
        matches!(self, GraphError::NotFound { kind: k, .. } if *k == kind)
    }
}

impl From<reqwest::Error> for GraphError {
    fn from(err: reqwest::Error) -> Self {
        GraphError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Transport(format!("malformed store payload: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_message_names_both_revisions() {
        let err = GraphError::PreconditionFailed {
            collection: "Person".to_string(),
            key: "42".to_string(),
            expected: Revision::new("_a"),
            actual: Some(Revision::new("_b")),
        };
        let msg = err.to_string();
        assert!(msg.contains("Person/42"));
        assert!(msg.contains("_a"));
        assert!(msg.contains("_b"));
        assert!(err.is_retryable_with_fresh_read());
    }

    #[test]
    fn precondition_message_without_actual_revision() {
        let err = GraphError::PreconditionFailed {
            collection: "Person".to_string(),
            key: "42".to_string(),
            expected: Revision::new("_a"),
            actual: None,
        };
        assert!(err.to_string().ends_with("actual unknown"));
    }

    #[test]
    fn not_found_kind_matching() {
        let err = GraphError::not_found(ResourceKind::EdgeDefinition, "Follow");
        assert!(err.is_not_found(ResourceKind::EdgeDefinition));
        assert!(!err.is_not_found(ResourceKind::Graph));
        assert_eq!(err.to_string(), "edge definition not found: Follow");
        assert!(!err.is_retryable_with_fresh_read());
    }
}
