//! Store trait consumed by the graph client
//!
//! `GraphStore` is the document/graph store collaborator: every graph
//! metadata change and every document operation is one call on this trait.
//! Implementations:
//! - `HttpGraphStore`: ArangoDB gharial API over HTTP
//! - `MemoryGraphStore` (in `fakes`): in-process store for tests
//!
//! All consistency decisions (duplicate names, revision checks, orphan
//! bookkeeping) belong to the implementation, not to the caller.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::GraphResult;
use crate::schema::{DocumentMeta, EdgeDefinition, ElementKind, GraphDescriptor, Revision};

/// Request body for graph creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateGraphRequest {
    pub name: String,
    pub edge_definitions: Vec<EdgeDefinition>,
    pub orphan_collections: Vec<String>,
}

/// Addresses one collection inside one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionRef<'a> {
    pub graph: &'a str,
    pub kind: ElementKind,
    pub collection: &'a str,
}

/// Document/graph store.
///
/// Guarantees expected from implementations:
/// - Every successful document write assigns a fresh, never reused `_rev`.
/// - `if_match` is compared server-side; a mismatch is reported as
///   `GraphError::PreconditionFailed`, never as `NotFound`.
/// - `get_document` returns `Ok(None)` for an absent record.
/// - Metadata mutations return the post-mutation graph descriptor.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create a graph. `Conflict` if the name is taken.
    async fn create_graph(&self, request: &CreateGraphRequest) -> GraphResult<GraphDescriptor>;

    /// Drop a graph. Returns `false` if it did not exist.
    async fn drop_graph(&self, name: &str, drop_collections: bool) -> GraphResult<bool>;

    /// Fetch a graph's descriptor. `NotFound` if absent.
    async fn graph(&self, name: &str) -> GraphResult<GraphDescriptor>;

    /// All graphs known to the store.
    async fn list_graphs(&self) -> GraphResult<Vec<GraphDescriptor>>;

    /// Add a new edge definition.
    async fn add_edge_definition(
        &self,
        graph: &str,
        definition: &EdgeDefinition,
    ) -> GraphResult<GraphDescriptor>;

    /// Replace the `from` / `to` sets of an existing edge definition.
    async fn replace_edge_definition(
        &self,
        graph: &str,
        definition: &EdgeDefinition,
    ) -> GraphResult<GraphDescriptor>;

    /// Remove an edge definition; its vertex collections stay in the graph.
    async fn remove_edge_definition(
        &self,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> GraphResult<GraphDescriptor>;

    /// Register an orphan vertex collection.
    async fn add_vertex_collection(
        &self,
        graph: &str,
        collection: &str,
    ) -> GraphResult<GraphDescriptor>;

    /// Remove an orphan vertex collection.
    async fn remove_vertex_collection(
        &self,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> GraphResult<GraphDescriptor>;

    /// Insert a document. Edge bodies carry `_from` / `_to`.
    async fn insert_document(
        &self,
        target: CollectionRef<'_>,
        body: Map<String, Value>,
    ) -> GraphResult<DocumentMeta>;

    /// Read a document, including its `_id`, `_key`, `_rev` attributes.
    async fn get_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        if_match: Option<&Revision>,
    ) -> GraphResult<Option<Value>>;

    /// Replace all business fields of a document.
    async fn replace_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        body: Map<String, Value>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta>;

    /// Merge fields into a document.
    async fn update_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        patch: Map<String, Value>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta>;

    /// Delete a document. `NotFound` if absent.
    async fn remove_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        if_match: Option<&Revision>,
    ) -> GraphResult<()>;
}
