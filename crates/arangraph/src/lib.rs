//! arangraph: typed client for ArangoDB named graphs
//!
//! An application describes a graph as named edge definitions over its own
//! entity types, then does typed CRUD on vertices and edges guarded by
//! revision tokens. The server owns storage and consistency; this crate owns
//! the mapping and the protocol.
//!
//! ## Key Components
//!
//! - `CollectionNameResolver`: entity type → collection name
//! - `EdgeDefinitionSet`: server-mirrored edge definitions and orphans
//! - `GraphMetadataManager`: create / open / info / drop lifecycle
//! - `RevisionGuardedEntityStore`: get / insert / replace / update / remove
//! - `GraphClient`, `GraphHandle`: the facade applications use
//! - `GraphStore`: the store seam, with `HttpGraphStore` and `MemoryGraphStore`

use std::sync::{Mutex, MutexGuard, PoisonError};

mod edge_definitions;
mod entity_store;
mod error;
pub mod fakes;
mod graph;
pub mod http_store;
mod metadata;
mod naming;
mod schema;
pub mod store_traits;
pub mod telemetry;

pub use edge_definitions::{DefinitionView, EdgeDefinitionSet};
pub use entity_store::RevisionGuardedEntityStore;
pub use error::{ConflictReason, GraphError, GraphResult, ResourceKind};
pub use fakes::MemoryGraphStore;
pub use graph::{GraphClient, GraphHandle};
pub use http_store::{HttpGraphStore, StoreConfig};
pub use metadata::{GraphMetadataManager, GraphState};
pub use naming::{
    validate_collection_name, CollectionNameResolver, GraphEntity, NamingConvention,
    ResolverConfig,
};
pub use schema::{
    Document, DocumentMeta, EdgeDefinition, EdgeEndpoints, ElementKind, GraphDescriptor,
    GraphInfo, Patch, Revision, RESERVED_FIELDS,
};
pub use store_traits::{CollectionRef, CreateGraphRequest, GraphStore};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
