//! Revision-guarded vertex and edge CRUD
//!
//! One store instance is bound to one collection of one graph. Every write
//! may carry an expected revision; the comparison happens in the store and a
//! mismatch comes back as `GraphError::PreconditionFailed`. No revision is
//! cached here between calls.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{GraphError, GraphResult};
use crate::metadata::Lifecycle;
use crate::schema::{
    check_reserved, entity_body, Document, DocumentMeta, EdgeEndpoints, ElementKind, Patch,
    Revision,
};
use crate::store_traits::{CollectionRef, GraphStore};

/// CRUD on one vertex or edge collection, typed by entity `T`.
///
/// `T = serde_json::Value` gives an untyped store.
pub struct RevisionGuardedEntityStore<T> {
    lifecycle: Arc<Lifecycle>,
    store: Arc<dyn GraphStore>,
    collection: String,
    kind: ElementKind,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for RevisionGuardedEntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            store: self.store.clone(),
            collection: self.collection.clone(),
            kind: self.kind,
            _entity: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for RevisionGuardedEntityStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionGuardedEntityStore")
            .field("graph", &self.lifecycle.graph())
            .field("collection", &self.collection)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<T> RevisionGuardedEntityStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub(crate) fn new(
        lifecycle: Arc<Lifecycle>,
        store: Arc<dyn GraphStore>,
        collection: impl Into<String>,
        kind: ElementKind,
    ) -> Self {
        Self {
            lifecycle,
            store,
            collection: collection.into(),
            kind,
            _entity: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    fn target(&self) -> CollectionRef<'_> {
        CollectionRef {
            graph: self.lifecycle.graph(),
            kind: self.kind,
            collection: &self.collection,
        }
    }

    fn require_kind(&self, kind: ElementKind, hint: &str) -> GraphResult<()> {
        if self.kind != kind {
            return Err(GraphError::validation(&self.collection, hint));
        }
        Ok(())
    }

    /// Insert a new vertex. Never takes a precondition.
    #[instrument(skip_all, fields(graph = %self.lifecycle.graph(), collection = %self.collection))]
    pub async fn insert(&self, entity: &T) -> GraphResult<DocumentMeta> {
        self.lifecycle.ensure_usable("insert a document")?;
        self.require_kind(
            ElementKind::Vertex,
            "edge documents need endpoints; use insert_edge",
        )?;
        let body = entity_body(&self.collection, entity)?;
        let meta = self.store.insert_document(self.target(), body).await?;
        debug!(key = %meta.key, rev = %meta.rev, "Document inserted");
        Ok(meta)
    }

    /// Insert a new edge between two vertex ids.
    #[instrument(skip_all, fields(graph = %self.lifecycle.graph(), collection = %self.collection))]
    pub async fn insert_edge(
        &self,
        endpoints: &EdgeEndpoints,
        entity: &T,
    ) -> GraphResult<DocumentMeta> {
        self.lifecycle.ensure_usable("insert an edge")?;
        self.require_kind(ElementKind::Edge, "vertex documents have no endpoints; use insert")?;
        let mut body = entity_body(&self.collection, entity)?;
        body.insert("_from".to_string(), Value::String(endpoints.from.clone()));
        body.insert("_to".to_string(), Value::String(endpoints.to.clone()));
        let meta = self.store.insert_document(self.target(), body).await?;
        debug!(key = %meta.key, rev = %meta.rev, "Edge inserted");
        Ok(meta)
    }

    /// Read a record. `Ok(None)` when no record has `key`; a stale
    /// `if_match` is a `PreconditionFailed` error, never `None`.
    #[instrument(
        skip(self),
        fields(graph = %self.lifecycle.graph(), collection = %self.collection)
    )]
    pub async fn get(
        &self,
        key: &str,
        if_match: Option<&Revision>,
    ) -> GraphResult<Option<Document<T>>> {
        self.lifecycle.ensure_usable("read a document")?;
        match self.store.get_document(self.target(), key, if_match).await? {
            Some(stored) => Ok(Some(Document::from_stored(&self.collection, stored)?)),
            None => {
                debug!("Document absent");
                Ok(None)
            }
        }
    }

    /// Replace every business field of a record read earlier. Fields missing
    /// from `document.body` are cleared. Edge endpoints are sent along when
    /// the document carries them.
    pub async fn replace(
        &self,
        document: &Document<T>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        let endpoints = document.endpoints.as_ref();
        self.replace_parts(&document.meta.key, endpoints, &document.body, if_match)
            .await
    }

    /// Replace every business field of the record with `key`.
    pub async fn replace_by_key(
        &self,
        key: &str,
        entity: &T,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        self.replace_parts(key, None, entity, if_match).await
    }

    /// Replace an edge's body and endpoints.
    pub async fn replace_edge_by_key(
        &self,
        key: &str,
        endpoints: &EdgeEndpoints,
        entity: &T,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        self.require_kind(ElementKind::Edge, "vertex documents have no endpoints")?;
        self.replace_parts(key, Some(endpoints), entity, if_match).await
    }

    #[instrument(
        skip(self, endpoints, entity),
        fields(graph = %self.lifecycle.graph(), collection = %self.collection)
    )]
    async fn replace_parts(
        &self,
        key: &str,
        endpoints: Option<&EdgeEndpoints>,
        entity: &T,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        self.lifecycle.ensure_usable("replace a document")?;
        let mut body = entity_body(&self.collection, entity)?;
        if let (ElementKind::Edge, Some(endpoints)) = (self.kind, endpoints) {
            body.insert("_from".to_string(), Value::String(endpoints.from.clone()));
            body.insert("_to".to_string(), Value::String(endpoints.to.clone()));
        }
        let meta = self
            .store
            .replace_document(self.target(), key, body, if_match)
            .await?;
        debug!(rev = %meta.rev, "Document replaced");
        Ok(meta)
    }

    /// Merge the non-null fields of `document.body` into the stored record.
    pub async fn update(
        &self,
        document: &Document<T>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        let patch = Patch::from_entity(&self.collection, &document.body)?;
        self.update_by_key(&document.meta.key, &patch, if_match).await
    }

    /// Merge `patch` into the record with `key`. Fields not in the patch keep
    /// their stored value.
    #[instrument(
        skip(self, patch),
        fields(graph = %self.lifecycle.graph(), collection = %self.collection)
    )]
    pub async fn update_by_key(
        &self,
        key: &str,
        patch: &Patch,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        self.lifecycle.ensure_usable("update a document")?;
        check_reserved(&self.collection, patch.as_map())?;
        let meta = self
            .store
            .update_document(self.target(), key, patch.as_map().clone(), if_match)
            .await?;
        debug!(rev = %meta.rev, fields = patch.as_map().len(), "Document updated");
        Ok(meta)
    }

    /// Delete a record read earlier.
    pub async fn remove(
        &self,
        document: &Document<T>,
        if_match: Option<&Revision>,
    ) -> GraphResult<()> {
        self.remove_by_key(&document.meta.key, if_match).await
    }

    /// Delete the record with `key`. `NotFound` if absent.
    #[instrument(
        skip(self),
        fields(graph = %self.lifecycle.graph(), collection = %self.collection)
    )]
    pub async fn remove_by_key(&self, key: &str, if_match: Option<&Revision>) -> GraphResult<()> {
        self.lifecycle.ensure_usable("remove a document")?;
        self.store
            .remove_document(self.target(), key, if_match)
            .await?;
        debug!("Document removed");
        Ok(())
    }
}
