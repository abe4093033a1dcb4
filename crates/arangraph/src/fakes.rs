//! In-memory fake for the store trait (testing only)
//!
//! `MemoryGraphStore` behaves like the gharial API for everything the client
//! depends on: store-assigned ids and revisions, server-side precondition
//! checks, orphan bookkeeping, collection scoping and `dropCollections`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{ConflictReason, GraphError, GraphResult, ResourceKind};
use crate::lock_unpoisoned;
use crate::naming::validate_collection_name;
use crate::schema::{
    check_reserved, dedup_names, DocumentMeta, EdgeDefinition, EdgeEndpoints, ElementKind,
    GraphDescriptor, Revision,
};
use crate::store_traits::{CollectionRef, CreateGraphRequest, GraphStore};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct GraphEntry {
    rev: Revision,
    edge_definitions: Vec<EdgeDefinition>,
    orphans: Vec<String>,
}

impl GraphEntry {
    fn descriptor(&self, name: &str) -> GraphDescriptor {
        GraphDescriptor {
            id: format!("_graphs/{name}"),
            key: name.to_string(),
            rev: self.rev.clone(),
            edge_definitions: self.edge_definitions.clone(),
            orphan_collections: self.orphans.clone(),
        }
    }

    fn definition_index(&self, collection: &str) -> Option<usize> {
        self.edge_definitions
            .iter()
            .position(|d| d.collection == collection)
    }

    fn is_referenced(&self, collection: &str) -> bool {
        self.edge_definitions.iter().any(|d| d.references(collection))
    }

    fn has_vertex_collection(&self, collection: &str) -> bool {
        self.is_referenced(collection) || self.orphans.iter().any(|o| o == collection)
    }

    fn uses(&self, collection: &str) -> bool {
        self.has_vertex_collection(collection) || self.definition_index(collection).is_some()
    }

    fn contains(&self, kind: ElementKind, collection: &str) -> bool {
        match kind {
            ElementKind::Vertex => self.has_vertex_collection(collection),
            ElementKind::Edge => self.definition_index(collection).is_some(),
        }
    }

    /// Drop orphans that became referenced and move formerly referenced
    /// collections that lost their last definition into the orphans.
    fn reconcile_orphans(&mut self, previously_referenced: Vec<String>) {
        let referenced: Vec<String> = self
            .edge_definitions
            .iter()
            .flat_map(|d| d.vertex_collections())
            .collect();
        self.orphans.retain(|o| !referenced.contains(o));
        for collection in previously_referenced {
            if !referenced.contains(&collection) && !self.orphans.contains(&collection) {
                self.orphans.push(collection);
            }
        }
    }

    fn touch(&mut self) {
        self.rev = fresh_revision();
    }
}

#[derive(Debug)]
struct StoredDocument {
    rev: Revision,
    endpoints: Option<EdgeEndpoints>,
    body: Map<String, Value>,
}

impl StoredDocument {
    fn to_value(&self, collection: &str, key: &str) -> Value {
        let mut object = self.body.clone();
        object.insert("_id".into(), Value::String(format!("{collection}/{key}")));
        object.insert("_key".into(), Value::String(key.to_string()));
        object.insert("_rev".into(), Value::String(self.rev.as_str().to_string()));
        if let Some(endpoints) = &self.endpoints {
            object.insert("_from".into(), Value::String(endpoints.from.clone()));
            object.insert("_to".into(), Value::String(endpoints.to.clone()));
        }
        Value::Object(object)
    }
}

#[derive(Debug)]
struct CollectionEntry {
    kind: ElementKind,
    documents: HashMap<String, StoredDocument>,
}

#[derive(Debug, Default)]
struct StoreState {
    graphs: BTreeMap<String, GraphEntry>,
    collections: HashMap<String, CollectionEntry>,
    next_key: u64,
}

impl StoreState {
    fn graph(&self, name: &str) -> GraphResult<&GraphEntry> {
        self.graphs
            .get(name)
            .ok_or_else(|| GraphError::not_found(ResourceKind::Graph, name))
    }

    fn graph_mut(&mut self, name: &str) -> GraphResult<&mut GraphEntry> {
        self.graphs
            .get_mut(name)
            .ok_or_else(|| GraphError::not_found(ResourceKind::Graph, name))
    }

    /// Fail if `collection` exists with a different kind.
    fn check_kind(&self, collection: &str, kind: ElementKind) -> GraphResult<()> {
        validate_collection_name(collection)
            .map_err(|e| GraphError::validation(collection, e.to_string()))?;
        match self.collections.get(collection) {
            Some(entry) if entry.kind != kind => Err(GraphError::validation(
                collection,
                format!(
                    "collection is a {} collection, cannot be used as {}",
                    entry.kind.as_path(),
                    kind.as_path()
                ),
            )),
            _ => Ok(()),
        }
    }

    fn check_definition_kinds(&self, definition: &EdgeDefinition) -> GraphResult<()> {
        self.check_kind(&definition.collection, ElementKind::Edge)?;
        for vertex in definition.vertex_collections() {
            self.check_kind(&vertex, ElementKind::Vertex)?;
            if vertex == definition.collection {
                return Err(GraphError::validation(
                    vertex,
                    "edge collection cannot be its own endpoint",
                ));
            }
        }
        Ok(())
    }

    fn ensure_collection(&mut self, collection: &str, kind: ElementKind) {
        self.collections
            .entry(collection.to_string())
            .or_insert_with(|| CollectionEntry {
                kind,
                documents: HashMap::new(),
            });
    }

    fn ensure_definition_collections(&mut self, definition: &EdgeDefinition) {
        self.ensure_collection(&definition.collection, ElementKind::Edge);
        for vertex in definition.vertex_collections() {
            self.ensure_collection(&vertex, ElementKind::Vertex);
        }
    }

    /// Delete a collection's data unless another graph still uses it.
    fn drop_if_unused(&mut self, collection: &str) {
        if !self.graphs.values().any(|g| g.uses(collection)) {
            self.collections.remove(collection);
        }
    }

    fn scoped_collection(
        &mut self,
        target: CollectionRef<'_>,
    ) -> GraphResult<&mut CollectionEntry> {
        let graph = self.graph(target.graph)?;
        if !graph.contains(target.kind, target.collection) {
            return Err(GraphError::not_found(
                ResourceKind::Collection,
                target.collection,
            ));
        }
        self.collections
            .get_mut(target.collection)
            .ok_or_else(|| GraphError::not_found(ResourceKind::Collection, target.collection))
    }

    fn next_key(&mut self) -> String {
        self.next_key += 1;
        self.next_key.to_string()
    }
}

fn fresh_revision() -> Revision {
    Revision::new(format!("_{}", Uuid::new_v4().simple()))
}

fn check_precondition(
    collection: &str,
    key: &str,
    current: &Revision,
    if_match: Option<&Revision>,
) -> GraphResult<()> {
    match if_match {
        Some(expected) if expected != current => Err(GraphError::PreconditionFailed {
            collection: collection.to_string(),
            key: key.to_string(),
            expected: expected.clone(),
            actual: Some(current.clone()),
        }),
        _ => Ok(()),
    }
}

/// Separate `_from` / `_to` from an edge body; vertices may carry neither.
fn split_body(
    kind: ElementKind,
    collection: &str,
    mut body: Map<String, Value>,
) -> GraphResult<(Map<String, Value>, Option<EdgeEndpoints>)> {
    let endpoints = match kind {
        ElementKind::Vertex => None,
        ElementKind::Edge => match (body.remove("_from"), body.remove("_to")) {
            (None, None) => None,
            (Some(Value::String(from)), Some(Value::String(to)))
                if from.contains('/') && to.contains('/') =>
            {
                Some(EdgeEndpoints { from, to })
            }
            _ => {
                return Err(GraphError::validation(
                    collection,
                    "edge endpoints must be vertex ids of the form 'collection/key'",
                ))
            }
        },
    };
    check_reserved(collection, &body)?;
    Ok((body, endpoints))
}

fn merge_into(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (field, value) in patch {
        if let Value::Object(incoming) = value {
            if let Some(Value::Object(existing)) = target.get_mut(&field) {
                merge_into(existing, incoming);
                continue;
            }
            target.insert(field, Value::Object(incoming));
        } else {
            target.insert(field, value);
        }
    }
}

fn document_name(collection: &str, key: &str) -> String {
    format!("{collection}/{key}")
}

// ---------------------------------------------------------------------------
// MemoryGraphStore
// ---------------------------------------------------------------------------

/// In-memory graph store backed by `BTreeMap<graph, GraphEntry>` and
/// `HashMap<collection, documents>`.
///
/// Collections are store-wide, as on a real server: two graphs naming the
/// same vertex collection share its documents.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    state: Mutex<StoreState>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        lock_unpoisoned(&self.state)
    }

    /// Names of all collections that currently exist.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().collections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of documents stored in `collection` (0 if it does not exist).
    pub fn document_count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn create_graph(&self, request: &CreateGraphRequest) -> GraphResult<GraphDescriptor> {
        let mut state = self.lock();
        if request.name.is_empty() {
            return Err(GraphError::validation("_graphs", "graph name must not be empty"));
        }
        if state.graphs.contains_key(&request.name) {
            return Err(GraphError::conflict(
                ConflictReason::GraphExists,
                &request.name,
            ));
        }

        let definitions: Vec<EdgeDefinition> = request
            .edge_definitions
            .iter()
            .cloned()
            .map(EdgeDefinition::normalized)
            .collect();
        for (i, definition) in definitions.iter().enumerate() {
            if definitions[..i]
                .iter()
                .any(|d| d.collection == definition.collection)
            {
                return Err(GraphError::conflict(
                    ConflictReason::DefinitionExists,
                    &definition.collection,
                ));
            }
            state.check_definition_kinds(definition)?;
        }
        let mut entry = GraphEntry {
            rev: fresh_revision(),
            edge_definitions: definitions,
            orphans: dedup_names(request.orphan_collections.iter().cloned()),
        };
        entry.reconcile_orphans(Vec::new());
        for orphan in &entry.orphans {
            state.check_kind(orphan, ElementKind::Vertex)?;
        }
        if let Some(clash) = entry
            .orphans
            .iter()
            .find(|o| entry.definition_index(o).is_some())
        {
            return Err(GraphError::validation(
                clash.clone(),
                "edge collection cannot be an orphan vertex collection",
            ));
        }

        for definition in entry.edge_definitions.clone() {
            state.ensure_definition_collections(&definition);
        }
        for orphan in entry.orphans.clone() {
            state.ensure_collection(&orphan, ElementKind::Vertex);
        }

        let descriptor = entry.descriptor(&request.name);
        state.graphs.insert(request.name.clone(), entry);
        Ok(descriptor)
    }

    async fn drop_graph(&self, name: &str, drop_collections: bool) -> GraphResult<bool> {
        let mut state = self.lock();
        let Some(entry) = state.graphs.remove(name) else {
            return Ok(false);
        };
        if drop_collections {
            let members = entry
                .edge_definitions
                .iter()
                .flat_map(|d| std::iter::once(d.collection.clone()).chain(d.vertex_collections()))
                .chain(entry.orphans.iter().cloned());
            for collection in dedup_names(members) {
                state.drop_if_unused(&collection);
            }
        }
        Ok(true)
    }

    async fn graph(&self, name: &str) -> GraphResult<GraphDescriptor> {
        let state = self.lock();
        Ok(state.graph(name)?.descriptor(name))
    }

    async fn list_graphs(&self) -> GraphResult<Vec<GraphDescriptor>> {
        let state = self.lock();
        Ok(state
            .graphs
            .iter()
            .map(|(name, entry)| entry.descriptor(name))
            .collect())
    }

    async fn add_edge_definition(
        &self,
        graph: &str,
        definition: &EdgeDefinition,
    ) -> GraphResult<GraphDescriptor> {
        let mut state = self.lock();
        let definition = definition.clone().normalized();
        let entry = state.graph(graph)?;
        if entry.definition_index(&definition.collection).is_some() {
            return Err(GraphError::conflict(
                ConflictReason::DefinitionExists,
                &definition.collection,
            ));
        }
        if entry.has_vertex_collection(&definition.collection) {
            return Err(GraphError::validation(
                &definition.collection,
                "collection is already a vertex collection of this graph",
            ));
        }
        state.check_definition_kinds(&definition)?;
        state.ensure_definition_collections(&definition);

        let entry = state.graph_mut(graph)?;
        entry.edge_definitions.push(definition);
        entry.reconcile_orphans(Vec::new());
        entry.touch();
        Ok(entry.descriptor(graph))
    }

    async fn replace_edge_definition(
        &self,
        graph: &str,
        definition: &EdgeDefinition,
    ) -> GraphResult<GraphDescriptor> {
        let mut state = self.lock();
        let definition = definition.clone().normalized();
        let entry = state.graph(graph)?;
        if entry.definition_index(&definition.collection).is_none() {
            return Err(GraphError::not_found(
                ResourceKind::EdgeDefinition,
                &definition.collection,
            ));
        }
        state.check_definition_kinds(&definition)?;
        state.ensure_definition_collections(&definition);

        let entry = state.graph_mut(graph)?;
        let index = entry
            .definition_index(&definition.collection)
            .ok_or_else(|| {
                GraphError::not_found(ResourceKind::EdgeDefinition, &definition.collection)
            })?;
        let previous = std::mem::replace(&mut entry.edge_definitions[index], definition);
        entry.reconcile_orphans(previous.vertex_collections());
        entry.touch();
        Ok(entry.descriptor(graph))
    }

    async fn remove_edge_definition(
        &self,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> GraphResult<GraphDescriptor> {
        let mut state = self.lock();
        let entry = state.graph_mut(graph)?;
        let index = entry
            .definition_index(collection)
            .ok_or_else(|| GraphError::not_found(ResourceKind::EdgeDefinition, collection))?;
        let removed = entry.edge_definitions.remove(index);
        entry.reconcile_orphans(removed.vertex_collections());
        entry.touch();
        let descriptor = entry.descriptor(graph);

        if drop_collection {
            state.drop_if_unused(collection);
        }
        Ok(descriptor)
    }

    async fn add_vertex_collection(
        &self,
        graph: &str,
        collection: &str,
    ) -> GraphResult<GraphDescriptor> {
        let mut state = self.lock();
        let entry = state.graph(graph)?;
        if entry.has_vertex_collection(collection) {
            return Err(GraphError::conflict(
                ConflictReason::CollectionAlreadyInGraph,
                collection,
            ));
        }
        if entry.definition_index(collection).is_some() {
            return Err(GraphError::validation(
                collection,
                "collection is an edge collection of this graph",
            ));
        }
        state.check_kind(collection, ElementKind::Vertex)?;
        state.ensure_collection(collection, ElementKind::Vertex);

        let entry = state.graph_mut(graph)?;
        entry.orphans.push(collection.to_string());
        entry.touch();
        Ok(entry.descriptor(graph))
    }

    async fn remove_vertex_collection(
        &self,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> GraphResult<GraphDescriptor> {
        let mut state = self.lock();
        let entry = state.graph_mut(graph)?;
        if entry.is_referenced(collection) {
            return Err(GraphError::conflict(
                ConflictReason::CollectionReferenced,
                collection,
            ));
        }
        let index = entry
            .orphans
            .iter()
            .position(|o| o == collection)
            .ok_or_else(|| GraphError::not_found(ResourceKind::Collection, collection))?;
        entry.orphans.remove(index);
        entry.touch();
        let descriptor = entry.descriptor(graph);

        if drop_collection {
            state.drop_if_unused(collection);
        }
        Ok(descriptor)
    }

    async fn insert_document(
        &self,
        target: CollectionRef<'_>,
        body: Map<String, Value>,
    ) -> GraphResult<DocumentMeta> {
        let mut state = self.lock();
        let (body, endpoints) = split_body(target.kind, target.collection, body)?;
        if target.kind == ElementKind::Edge && endpoints.is_none() {
            return Err(GraphError::validation(
                target.collection,
                "edge documents require '_from' and '_to'",
            ));
        }
        state.scoped_collection(target)?;
        let key = state.next_key();
        let rev = fresh_revision();
        let collection = state.scoped_collection(target)?;
        collection.documents.insert(
            key.clone(),
            StoredDocument {
                rev: rev.clone(),
                endpoints,
                body,
            },
        );
        Ok(DocumentMeta {
            id: document_name(target.collection, &key),
            key,
            rev,
        })
    }

    async fn get_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        if_match: Option<&Revision>,
    ) -> GraphResult<Option<Value>> {
        let mut state = self.lock();
        let collection = state.scoped_collection(target)?;
        let Some(document) = collection.documents.get(key) else {
            return Ok(None);
        };
        check_precondition(target.collection, key, &document.rev, if_match)?;
        Ok(Some(document.to_value(target.collection, key)))
    }

    async fn replace_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        body: Map<String, Value>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        let mut state = self.lock();
        let (body, endpoints) = split_body(target.kind, target.collection, body)?;
        let collection = state.scoped_collection(target)?;
        let document = collection.documents.get_mut(key).ok_or_else(|| {
            GraphError::not_found(ResourceKind::Document, document_name(target.collection, key))
        })?;
        check_precondition(target.collection, key, &document.rev, if_match)?;

        document.body = body;
        if endpoints.is_some() {
            document.endpoints = endpoints;
        }
        document.rev = fresh_revision();
        Ok(DocumentMeta {
            id: document_name(target.collection, key),
            key: key.to_string(),
            rev: document.rev.clone(),
        })
    }

    async fn update_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        patch: Map<String, Value>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        let mut state = self.lock();
        let (patch, endpoints) = split_body(target.kind, target.collection, patch)?;
        let collection = state.scoped_collection(target)?;
        let document = collection.documents.get_mut(key).ok_or_else(|| {
            GraphError::not_found(ResourceKind::Document, document_name(target.collection, key))
        })?;
        check_precondition(target.collection, key, &document.rev, if_match)?;

        merge_into(&mut document.body, patch);
        if endpoints.is_some() {
            document.endpoints = endpoints;
        }
        document.rev = fresh_revision();
        Ok(DocumentMeta {
            id: document_name(target.collection, key),
            key: key.to_string(),
            rev: document.rev.clone(),
        })
    }

    async fn remove_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        if_match: Option<&Revision>,
    ) -> GraphResult<()> {
        let mut state = self.lock();
        let collection = state.scoped_collection(target)?;
        let document = collection.documents.get(key).ok_or_else(|| {
            GraphError::not_found(ResourceKind::Document, document_name(target.collection, key))
        })?;
        check_precondition(target.collection, key, &document.rev, if_match)?;
        collection.documents.remove(key);
        Ok(())
    }
}
