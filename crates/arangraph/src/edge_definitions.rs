//! Edge definitions and orphan collections of one graph
//!
//! The set mirrors the store: every mutation is sent to the store first and
//! the local view is replaced by the store's post-mutation descriptor only
//! when the store accepts it. A rejected change leaves the view untouched.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument};

use crate::error::{ConflictReason, GraphError, GraphResult, ResourceKind};
use crate::lock_unpoisoned;
use crate::metadata::Lifecycle;
use crate::schema::{dedup_names, EdgeDefinition, GraphDescriptor};
use crate::store_traits::GraphStore;

/// Point-in-time copy of a graph's edge definitions and orphans
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionView {
    pub edge_definitions: Vec<EdgeDefinition>,
    pub orphan_collections: Vec<String>,
}

impl DefinitionView {
    fn from_descriptor(descriptor: &GraphDescriptor) -> Self {
        Self {
            edge_definitions: descriptor.edge_definitions.clone(),
            orphan_collections: descriptor.orphan_collections.clone(),
        }
    }

    /// Edge collection names in definition order.
    pub fn names(&self) -> Vec<String> {
        self.edge_definitions
            .iter()
            .map(|d| d.collection.clone())
            .collect()
    }

    pub fn definition(&self, collection: &str) -> Option<&EdgeDefinition> {
        self.edge_definitions
            .iter()
            .find(|d| d.collection == collection)
    }

    /// True if any definition uses `collection` as an endpoint.
    pub fn is_referenced(&self, collection: &str) -> bool {
        self.edge_definitions.iter().any(|d| d.references(collection))
    }

    pub fn is_orphan(&self, collection: &str) -> bool {
        self.orphan_collections.iter().any(|o| o == collection)
    }

    pub fn contains_vertex_collection(&self, collection: &str) -> bool {
        self.is_referenced(collection) || self.is_orphan(collection)
    }

    /// Every vertex collection: definition endpoints first, then orphans.
    pub fn vertex_collections(&self) -> Vec<String> {
        dedup_names(
            self.edge_definitions
                .iter()
                .flat_map(|d| d.vertex_collections())
                .chain(self.orphan_collections.iter().cloned()),
        )
    }
}

/// Server-mirrored edge definitions of one graph.
///
/// Every operation fails with `InvalidState` once the owning graph handle
/// has been dropped.
pub struct EdgeDefinitionSet {
    lifecycle: Arc<Lifecycle>,
    store: Arc<dyn GraphStore>,
    view: Mutex<DefinitionView>,
}

impl std::fmt::Debug for EdgeDefinitionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeDefinitionSet")
            .field("graph", &self.graph())
            .field("view", &self.snapshot())
            .finish()
    }
}

impl EdgeDefinitionSet {
    pub(crate) fn new(lifecycle: Arc<Lifecycle>, store: Arc<dyn GraphStore>) -> Self {
        Self {
            lifecycle,
            store,
            view: Mutex::new(DefinitionView::default()),
        }
    }

    fn graph(&self) -> &str {
        self.lifecycle.graph()
    }

    /// Replace the local view with a store descriptor. Leaves the lifecycle
    /// state alone.
    pub(crate) fn adopt(&self, descriptor: &GraphDescriptor) -> DefinitionView {
        let view = DefinitionView::from_descriptor(descriptor);
        *lock_unpoisoned(&self.view) = view.clone();
        view
    }

    pub(crate) fn clear(&self) {
        *lock_unpoisoned(&self.view) = DefinitionView::default();
    }

    /// Current local view, without contacting the store.
    pub fn snapshot(&self) -> DefinitionView {
        lock_unpoisoned(&self.view).clone()
    }

    /// Re-read the graph from the store and adopt it.
    #[instrument(skip(self), fields(graph = %self.graph()))]
    pub async fn refresh(&self) -> GraphResult<DefinitionView> {
        self.lifecycle.ensure_usable("read edge definitions")?;
        let descriptor = self.store.graph(self.graph()).await?;
        Ok(self.adopt(&descriptor))
    }

    /// Edge collection names in definition order.
    pub async fn list(&self) -> GraphResult<Vec<String>> {
        Ok(self.refresh().await?.names())
    }

    /// All vertex collections of the graph, orphans included.
    pub async fn vertex_collections(&self) -> GraphResult<Vec<String>> {
        Ok(self.refresh().await?.vertex_collections())
    }

    /// Add a new edge definition. `Conflict` if the collection is already
    /// defined.
    #[instrument(
        skip(self, definition),
        fields(graph = %self.graph(), collection = %definition.collection)
    )]
    pub async fn add(&self, definition: EdgeDefinition) -> GraphResult<DefinitionView> {
        self.lifecycle.ensure_usable("add an edge definition")?;
        let definition = definition.normalized();
        let descriptor = self
            .store
            .add_edge_definition(self.graph(), &definition)
            .await?;
        info!("Edge definition added");
        Ok(self.adopt(&descriptor))
    }

    /// Union vertex collections into an existing definition.
    ///
    /// The union is computed against the store's current definition, not the
    /// local view, then written back in one request.
    #[instrument(skip_all, fields(graph = %self.graph(), collection = %collection))]
    pub async fn extend<I, J, S, U>(
        &self,
        collection: &str,
        from: I,
        to: J,
    ) -> GraphResult<DefinitionView>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = U>,
        S: Into<String>,
        U: Into<String>,
    {
        let current = self.refresh().await?;
        let existing = current
            .definition(collection)
            .ok_or_else(|| GraphError::not_found(ResourceKind::EdgeDefinition, collection))?;
        let extended = existing.extended(
            from.into_iter().map(Into::into),
            to.into_iter().map(Into::into),
        );

        if &extended == existing {
            debug!("Extension adds no new collections");
            return Ok(current);
        }

        let descriptor = self
            .store
            .replace_edge_definition(self.graph(), &extended)
            .await?;
        info!(
            from = extended.from.len(),
            to = extended.to.len(),
            "Edge definition extended"
        );
        Ok(self.adopt(&descriptor))
    }

    /// Replace the `from` / `to` sets of an existing definition.
    #[instrument(skip_all, fields(graph = %self.graph(), collection = %collection))]
    pub async fn edit<I, J, S, U>(
        &self,
        collection: &str,
        from: I,
        to: J,
    ) -> GraphResult<DefinitionView>
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = U>,
        S: Into<String>,
        U: Into<String>,
    {
        self.lifecycle.ensure_usable("edit an edge definition")?;
        let definition = EdgeDefinition::new(collection, from, to);
        let descriptor = self
            .store
            .replace_edge_definition(self.graph(), &definition)
            .await?;
        info!("Edge definition replaced");
        Ok(self.adopt(&descriptor))
    }

    /// Remove a definition. Vertex collections only it referenced become
    /// orphans; `drop_collection` also deletes the edge collection itself.
    #[instrument(skip(self), fields(graph = %self.graph()))]
    pub async fn delete(
        &self,
        collection: &str,
        drop_collection: bool,
    ) -> GraphResult<DefinitionView> {
        self.lifecycle.ensure_usable("delete an edge definition")?;
        let descriptor = self
            .store
            .remove_edge_definition(self.graph(), collection, drop_collection)
            .await?;
        info!("Edge definition removed");
        Ok(self.adopt(&descriptor))
    }

    /// Register an orphan vertex collection.
    ///
    /// The request always goes to the store. If the store already has the
    /// collection in the graph, as an orphan or as a definition endpoint,
    /// the call is a no-op that refreshes the view.
    #[instrument(skip(self), fields(graph = %self.graph()))]
    pub async fn add_vertex_collection(&self, collection: &str) -> GraphResult<DefinitionView> {
        self.lifecycle.ensure_usable("add a vertex collection")?;
        match self.store.add_vertex_collection(self.graph(), collection).await {
            Ok(descriptor) => {
                info!("Orphan vertex collection added");
                Ok(self.adopt(&descriptor))
            }
            Err(GraphError::Conflict {
                reason: ConflictReason::CollectionAlreadyInGraph,
                ..
            }) => {
                debug!("Vertex collection already registered");
                self.refresh().await
            }
            Err(e) => Err(e),
        }
    }

    /// Remove an orphan vertex collection. `Conflict` if an edge definition
    /// still references it.
    #[instrument(skip(self), fields(graph = %self.graph()))]
    pub async fn remove_vertex_collection(
        &self,
        collection: &str,
        drop_collection: bool,
    ) -> GraphResult<DefinitionView> {
        self.lifecycle.ensure_usable("remove a vertex collection")?;
        let descriptor = self
            .store
            .remove_vertex_collection(self.graph(), collection, drop_collection)
            .await?;
        info!("Orphan vertex collection removed");
        Ok(self.adopt(&descriptor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryGraphStore;
    use crate::store_traits::CreateGraphRequest;

    async fn social_set() -> (Arc<MemoryGraphStore>, EdgeDefinitionSet) {
        let store = Arc::new(MemoryGraphStore::new());
        let descriptor = store
            .create_graph(&CreateGraphRequest {
                name: "SocialGraph".to_string(),
                edge_definitions: vec![EdgeDefinition::new("Follow", ["Person"], ["Person"])],
                orphan_collections: vec![],
            })
            .await
            .unwrap();
        let set = EdgeDefinitionSet::new(
            Arc::new(Lifecycle::new("SocialGraph")),
            store.clone() as Arc<dyn GraphStore>,
        );
        set.adopt(&descriptor);
        (store, set)
    }

    #[test]
    fn view_vertex_collections_include_orphans_once() {
        let view = DefinitionView {
            edge_definitions: vec![
                EdgeDefinition::new("Follow", ["Person"], ["Person"]),
                EdgeDefinition::new("Visit", ["Person"], ["Host"]),
            ],
            orphan_collections: vec!["Tag".to_string()],
        };
        assert_eq!(view.vertex_collections(), vec!["Person", "Host", "Tag"]);
        assert!(view.is_referenced("Host"));
        assert!(!view.is_referenced("Tag"));
        assert!(view.contains_vertex_collection("Tag"));
    }

    #[tokio::test]
    async fn extend_with_known_name_is_a_noop() {
        let (_, set) = social_set().await;
        let view = set.extend("Follow", ["Person"], Vec::<String>::new()).await.unwrap();
        assert_eq!(view.definition("Follow").unwrap().from.len(), 1);
    }

    #[tokio::test]
    async fn extend_unions_new_names() {
        let (_, set) = social_set().await;
        let view = set.extend("Follow", ["Host"], ["Host"]).await.unwrap();
        let follow = view.definition("Follow").unwrap();
        assert_eq!(follow.from, vec!["Person", "Host"]);
        assert_eq!(follow.to, vec!["Person", "Host"]);
    }

    #[tokio::test]
    async fn extend_missing_definition_is_not_found() {
        let (_, set) = social_set().await;
        let err = set.extend("Relation", ["Host"], ["Host"]).await.unwrap_err();
        assert!(err.is_not_found(ResourceKind::EdgeDefinition));
    }

    #[tokio::test]
    async fn extend_sees_changes_made_through_another_set() {
        let (store, set) = social_set().await;
        let other = EdgeDefinitionSet::new(
            Arc::new(Lifecycle::new("SocialGraph")),
            store as Arc<dyn GraphStore>,
        );
        other.extend("Follow", ["Host"], Vec::<String>::new()).await.unwrap();

        let view = set.extend("Follow", ["Tag"], Vec::<String>::new()).await.unwrap();
        assert_eq!(view.definition("Follow").unwrap().from, vec!["Person", "Host", "Tag"]);
    }

    #[tokio::test]
    async fn rejected_edit_leaves_view_unchanged() {
        let (_, set) = social_set().await;
        let before = set.snapshot();
        let err = set.edit("Relation", ["Host"], ["Host"]).await.unwrap_err();
        assert!(err.is_not_found(ResourceKind::EdgeDefinition));
        assert_eq!(set.snapshot(), before);
    }

    #[tokio::test]
    async fn add_vertex_collection_is_idempotent() {
        let (_, set) = social_set().await;
        let first = set.add_vertex_collection("Host").await.unwrap();
        let second = set.add_vertex_collection("Host").await.unwrap();
        assert_eq!(first.orphan_collections, vec!["Host"]);
        assert_eq!(second, first);

        let referenced = set.add_vertex_collection("Person").await.unwrap();
        assert_eq!(referenced.orphan_collections, vec!["Host"]);
    }

    #[tokio::test]
    async fn add_vertex_collection_with_stale_view_refreshes() {
        let (store, set) = social_set().await;
        store.add_vertex_collection("SocialGraph", "Host").await.unwrap();

        let view = set.add_vertex_collection("Host").await.unwrap();
        assert_eq!(view.orphan_collections, vec!["Host"]);
    }

    #[tokio::test]
    async fn add_vertex_collection_reaches_store_when_view_is_stale() {
        let (store, set) = social_set().await;
        set.add_vertex_collection("Host").await.unwrap();

        let other = EdgeDefinitionSet::new(
            Arc::new(Lifecycle::new("SocialGraph")),
            store.clone() as Arc<dyn GraphStore>,
        );
        other.remove_vertex_collection("Host", false).await.unwrap();
        assert_eq!(set.snapshot().orphan_collections, vec!["Host"]);

        let view = set.add_vertex_collection("Host").await.unwrap();
        assert_eq!(view.orphan_collections, vec!["Host"]);
        let stored = store.graph("SocialGraph").await.unwrap();
        assert_eq!(stored.orphan_collections, vec!["Host"]);
    }

    #[tokio::test]
    async fn remove_referenced_collection_conflicts_and_keeps_view() {
        let (_, set) = social_set().await;
        let before = set.snapshot();
        let err = set.remove_vertex_collection("Person", false).await.unwrap_err();
        assert!(matches!(
            err,
            GraphError::Conflict {
                reason: ConflictReason::CollectionReferenced,
                ..
            }
        ));
        assert_eq!(set.snapshot(), before);
    }
}
