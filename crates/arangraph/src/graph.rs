//! Client entry point and per-graph facade
//!
//! ```no_run
//! use arangraph::{EdgeDefinition, GraphClient, StoreConfig};
//!
//! # async fn demo() -> arangraph::GraphResult<()> {
//! let client = GraphClient::connect(StoreConfig::from_env()?)?;
//! let graph = client.graph("SocialGraph");
//! graph
//!     .create(vec![EdgeDefinition::new("Follow", ["Person"], ["Person"])], vec![])
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use crate::edge_definitions::{DefinitionView, EdgeDefinitionSet};
use crate::entity_store::RevisionGuardedEntityStore;
use crate::error::GraphResult;
use crate::fakes::MemoryGraphStore;
use crate::http_store::{HttpGraphStore, StoreConfig};
use crate::metadata::{GraphMetadataManager, GraphState};
use crate::naming::{CollectionNameResolver, GraphEntity};
use crate::schema::{
    Document, DocumentMeta, EdgeDefinition, ElementKind, GraphDescriptor, GraphInfo, Patch,
    Revision,
};
use crate::store_traits::GraphStore;

/// Store-wide entry point. Cheap to clone.
#[derive(Clone)]
pub struct GraphClient {
    store: Arc<dyn GraphStore>,
    resolver: Arc<CollectionNameResolver>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    pub fn new(store: Arc<dyn GraphStore>, resolver: CollectionNameResolver) -> Self {
        Self {
            store,
            resolver: Arc::new(resolver),
        }
    }

    /// Client over a fresh [`MemoryGraphStore`] with the default resolver.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryGraphStore::new()), CollectionNameResolver::default())
    }

    /// Client over an ArangoDB server with the default resolver.
    pub fn connect(config: StoreConfig) -> GraphResult<Self> {
        Ok(Self::new(
            Arc::new(HttpGraphStore::new(config)?),
            CollectionNameResolver::default(),
        ))
    }

    /// Swap the resolver used by handles created afterwards.
    pub fn with_resolver(mut self, resolver: CollectionNameResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn resolver(&self) -> &CollectionNameResolver {
        &self.resolver
    }

    pub fn store(&self) -> Arc<dyn GraphStore> {
        self.store.clone()
    }

    /// Unbound handle for the graph called `name`. No request is made.
    pub fn graph(&self, name: impl Into<String>) -> GraphHandle {
        GraphHandle {
            metadata: GraphMetadataManager::new(name, self.store.clone()),
            store: self.store.clone(),
            resolver: self.resolver.clone(),
        }
    }

    /// Every graph on the store.
    #[instrument(skip(self))]
    pub async fn list_graphs(&self) -> GraphResult<Vec<GraphDescriptor>> {
        self.store.list_graphs().await
    }
}

/// One named graph: metadata, edge definitions and typed CRUD.
pub struct GraphHandle {
    metadata: GraphMetadataManager,
    store: Arc<dyn GraphStore>,
    resolver: Arc<CollectionNameResolver>,
}

impl std::fmt::Debug for GraphHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphHandle")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl GraphHandle {
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    pub fn state(&self) -> GraphState {
        self.metadata.state()
    }

    pub fn metadata(&self) -> &GraphMetadataManager {
        &self.metadata
    }

    pub fn edge_definitions(&self) -> &EdgeDefinitionSet {
        self.metadata.edge_definitions()
    }

    pub fn resolver(&self) -> &CollectionNameResolver {
        &self.resolver
    }

    pub async fn create(
        &self,
        edge_definitions: Vec<EdgeDefinition>,
        orphan_collections: Vec<String>,
    ) -> GraphResult<GraphDescriptor> {
        self.metadata.create(edge_definitions, orphan_collections).await
    }

    pub async fn open(&self) -> GraphResult<GraphDescriptor> {
        self.metadata.open().await
    }

    pub async fn info(&self) -> GraphResult<GraphInfo> {
        self.metadata.info().await
    }

    pub async fn drop(&self, drop_collections: bool) -> GraphResult<bool> {
        self.metadata.drop(drop_collections).await
    }

    pub async fn list_edge_definitions(&self) -> GraphResult<Vec<String>> {
        self.edge_definitions().list().await
    }

    pub async fn list_vertex_collections(&self) -> GraphResult<Vec<String>> {
        self.edge_definitions().vertex_collections().await
    }

    /// Register the collection of vertex type `T` as an orphan.
    pub async fn add_vertex_collection_for<T: GraphEntity>(&self) -> GraphResult<DefinitionView> {
        let collection = self.resolver.resolve::<T>()?;
        self.edge_definitions().add_vertex_collection(&collection).await
    }

    pub async fn remove_vertex_collection_for<T: GraphEntity>(
        &self,
        drop_collection: bool,
    ) -> GraphResult<DefinitionView> {
        let collection = self.resolver.resolve::<T>()?;
        self.edge_definitions()
            .remove_vertex_collection(&collection, drop_collection)
            .await
    }

    pub async fn delete_edge_definition_for<E: GraphEntity>(
        &self,
        drop_collection: bool,
    ) -> GraphResult<DefinitionView> {
        let collection = self.resolver.resolve::<E>()?;
        self.edge_definitions().delete(&collection, drop_collection).await
    }

    /// Vertex CRUD for entity type `T`, collection resolved by name.
    pub fn vertices<T: GraphEntity>(&self) -> GraphResult<RevisionGuardedEntityStore<T>> {
        Ok(self.vertex_collection(self.resolver.resolve::<T>()?))
    }

    /// Edge CRUD for entity type `T`, collection resolved by name.
    pub fn edges<T: GraphEntity>(&self) -> GraphResult<RevisionGuardedEntityStore<T>> {
        Ok(self.edge_collection(self.resolver.resolve::<T>()?))
    }

    /// Vertex CRUD on an explicitly named collection.
    pub fn vertex_collection<T>(
        &self,
        collection: impl Into<String>,
    ) -> RevisionGuardedEntityStore<T>
    where
        T: Serialize + DeserializeOwned,
    {
        self.entity_store(collection, ElementKind::Vertex)
    }

    /// Edge CRUD on an explicitly named collection.
    pub fn edge_collection<T>(&self, collection: impl Into<String>) -> RevisionGuardedEntityStore<T>
    where
        T: Serialize + DeserializeOwned,
    {
        self.entity_store(collection, ElementKind::Edge)
    }

    fn entity_store<T>(
        &self,
        collection: impl Into<String>,
        kind: ElementKind,
    ) -> RevisionGuardedEntityStore<T>
    where
        T: Serialize + DeserializeOwned,
    {
        RevisionGuardedEntityStore::new(
            self.metadata.lifecycle(),
            self.store.clone(),
            collection,
            kind,
        )
    }

    pub async fn insert_vertex<T: GraphEntity>(&self, entity: &T) -> GraphResult<DocumentMeta> {
        self.vertices::<T>()?.insert(entity).await
    }

    pub async fn get_vertex<T: GraphEntity>(
        &self,
        key: &str,
        if_match: Option<&Revision>,
    ) -> GraphResult<Option<Document<T>>> {
        self.vertices::<T>()?.get(key, if_match).await
    }

    pub async fn replace_vertex<T: GraphEntity>(
        &self,
        document: &Document<T>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        self.vertices::<T>()?.replace(document, if_match).await
    }

    pub async fn replace_vertex_by_key<T: GraphEntity>(
        &self,
        key: &str,
        entity: &T,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        self.vertices::<T>()?.replace_by_key(key, entity, if_match).await
    }

    pub async fn update_vertex<T: GraphEntity>(
        &self,
        document: &Document<T>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        self.vertices::<T>()?.update(document, if_match).await
    }

    pub async fn update_vertex_by_key<T: GraphEntity>(
        &self,
        key: &str,
        patch: &Patch,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        self.vertices::<T>()?.update_by_key(key, patch, if_match).await
    }

    pub async fn remove_vertex_by_key<T: GraphEntity>(
        &self,
        key: &str,
        if_match: Option<&Revision>,
    ) -> GraphResult<()> {
        self.vertices::<T>()?.remove_by_key(key, if_match).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::naming::NamingConvention;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Person {
        #[serde(default)]
        age: u32,
        #[serde(default)]
        name: Option<String>,
    }

    impl GraphEntity for Person {
        const TYPE_NAME: &'static str = "Person";
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct HostName {
        host: String,
    }

    impl GraphEntity for HostName {
        const TYPE_NAME: &'static str = "HostName";
    }

    #[tokio::test]
    async fn handles_for_one_graph_share_the_store() {
        let client = GraphClient::in_memory();
        let first = client.graph("SocialGraph");
        first
            .create(vec![EdgeDefinition::new("Follow", ["Person"], ["Person"])], vec![])
            .await
            .unwrap();

        let second = client.graph("SocialGraph");
        let meta = second.insert_vertex(&Person::default()).await.unwrap();
        let doc = first.get_vertex::<Person>(&meta.key, None).await.unwrap();
        assert!(doc.is_some());
    }

    #[tokio::test]
    async fn typed_vertex_collection_uses_resolver() {
        let client = GraphClient::in_memory()
            .with_resolver(CollectionNameResolver::new(NamingConvention::SnakeCase));
        let graph = client.graph("Hosts");
        graph.create(vec![], vec![]).await.unwrap();

        let view = graph.add_vertex_collection_for::<HostName>().await.unwrap();
        assert_eq!(view.orphan_collections, vec!["host_name"]);

        let meta = graph
            .insert_vertex(&HostName {
                host: "example.org".to_string(),
            })
            .await
            .unwrap();
        assert!(meta.id.starts_with("host_name/"));

        let view = graph.remove_vertex_collection_for::<HostName>(false).await.unwrap();
        assert!(view.orphan_collections.is_empty());
    }

    #[tokio::test]
    async fn explicit_convention_without_mapping_fails_before_any_request() {
        let client = GraphClient::in_memory()
            .with_resolver(CollectionNameResolver::new(NamingConvention::Explicit));
        let graph = client.graph("SocialGraph");
        let err = graph.insert_vertex(&Person::default()).await.unwrap_err();
        assert!(matches!(err, GraphError::Configuration { .. }));
        assert_eq!(graph.state(), GraphState::Unbound);
    }

    #[tokio::test]
    async fn list_graphs_is_ordered_by_name() {
        let client = GraphClient::in_memory();
        for name in ["b", "a", "c"] {
            client.graph(name).create(vec![], vec![]).await.unwrap();
        }
        let names: Vec<String> = client
            .list_graphs()
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.key)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
