//! Graph lifecycle and metadata
//!
//! A handle starts `Unbound` (a name only), becomes `Created` once the store
//! confirms the graph exists, and ends `Dropped`. A dropped handle refuses
//! every further operation locally, without a store round-trip.

use std::sync::{Arc, Mutex};

use tracing::{info, instrument, warn};

use crate::edge_definitions::EdgeDefinitionSet;
use crate::error::{GraphError, GraphResult};
use crate::lock_unpoisoned;
use crate::schema::{dedup_names, EdgeDefinition, GraphDescriptor, GraphInfo};
use crate::store_traits::{CreateGraphRequest, GraphStore};

/// Client-side lifecycle of a graph handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// Handle with a name and no confirmed server-side graph
    Unbound,
    /// The store has confirmed the graph exists
    Created,
    /// Terminal: the graph was dropped through this handle
    Dropped,
}

/// Lifecycle state shared by everything a graph handle hands out.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    graph: String,
    state: Mutex<GraphState>,
}

impl Lifecycle {
    pub(crate) fn new(graph: impl Into<String>) -> Self {
        Self {
            graph: graph.into(),
            state: Mutex::new(GraphState::Unbound),
        }
    }

    pub(crate) fn graph(&self) -> &str {
        &self.graph
    }

    pub(crate) fn state(&self) -> GraphState {
        *lock_unpoisoned(&self.state)
    }

    pub(crate) fn ensure_usable(&self, operation: &'static str) -> GraphResult<()> {
        if self.state() == GraphState::Dropped {
            return Err(GraphError::InvalidState {
                graph: self.graph.clone(),
                operation,
            });
        }
        Ok(())
    }

    /// Unbound → Created. Never leaves `Dropped`.
    pub(crate) fn mark_created(&self) {
        let mut state = lock_unpoisoned(&self.state);
        if *state == GraphState::Unbound {
            *state = GraphState::Created;
        }
    }

    /// Move to `Dropped`, returning the previous state.
    pub(crate) fn mark_dropped(&self) -> GraphState {
        std::mem::replace(&mut *lock_unpoisoned(&self.state), GraphState::Dropped)
    }
}

/// Creates, inspects and drops one named graph and owns its edge
/// definitions.
pub struct GraphMetadataManager {
    lifecycle: Arc<Lifecycle>,
    store: Arc<dyn GraphStore>,
    definitions: EdgeDefinitionSet,
}

impl std::fmt::Debug for GraphMetadataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphMetadataManager")
            .field("graph", &self.name())
            .field("state", &self.state())
            .field("definitions", &self.definitions)
            .finish()
    }
}

impl GraphMetadataManager {
    pub(crate) fn new(name: impl Into<String>, store: Arc<dyn GraphStore>) -> Self {
        let lifecycle = Arc::new(Lifecycle::new(name));
        let definitions = EdgeDefinitionSet::new(lifecycle.clone(), store.clone());
        Self {
            lifecycle,
            store,
            definitions,
        }
    }

    pub(crate) fn lifecycle(&self) -> Arc<Lifecycle> {
        self.lifecycle.clone()
    }

    pub fn name(&self) -> &str {
        self.lifecycle.graph()
    }

    pub fn state(&self) -> GraphState {
        self.lifecycle.state()
    }

    /// Edge definitions and orphans of this graph.
    pub fn edge_definitions(&self) -> &EdgeDefinitionSet {
        &self.definitions
    }

    /// Create the graph on the store.
    ///
    /// Definitions are normalized (duplicate endpoints dropped) before they
    /// are sent. `Conflict` if a graph with this name already exists.
    #[instrument(skip_all, fields(graph = %self.name()))]
    pub async fn create(
        &self,
        edge_definitions: Vec<EdgeDefinition>,
        orphan_collections: Vec<String>,
    ) -> GraphResult<GraphDescriptor> {
        self.lifecycle.ensure_usable("create the graph")?;

        let request = CreateGraphRequest {
            name: self.name().to_string(),
            edge_definitions: edge_definitions
                .into_iter()
                .map(EdgeDefinition::normalized)
                .collect(),
            orphan_collections: dedup_names(orphan_collections),
        };
        let descriptor = self.store.create_graph(&request).await?;
        self.definitions.adopt(&descriptor);
        self.lifecycle.mark_created();

        info!(
            id = %descriptor.id,
            definitions = descriptor.edge_definitions.len(),
            "Graph created"
        );
        Ok(descriptor)
    }

    /// Bind this handle to a graph that already exists on the store.
    #[instrument(skip(self), fields(graph = %self.name()))]
    pub async fn open(&self) -> GraphResult<GraphDescriptor> {
        self.lifecycle.ensure_usable("open the graph")?;
        let descriptor = self.store.graph(self.name()).await?;
        self.definitions.adopt(&descriptor);
        self.lifecycle.mark_created();
        Ok(descriptor)
    }

    /// Current `(id, key, rev)` of the graph. `NotFound` if it does not
    /// exist. Refreshes the mirrored definitions; the lifecycle state is
    /// unchanged.
    #[instrument(skip(self), fields(graph = %self.name()))]
    pub async fn info(&self) -> GraphResult<GraphInfo> {
        self.lifecycle.ensure_usable("read graph info")?;
        let descriptor = self.store.graph(self.name()).await?;
        self.definitions.adopt(&descriptor);
        Ok(descriptor.info())
    }

    /// Drop the graph.
    ///
    /// Returns `true` if the store removed it, `false` if it did not exist
    /// or this handle had already dropped it. With `drop_collections` the
    /// store also deletes member collections no other graph uses.
    #[instrument(skip(self), fields(graph = %self.name()))]
    pub async fn drop(&self, drop_collections: bool) -> GraphResult<bool> {
        if self.state() == GraphState::Dropped {
            return Ok(false);
        }

        let removed = self.store.drop_graph(self.name(), drop_collections).await?;
        self.lifecycle.mark_dropped();
        self.definitions.clear();

        if removed {
            info!("Graph dropped");
        } else {
            warn!("Graph did not exist on the store");
        }
        Ok(removed)
    }
}
