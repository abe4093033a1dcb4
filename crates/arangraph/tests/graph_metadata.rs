//! Graph metadata contract tests
//!
//! Lifecycle, edge definition mirroring and orphan bookkeeping, run against
//! the in-memory store.

use arangraph::{
    ConflictReason, EdgeDefinition, GraphClient, GraphError, GraphState, ResourceKind,
};

fn follow() -> EdgeDefinition {
    EdgeDefinition::new("Follow", ["Person"], ["Person"])
}

// ===========================================================================
// Lifecycle
// ===========================================================================

#[tokio::test]
async fn create_returns_store_identity_and_normalized_definitions() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");

    let created = graph
        .create(
            vec![EdgeDefinition::new("Follow", ["Person", "Person"], ["Person"])],
            vec![],
        )
        .await
        .unwrap();

    assert_eq!(created.key, "SocialGraph");
    assert!(!created.id.is_empty());
    assert!(!created.rev.as_str().is_empty());
    assert_eq!(created.edge_definitions, vec![follow()]);
    assert_eq!(graph.state(), GraphState::Created);
}

#[tokio::test]
async fn info_does_not_change_state() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");
    let created = graph.create(vec![follow()], vec![]).await.unwrap();

    let first = graph.info().await.unwrap();
    let second = graph.info().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, created.info());
}

#[tokio::test]
async fn duplicate_create_is_conflict() {
    let client = GraphClient::in_memory();
    client.graph("SocialGraph").create(vec![follow()], vec![]).await.unwrap();

    let err = client
        .graph("SocialGraph")
        .create(vec![], vec![])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::Conflict {
            reason: ConflictReason::GraphExists,
            ..
        }
    ));
}

#[tokio::test]
async fn every_operation_after_drop_is_invalid_state() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");
    graph.create(vec![follow()], vec![]).await.unwrap();
    let definitions = graph.edge_definitions();

    assert!(graph.drop(false).await.unwrap());

    let results = vec![
        graph.info().await.map(|_| ()),
        graph.open().await.map(|_| ()),
        definitions.list().await.map(|_| ()),
        definitions
            .extend("Follow", ["Host"], Vec::<String>::new())
            .await
            .map(|_| ()),
        definitions.edit("Follow", ["Host"], ["Host"]).await.map(|_| ()),
        definitions.delete("Follow", false).await.map(|_| ()),
        definitions.add_vertex_collection("Host").await.map(|_| ()),
        definitions
            .remove_vertex_collection("Host", false)
            .await
            .map(|_| ()),
        graph
            .vertex_collection::<serde_json::Value>("Person")
            .get("1", None)
            .await
            .map(|_| ()),
    ];
    for result in results {
        assert!(matches!(result, Err(GraphError::InvalidState { .. })));
    }

    // Idempotent drop
    assert!(!graph.drop(false).await.unwrap());
}

#[tokio::test]
async fn drop_leaves_other_handles_to_find_nothing() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");
    graph.create(vec![follow()], vec![]).await.unwrap();
    graph.drop(true).await.unwrap();

    let other = client.graph("SocialGraph");
    assert!(other.info().await.unwrap_err().is_not_found(ResourceKind::Graph));
    assert!(client.list_graphs().await.unwrap().is_empty());
}

// ===========================================================================
// Edge definitions
// ===========================================================================

#[tokio::test]
async fn list_keeps_definition_order() {
    let client = GraphClient::in_memory();
    let graph = client.graph("Web");
    graph
        .create(
            vec![
                EdgeDefinition::new("Visit", ["Person"], ["Host"]),
                EdgeDefinition::new("Follow", ["Person"], ["Person"]),
            ],
            vec![],
        )
        .await
        .unwrap();
    graph
        .edge_definitions()
        .add(EdgeDefinition::new("Link", ["Host"], ["Host"]))
        .await
        .unwrap();

    assert_eq!(
        graph.list_edge_definitions().await.unwrap(),
        vec!["Visit", "Follow", "Link"]
    );
}

#[tokio::test]
async fn add_existing_definition_conflicts() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");
    graph.create(vec![follow()], vec![]).await.unwrap();

    let err = graph.edge_definitions().add(follow()).await.unwrap_err();
    assert!(matches!(
        err,
        GraphError::Conflict {
            reason: ConflictReason::DefinitionExists,
            ..
        }
    ));
}

#[tokio::test]
async fn extend_with_present_name_keeps_set_size() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");
    graph.create(vec![follow()], vec![]).await.unwrap();
    let rev_before = graph.info().await.unwrap().rev;

    let view = graph
        .edge_definitions()
        .extend("Follow", ["Person"], ["Person"])
        .await
        .unwrap();
    let follow = view.definition("Follow").unwrap();
    assert_eq!(follow.from.len(), 1);
    assert_eq!(follow.to.len(), 1);
    assert_eq!(graph.info().await.unwrap().rev, rev_before);
}

#[tokio::test]
async fn edit_replaces_endpoints_and_orphans_the_dropped_ones() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");
    graph.create(vec![follow()], vec![]).await.unwrap();

    let view = graph
        .edge_definitions()
        .edit("Follow", ["Host"], ["Host"])
        .await
        .unwrap();
    assert_eq!(view.definition("Follow").unwrap().from, vec!["Host"]);
    assert_eq!(view.orphan_collections, vec!["Person"]);
}

#[tokio::test]
async fn delete_moves_sole_referenced_collections_into_orphans() {
    let client = GraphClient::in_memory();
    let graph = client.graph("Web");
    graph
        .create(
            vec![
                EdgeDefinition::new("Visit", ["Person"], ["Host"]),
                EdgeDefinition::new("Follow", ["Person"], ["Person"]),
            ],
            vec![],
        )
        .await
        .unwrap();

    let view = graph.edge_definitions().delete("Visit", false).await.unwrap();
    assert_eq!(view.names(), vec!["Follow"]);
    assert_eq!(view.orphan_collections, vec!["Host"]);
    assert!(graph
        .list_vertex_collections()
        .await
        .unwrap()
        .contains(&"Host".to_string()));

    let err = graph
        .edge_definitions()
        .delete("Visit", false)
        .await
        .unwrap_err();
    assert!(err.is_not_found(ResourceKind::EdgeDefinition));
}

// ===========================================================================
// Vertex collections
// ===========================================================================

#[tokio::test]
async fn add_then_remove_restores_orphan_count() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");
    graph
        .create(vec![follow()], vec!["Tag".to_string()])
        .await
        .unwrap();
    let before = graph.edge_definitions().snapshot().orphan_collections.len();

    graph.edge_definitions().add_vertex_collection("Host").await.unwrap();
    let view = graph
        .edge_definitions()
        .remove_vertex_collection("Host", false)
        .await
        .unwrap();
    assert_eq!(view.orphan_collections.len(), before);
}

#[tokio::test]
async fn removing_referenced_collection_is_conflict() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");
    graph.create(vec![follow()], vec![]).await.unwrap();

    let err = graph
        .edge_definitions()
        .remove_vertex_collection("Person", false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::Conflict {
            reason: ConflictReason::CollectionReferenced,
            ..
        }
    ));
    assert_eq!(
        graph.list_vertex_collections().await.unwrap(),
        vec!["Person"]
    );
}

#[tokio::test]
async fn extending_with_an_orphan_takes_it_out_of_orphans() {
    let client = GraphClient::in_memory();
    let graph = client.graph("SocialGraph");
    graph.create(vec![follow()], vec![]).await.unwrap();
    graph.edge_definitions().add_vertex_collection("Host").await.unwrap();

    let view = graph
        .edge_definitions()
        .extend("Follow", Vec::<String>::new(), ["Host"])
        .await
        .unwrap();
    assert!(view.orphan_collections.is_empty());
    assert!(view.is_referenced("Host"));
}

#[tokio::test]
async fn re_adding_a_collection_removed_by_another_handle_reaches_the_store() {
    let client = GraphClient::in_memory();
    let first = client.graph("SocialGraph");
    first.create(vec![follow()], vec![]).await.unwrap();
    first.edge_definitions().add_vertex_collection("Host").await.unwrap();

    let second = client.graph("SocialGraph");
    second.open().await.unwrap();
    second
        .edge_definitions()
        .remove_vertex_collection("Host", false)
        .await
        .unwrap();

    let view = first
        .edge_definitions()
        .add_vertex_collection("Host")
        .await
        .unwrap();
    assert_eq!(view.orphan_collections, vec!["Host"]);
    assert_eq!(
        client.graph("SocialGraph").info().await.unwrap(),
        first.info().await.unwrap()
    );
    assert!(second
        .edge_definitions()
        .refresh()
        .await
        .unwrap()
        .is_orphan("Host"));

    first
        .vertex_collection::<serde_json::Value>("Host")
        .insert(&serde_json::json!({"address": "10.0.0.1"}))
        .await
        .unwrap();
}

#[tokio::test]
async fn info_on_unbound_handle_keeps_it_unbound() {
    let client = GraphClient::in_memory();
    client.graph("SocialGraph").create(vec![follow()], vec![]).await.unwrap();

    let graph = client.graph("SocialGraph");
    graph.info().await.unwrap();
    assert_eq!(graph.state(), GraphState::Unbound);

    graph.open().await.unwrap();
    assert_eq!(graph.state(), GraphState::Created);
}
