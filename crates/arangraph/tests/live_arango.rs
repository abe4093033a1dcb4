//! Tests against a running ArangoDB server
//!
//! Ignored by default. To run locally:
//!   docker run -e ARANGO_NO_AUTH=1 -p 8529:8529 arangodb
//!   ARANGO_ENDPOINT=http://localhost:8529 cargo test --test live_arango -- --ignored
//!
//! A `.env` file with the `ARANGO_*` variables is picked up as well.

use arangraph::{
    ConflictReason, EdgeDefinition, EdgeEndpoints, GraphClient, GraphError, GraphHandle,
    HttpGraphStore, Patch, ResourceKind, StoreConfig,
};
use serde_json::{json, Value};

fn client() -> GraphClient {
    dotenvy::dotenv().ok();
    let config = StoreConfig::from_env().expect("ARANGO_ENDPOINT must be set for live tests");
    GraphClient::connect(config).expect("valid store config")
}

async fn fresh_graph(client: &GraphClient, name: &str) -> GraphHandle {
    client.graph(name).drop(true).await.ok();
    let graph = client.graph(name);
    graph
        .create(
            vec![EdgeDefinition::new(
                format!("{name}_follow"),
                [format!("{name}_person")],
                [format!("{name}_person")],
            )],
            vec![],
        )
        .await
        .unwrap();
    graph
}

#[tokio::test]
#[ignore]
async fn live_store_builds_from_env() {
    dotenvy::dotenv().ok();
    let store = HttpGraphStore::from_env().unwrap();
    assert!(!store.config().endpoint.is_empty());
}

#[tokio::test]
#[ignore]
async fn live_graph_lifecycle() {
    let client = client();
    let graph = fresh_graph(&client, "arangraph_lifecycle").await;

    let err = client
        .graph("arangraph_lifecycle")
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

    graph
        .edge_definitions()
        .add_vertex_collection("arangraph_lifecycle_tag")
        .await
        .unwrap();
    let view = graph
        .edge_definitions()
        .remove_vertex_collection("arangraph_lifecycle_tag", true)
        .await
        .unwrap();
    assert!(view.orphan_collections.is_empty());

    assert!(graph.drop(true).await.unwrap());
    assert!(client
        .graph("arangraph_lifecycle")
        .info()
        .await
        .unwrap_err()
        .is_not_found(ResourceKind::Graph));
}

#[tokio::test]
#[ignore]
async fn live_revision_guards() {
    let client = client();
    let graph = fresh_graph(&client, "arangraph_revisions").await;
    let people = graph.vertex_collection::<Value>("arangraph_revisions_person");

    let meta = people.insert(&json!({"Age": 21, "Name": "raoof"})).await.unwrap();
    let doc = people.get(&meta.key, None).await.unwrap().unwrap();
    assert_eq!(doc.body["Age"], 21);

    let updated = people
        .update_by_key(&meta.key, &Patch::new().set("Age", 22), Some(&meta.rev))
        .await
        .unwrap();
    let err = people
        .replace_by_key(&meta.key, &json!({"Age": 0}), Some(&meta.rev))
        .await
        .unwrap_err();
    match err {
        GraphError::PreconditionFailed { expected, .. } => assert_eq!(expected, meta.rev),
        other => panic!("expected precondition failure, got {other:?}"),
    }

    let doc = people.get(&meta.key, None).await.unwrap().unwrap();
    assert_eq!(doc.meta.rev, updated.rev);
    assert_eq!(doc.body["Name"], "raoof");

    let b = people.insert(&json!({"Age": 1})).await.unwrap();
    let follows = graph.edge_collection::<Value>("arangraph_revisions_follow");
    let edge = follows
        .insert_edge(&EdgeEndpoints::new(&meta.id, &b.id), &json!({}))
        .await
        .unwrap();
    assert!(follows.get(&edge.key, None).await.unwrap().is_some());

    people.remove_by_key(&meta.key, None).await.unwrap();
    assert!(people.get(&meta.key, None).await.unwrap().is_none());

    graph.drop(true).await.unwrap();
}
