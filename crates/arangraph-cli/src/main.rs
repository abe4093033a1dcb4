//! arangraph - command-line client for ArangoDB named graphs
//!
//! ## Commands
//!
//! - `graph`: list, create, drop and inspect graphs
//! - `edge`: list and change edge definitions
//! - `vertex-collection`: manage orphan vertex collections
//! - `doc`: revision-guarded vertex and edge CRUD
//!
//! Connection settings come from `--endpoint` / `--database` or the
//! `ARANGO_*` environment variables; a `.env` file is loaded first.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use arangraph::{
    telemetry, DefinitionView, Document, EdgeDefinition, EdgeEndpoints, GraphClient, Patch,
    Revision, RevisionGuardedEntityStore, StoreConfig,
};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "arangraph")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Typed client for ArangoDB named graphs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Server URL
    #[arg(long, global = true, env = "ARANGO_ENDPOINT")]
    endpoint: Option<String>,

    /// Database name
    #[arg(long, global = true, env = "ARANGO_DATABASE", default_value = "_system")]
    database: String,

    /// Basic-auth user
    #[arg(long, global = true, env = "ARANGO_USERNAME", default_value = "root")]
    username: String,

    /// Basic-auth password
    #[arg(long, global = true, env = "ARANGO_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, env = "ARANGO_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Graph lifecycle
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Edge definitions of a graph
    Edge {
        #[command(subcommand)]
        action: EdgeAction,
    },

    /// Orphan vertex collections of a graph
    VertexCollection {
        #[command(subcommand)]
        action: VertexCollectionAction,
    },

    /// Vertex and edge documents
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// List all graphs
    List,

    /// Create a graph
    Create {
        /// Graph name
        name: String,

        /// Edge definition as `collection:from1,from2:to1,to2` (repeatable)
        #[arg(long = "edge")]
        edges: Vec<String>,

        /// Orphan vertex collection (repeatable)
        #[arg(long = "orphan")]
        orphans: Vec<String>,
    },

    /// Drop a graph
    Drop {
        name: String,

        /// Also delete member collections no other graph uses
        #[arg(long)]
        drop_collections: bool,
    },

    /// Show id, key and revision of a graph
    Info { name: String },
}

#[derive(Args)]
struct DefinitionArgs {
    /// Graph name
    graph: String,

    /// Edge collection
    collection: String,

    /// Source vertex collections
    #[arg(long, value_delimiter = ',')]
    from: Vec<String>,

    /// Target vertex collections
    #[arg(long, value_delimiter = ',')]
    to: Vec<String>,
}

#[derive(Subcommand)]
enum EdgeAction {
    /// List edge collections in definition order
    List { graph: String },

    /// Add a new edge definition
    Add(DefinitionArgs),

    /// Union vertex collections into an existing definition
    Extend(DefinitionArgs),

    /// Replace the from/to sets of an existing definition
    Edit(DefinitionArgs),

    /// Remove an edge definition
    Delete {
        graph: String,
        collection: String,

        /// Also delete the edge collection
        #[arg(long)]
        drop_collection: bool,
    },
}

#[derive(Subcommand)]
enum VertexCollectionAction {
    /// List all vertex collections, orphans included
    List { graph: String },

    /// Register an orphan vertex collection
    Add { graph: String, collection: String },

    /// Remove an orphan vertex collection
    Remove {
        graph: String,
        collection: String,

        /// Also delete the collection
        #[arg(long)]
        drop_collection: bool,
    },
}

#[derive(Args)]
struct DocTarget {
    /// Graph name
    graph: String,

    /// Vertex or edge collection
    collection: String,

    /// Treat the collection as an edge collection
    #[arg(long)]
    edge: bool,
}

#[derive(Args)]
struct BodyArgs {
    /// Document body as inline JSON
    #[arg(long, conflicts_with = "file")]
    body: Option<String>,

    /// Read the document body from a JSON file
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Args)]
struct EndpointArgs {
    /// Source vertex id (`collection/key`), edges only
    #[arg(long, requires = "to")]
    from: Option<String>,

    /// Target vertex id (`collection/key`), edges only
    #[arg(long, requires = "from")]
    to: Option<String>,
}

#[derive(Subcommand)]
enum DocAction {
    /// Read a document
    Get {
        #[command(flatten)]
        target: DocTarget,
        key: String,
        /// Expected revision
        #[arg(long)]
        if_match: Option<String>,
    },

    /// Insert a document
    Insert {
        #[command(flatten)]
        target: DocTarget,
        #[command(flatten)]
        body: BodyArgs,
        #[command(flatten)]
        endpoints: EndpointArgs,
    },

    /// Replace every field of a document
    Replace {
        #[command(flatten)]
        target: DocTarget,
        key: String,
        #[command(flatten)]
        body: BodyArgs,
        #[command(flatten)]
        endpoints: EndpointArgs,
        #[arg(long)]
        if_match: Option<String>,
    },

    /// Merge fields into a document
    Update {
        #[command(flatten)]
        target: DocTarget,
        key: String,
        #[command(flatten)]
        body: BodyArgs,
        #[arg(long)]
        if_match: Option<String>,
    },

    /// Delete a document
    Remove {
        #[command(flatten)]
        target: DocTarget,
        key: String,
        #[arg(long)]
        if_match: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.json, level);

    let client = GraphClient::connect(store_config(&cli)?)
        .context("Failed to configure ArangoDB connection")?;

    let output = run(&client, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn store_config(cli: &Cli) -> Result<StoreConfig> {
    let endpoint = cli
        .endpoint
        .clone()
        .ok_or_else(|| anyhow!("No endpoint: pass --endpoint or set ARANGO_ENDPOINT"))?;
    Ok(StoreConfig::new(endpoint)
        .with_database(&cli.database)
        .with_credentials(&cli.username, cli.password.clone())
        .with_timeout(Duration::from_secs(cli.timeout_secs)))
}

async fn run(client: &GraphClient, command: Commands) -> Result<Value> {
    match command {
        Commands::Graph { action } => match action {
            GraphAction::List => cmd_graph_list(client).await,
            GraphAction::Create {
                name,
                edges,
                orphans,
            } => cmd_graph_create(client, &name, &edges, orphans).await,
            GraphAction::Drop {
                name,
                drop_collections,
            } => cmd_graph_drop(client, &name, drop_collections).await,
            GraphAction::Info { name } => cmd_graph_info(client, &name).await,
        },
        Commands::Edge { action } => cmd_edge(client, action).await,
        Commands::VertexCollection { action } => cmd_vertex_collection(client, action).await,
        Commands::Doc { action } => cmd_doc(client, action).await,
    }
}

// ---------------------------------------------------------------------------
// Graphs
// ---------------------------------------------------------------------------

async fn cmd_graph_list(client: &GraphClient) -> Result<Value> {
    let graphs = client.list_graphs().await.context("Failed to list graphs")?;
    Ok(serde_json::to_value(graphs)?)
}

async fn cmd_graph_create(
    client: &GraphClient,
    name: &str,
    edges: &[String],
    orphans: Vec<String>,
) -> Result<Value> {
    let definitions = edges
        .iter()
        .map(|spec| parse_edge_definition(spec))
        .collect::<Result<Vec<_>>>()?;
    let created = client
        .graph(name)
        .create(definitions, orphans)
        .await
        .with_context(|| format!("Failed to create graph '{name}'"))?;
    Ok(serde_json::to_value(created)?)
}

async fn cmd_graph_drop(client: &GraphClient, name: &str, drop_collections: bool) -> Result<Value> {
    let dropped = client
        .graph(name)
        .drop(drop_collections)
        .await
        .with_context(|| format!("Failed to drop graph '{name}'"))?;
    Ok(json!({ "graph": name, "dropped": dropped }))
}

async fn cmd_graph_info(client: &GraphClient, name: &str) -> Result<Value> {
    let info = client
        .graph(name)
        .info()
        .await
        .with_context(|| format!("Failed to read graph '{name}'"))?;
    Ok(serde_json::to_value(info)?)
}

/// Parse `collection:from1,from2:to1,to2`.
fn parse_edge_definition(spec: &str) -> Result<EdgeDefinition> {
    let parts: Vec<&str> = spec.split(':').collect();
    let [collection, from, to] = parts.as_slice() else {
        bail!("Edge definition '{spec}' must look like collection:from1,from2:to1,to2");
    };
    let list = |raw: &str| -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    };
    if collection.trim().is_empty() {
        bail!("Edge definition '{spec}' has no collection name");
    }
    Ok(EdgeDefinition::new(collection.trim(), list(*from), list(*to)))
}

// ---------------------------------------------------------------------------
// Edge definitions and vertex collections
// ---------------------------------------------------------------------------

fn view_json(view: DefinitionView) -> Value {
    json!({
        "edgeDefinitions": view.edge_definitions,
        "orphanCollections": view.orphan_collections,
    })
}

async fn cmd_edge(client: &GraphClient, action: EdgeAction) -> Result<Value> {
    let view = match action {
        EdgeAction::List { graph } => {
            let names = client
                .graph(&graph)
                .list_edge_definitions()
                .await
                .with_context(|| format!("Failed to list edge definitions of '{graph}'"))?;
            return Ok(json!(names));
        }
        EdgeAction::Add(args) => client
            .graph(&args.graph)
            .edge_definitions()
            .add(EdgeDefinition::new(&args.collection, args.from, args.to))
            .await
            .with_context(|| format!("Failed to add edge definition '{}'", args.collection))?,
        EdgeAction::Extend(args) => client
            .graph(&args.graph)
            .edge_definitions()
            .extend(&args.collection, args.from, args.to)
            .await
            .with_context(|| format!("Failed to extend edge definition '{}'", args.collection))?,
        EdgeAction::Edit(args) => client
            .graph(&args.graph)
            .edge_definitions()
            .edit(&args.collection, args.from, args.to)
            .await
            .with_context(|| format!("Failed to edit edge definition '{}'", args.collection))?,
        EdgeAction::Delete {
            graph,
            collection,
            drop_collection,
        } => client
            .graph(&graph)
            .edge_definitions()
            .delete(&collection, drop_collection)
            .await
            .with_context(|| format!("Failed to delete edge definition '{collection}'"))?,
    };
    Ok(view_json(view))
}

async fn cmd_vertex_collection(
    client: &GraphClient,
    action: VertexCollectionAction,
) -> Result<Value> {
    let view = match action {
        VertexCollectionAction::List { graph } => {
            let names = client
                .graph(&graph)
                .list_vertex_collections()
                .await
                .with_context(|| format!("Failed to list vertex collections of '{graph}'"))?;
            return Ok(json!(names));
        }
        VertexCollectionAction::Add { graph, collection } => client
            .graph(&graph)
            .edge_definitions()
            .add_vertex_collection(&collection)
            .await
            .with_context(|| format!("Failed to add vertex collection '{collection}'"))?,
        VertexCollectionAction::Remove {
            graph,
            collection,
            drop_collection,
        } => client
            .graph(&graph)
            .edge_definitions()
            .remove_vertex_collection(&collection, drop_collection)
            .await
            .with_context(|| format!("Failed to remove vertex collection '{collection}'"))?,
    };
    Ok(view_json(view))
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

fn doc_store(client: &GraphClient, target: &DocTarget) -> RevisionGuardedEntityStore<Value> {
    let graph = client.graph(&target.graph);
    if target.edge {
        graph.edge_collection(&target.collection)
    } else {
        graph.vertex_collection(&target.collection)
    }
}

/// Load a body from `--body` or `--file`; `{}` when neither is given.
fn read_body(args: &BodyArgs) -> Result<Value> {
    let raw = match (&args.body, &args.file) {
        (Some(inline), _) => inline.clone(),
        (None, Some(path)) => read_file(path)?,
        (None, None) => return Ok(json!({})),
    };
    let body: Value = serde_json::from_str(&raw).context("Document body is not valid JSON")?;
    if !body.is_object() {
        bail!("Document body must be a JSON object");
    }
    Ok(body)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn endpoints(args: EndpointArgs) -> Option<EdgeEndpoints> {
    match (args.from, args.to) {
        (Some(from), Some(to)) => Some(EdgeEndpoints::new(from, to)),
        _ => None,
    }
}

fn document_json(document: Document<Value>) -> Value {
    let mut object = match document.body {
        Value::Object(object) => object,
        _ => serde_json::Map::new(),
    };
    object.insert("_id".to_string(), json!(document.meta.id));
    object.insert("_key".to_string(), json!(document.meta.key));
    object.insert("_rev".to_string(), json!(document.meta.rev));
    if let Some(endpoints) = document.endpoints {
        object.insert("_from".to_string(), json!(endpoints.from));
        object.insert("_to".to_string(), json!(endpoints.to));
    }
    Value::Object(object)
}

async fn cmd_doc(client: &GraphClient, action: DocAction) -> Result<Value> {
    match action {
        DocAction::Get {
            target,
            key,
            if_match,
        } => {
            let rev = if_match.map(Revision::from);
            let document = doc_store(client, &target)
                .get(&key, rev.as_ref())
                .await
                .with_context(|| format!("Failed to read {}/{key}", target.collection))?;
            if document.is_none() {
                debug!(key = %key, "Document absent");
            }
            Ok(document.map(document_json).unwrap_or(Value::Null))
        }
        DocAction::Insert {
            target,
            body,
            endpoints: edge,
        } => {
            let body = read_body(&body)?;
            let store = doc_store(client, &target);
            let meta = match endpoints(edge) {
                Some(endpoints) => store.insert_edge(&endpoints, &body).await,
                None => store.insert(&body).await,
            }
            .with_context(|| format!("Failed to insert into {}", target.collection))?;
            Ok(serde_json::to_value(meta)?)
        }
        DocAction::Replace {
            target,
            key,
            body,
            endpoints: edge,
            if_match,
        } => {
            let body = read_body(&body)?;
            let rev = if_match.map(Revision::from);
            let store = doc_store(client, &target);
            let meta = match endpoints(edge) {
                Some(endpoints) => {
                    store
                        .replace_edge_by_key(&key, &endpoints, &body, rev.as_ref())
                        .await
                }
                None => store.replace_by_key(&key, &body, rev.as_ref()).await,
            }
            .with_context(|| format!("Failed to replace {}/{key}", target.collection))?;
            Ok(serde_json::to_value(meta)?)
        }
        DocAction::Update {
            target,
            key,
            body,
            if_match,
        } => {
            let patch = match read_body(&body)? {
                Value::Object(fields) => Patch::from(fields),
                _ => Patch::new(),
            };
            let rev = if_match.map(Revision::from);
            let meta = doc_store(client, &target)
                .update_by_key(&key, &patch, rev.as_ref())
                .await
                .with_context(|| format!("Failed to update {}/{key}", target.collection))?;
            Ok(serde_json::to_value(meta)?)
        }
        DocAction::Remove {
            target,
            key,
            if_match,
        } => {
            let rev = if_match.map(Revision::from);
            doc_store(client, &target)
                .remove_by_key(&key, rev.as_ref())
                .await
                .with_context(|| format!("Failed to remove {}/{key}", target.collection))?;
            Ok(json!({ "_key": key, "removed": true }))
        }
    }
}
