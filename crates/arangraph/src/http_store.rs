//! ArangoDB gharial API over HTTP
//!
//! Routes used, relative to `{endpoint}/_db/{database}/_api/gharial`:
//! - `POST /`, `GET /`, `GET /{graph}`, `DELETE /{graph}`
//! - `POST /{graph}/edge`, `PUT|DELETE /{graph}/edge/{collection}`
//! - `POST /{graph}/vertex`, `DELETE /{graph}/vertex/{collection}`
//! - `POST /{graph}/{vertex|edge}/{collection}`
//! - `GET|PUT|PATCH|DELETE /{graph}/{vertex|edge}/{collection}/{key}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::IF_MATCH;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::{ConflictReason, GraphError, GraphResult, ResourceKind};
use crate::schema::{DocumentMeta, EdgeDefinition, GraphDescriptor, Revision};
use crate::store_traits::{CollectionRef, CreateGraphRequest, GraphStore};

const DEFAULT_DATABASE: &str = "_system";
const DEFAULT_USERNAME: &str = "root";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ArangoDB error numbers the client distinguishes
const ERROR_DOCUMENT_NOT_FOUND: u32 = 1202;
const ERROR_GRAPH_DUPLICATE_DEFINITION: u32 = 1920;
const ERROR_GRAPH_COLLECTION_IN_OTHER_GRAPH: u32 = 1921;
const ERROR_GRAPH_NOT_FOUND: u32 = 1924;
const ERROR_GRAPH_DUPLICATE: u32 = 1925;
const ERROR_GRAPH_NOT_IN_ORPHANS: u32 = 1928;
const ERROR_GRAPH_COLLECTION_USED_IN_EDGE_DEF: u32 = 1929;
const ERROR_GRAPH_EDGE_COLLECTION_NOT_USED: u32 = 1930;
const ERROR_GRAPH_COLLECTION_USED_IN_ORPHANS: u32 = 1938;

/// Connection settings for [`HttpGraphStore`]
#[derive(Clone)]
pub struct StoreConfig {
    /// Server URL, e.g. `http://localhost:8529`
    pub endpoint: String,
    /// Database name (default: `_system`)
    pub database: String,
    pub username: String,
    pub password: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StoreConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            database: DEFAULT_DATABASE.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set custom database
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set basic-auth credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - ARANGO_ENDPOINT (required)
    /// - ARANGO_DATABASE (optional, default: "_system")
    /// - ARANGO_USERNAME (optional, default: "root")
    /// - ARANGO_PASSWORD (optional)
    /// - ARANGO_TIMEOUT_SECS (optional, default: 30)
    pub fn from_env() -> GraphResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GraphResult<Self> {
        let endpoint = lookup("ARANGO_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| GraphError::configuration("ARANGO_ENDPOINT not set"))?;
        let timeout = match lookup("ARANGO_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                GraphError::configuration(format!("ARANGO_TIMEOUT_SECS is not a number: '{raw}'"))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self::new(endpoint)
            .with_database(
                lookup("ARANGO_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            )
            .with_credentials(
                lookup("ARANGO_USERNAME").unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
                lookup("ARANGO_PASSWORD"),
            )
            .with_timeout(Duration::from_secs(timeout)))
    }
}

/// Error body returned by the server
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(rename = "errorNum", default)]
    error_num: u32,
    #[serde(rename = "errorMessage", default)]
    error_message: String,
    /// Current revision, present on precondition failures
    #[serde(rename = "_rev")]
    rev: Option<String>,
}

/// What a request was about, used to give errors their context
#[derive(Debug, Clone, Copy, Default)]
struct Subject<'a> {
    graph: &'a str,
    collection: Option<&'a str>,
    key: Option<&'a str>,
    expected: Option<&'a Revision>,
}

impl<'a> Subject<'a> {
    fn graph(graph: &'a str) -> Self {
        Self {
            graph,
            ..Self::default()
        }
    }

    fn collection(graph: &'a str, collection: &'a str) -> Self {
        Self {
            graph,
            collection: Some(collection),
            ..Self::default()
        }
    }

    fn document(target: CollectionRef<'a>, key: &'a str, expected: Option<&'a Revision>) -> Self {
        Self {
            graph: target.graph,
            collection: Some(target.collection),
            key: Some(key),
            expected,
        }
    }

    fn name_for(&self, kind: ResourceKind) -> String {
        match (kind, self.collection, self.key) {
            (ResourceKind::Graph, _, _) => self.graph.to_string(),
            (ResourceKind::Document, Some(collection), Some(key)) => format!("{collection}/{key}"),
            (_, Some(collection), _) => collection.to_string(),
            _ => self.graph.to_string(),
        }
    }
}

/// Map a failed response onto the error taxonomy.
fn classify(status: StatusCode, error: ApiError, subject: Subject<'_>) -> GraphError {
    match status {
        StatusCode::PRECONDITION_FAILED => match (
            subject.collection,
            subject.key,
            subject.expected,
        ) {
            (Some(collection), Some(key), Some(expected)) => GraphError::PreconditionFailed {
                collection: collection.to_string(),
                key: key.to_string(),
                expected: expected.clone(),
                actual: error.rev.map(Revision::new),
            },
            _ => GraphError::Transport(format!(
                "unexpected precondition failure: {}",
                error.error_message
            )),
        },
        StatusCode::NOT_FOUND => {
            let kind = match error.error_num {
                ERROR_GRAPH_NOT_FOUND => ResourceKind::Graph,
                ERROR_GRAPH_EDGE_COLLECTION_NOT_USED => ResourceKind::EdgeDefinition,
                ERROR_DOCUMENT_NOT_FOUND => ResourceKind::Document,
                _ => ResourceKind::Collection,
            };
            GraphError::not_found(kind, subject.name_for(kind))
        }
        StatusCode::CONFLICT => {
            let reason = match error.error_num {
                ERROR_GRAPH_DUPLICATE => ConflictReason::GraphExists,
                ERROR_GRAPH_DUPLICATE_DEFINITION => ConflictReason::DefinitionExists,
                _ => ConflictReason::Other,
            };
            let name = match reason {
                ConflictReason::GraphExists => subject.graph.to_string(),
                _ => subject.name_for(ResourceKind::Collection),
            };
            GraphError::conflict(reason, name)
        }
        StatusCode::BAD_REQUEST => {
            let reason = match error.error_num {
                ERROR_GRAPH_DUPLICATE_DEFINITION => Some(ConflictReason::DefinitionExists),
                ERROR_GRAPH_COLLECTION_IN_OTHER_GRAPH => Some(ConflictReason::Other),
                ERROR_GRAPH_NOT_IN_ORPHANS => Some(ConflictReason::CollectionReferenced),
                ERROR_GRAPH_COLLECTION_USED_IN_EDGE_DEF
                | ERROR_GRAPH_COLLECTION_USED_IN_ORPHANS => {
                    Some(ConflictReason::CollectionAlreadyInGraph)
                }
                _ => None,
            };
            match reason {
                Some(reason) => {
                    GraphError::conflict(reason, subject.name_for(ResourceKind::Collection))
                }
                None => GraphError::validation(
                    subject.name_for(ResourceKind::Collection),
                    error.error_message,
                ),
            }
        }
        other => GraphError::Transport(format!(
            "HTTP {other} (errorNum {}): {}",
            error.error_num, error.error_message
        )),
    }
}

/// Narrow a "not in orphans" rejection: `NotFound` unless an edge
/// definition of the graph really references the collection.
fn not_in_orphans(err: GraphError, graph: &GraphDescriptor, collection: &str) -> GraphError {
    if graph.edge_definitions.iter().any(|d| d.references(collection)) {
        err
    } else {
        GraphError::not_found(ResourceKind::Collection, collection)
    }
}

/// Pull one top-level field out of a response object.
fn take_field(mut body: Value, field: &str) -> GraphResult<Value> {
    body.get_mut(field)
        .map(Value::take)
        .ok_or_else(|| GraphError::Transport(format!("response is missing '{field}'")))
}

/// `GraphStore` backed by an ArangoDB server.
#[derive(Debug, Clone)]
pub struct HttpGraphStore {
    client: Client,
    base: Url,
    config: StoreConfig,
}

impl HttpGraphStore {
    /// Build a store; no request is made until the first operation.
    pub fn new(config: StoreConfig) -> GraphResult<Self> {
        let base = gharial_base(&config)?;
        let client = Client::builder()
            .user_agent(concat!("arangraph/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| GraphError::configuration(format!("cannot build HTTP client: {e}")))?;
        info!(endpoint = %config.endpoint, database = %config.database, "HTTP graph store ready");
        Ok(Self {
            client,
            base,
            config,
        })
    }

    /// Build a store from `ARANGO_*` environment variables.
    pub fn from_env() -> GraphResult<Self> {
        Self::new(StoreConfig::from_env()?)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url, if_match: Option<&Revision>) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.config.username, self.config.password.as_ref());
        if let Some(rev) = if_match {
            request = request.header(IF_MATCH, rev.as_str());
        }
        request
    }

    async fn execute(&self, request: RequestBuilder, subject: Subject<'_>) -> GraphResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        let error: ApiError = serde_json::from_str(&text).unwrap_or_default();
        debug!(%status, error_num = error.error_num, "Store rejected request");
        let err = classify(status, error, subject);
        if err.is_retryable_with_fresh_read() {
            warn!(error = %err, "Revision precondition failed");
        }
        Err(err)
    }

    async fn graph_call(
        &self,
        request: RequestBuilder,
        subject: Subject<'_>,
    ) -> GraphResult<GraphDescriptor> {
        let body = self.execute(request, subject).await?;
        Ok(serde_json::from_value(take_field(body, "graph")?)?)
    }

    async fn document_call(
        &self,
        request: RequestBuilder,
        target: CollectionRef<'_>,
        subject: Subject<'_>,
    ) -> GraphResult<Value> {
        let body = self.execute(request, subject).await?;
        take_field(body, target.kind.as_path())
    }
}

fn gharial_base(config: &StoreConfig) -> GraphResult<Url> {
    let mut url = Url::parse(&config.endpoint).map_err(|e| {
        GraphError::configuration(format!("invalid endpoint '{}': {e}", config.endpoint))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(GraphError::configuration(format!(
            "endpoint must be http or https: '{}'",
            config.endpoint
        )));
    }
    url.path_segments_mut()
        .map_err(|_| GraphError::configuration("endpoint cannot carry a path"))?
        .pop_if_empty()
        .extend(["_db", config.database.as_str(), "_api", "gharial"]);
    Ok(url)
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[async_trait]
impl GraphStore for HttpGraphStore {
    #[instrument(skip(self, request), fields(graph = %request.name))]
    async fn create_graph(&self, request: &CreateGraphRequest) -> GraphResult<GraphDescriptor> {
        let body = json!({
            "name": request.name,
            "edgeDefinitions": request.edge_definitions,
            "orphanCollections": request.orphan_collections,
        });
        let call = self.request(Method::POST, self.url(&[]), None).json(&body);
        self.graph_call(call, Subject::graph(&request.name)).await
    }

    #[instrument(skip(self))]
    async fn drop_graph(&self, name: &str, drop_collections: bool) -> GraphResult<bool> {
        let call = self
            .request(Method::DELETE, self.url(&[name]), None)
            .query(&[("dropCollections", flag(drop_collections))]);
        match self.execute(call, Subject::graph(name)).await {
            Ok(body) => Ok(body.get("removed").and_then(Value::as_bool).unwrap_or(true)),
            Err(e) if e.is_not_found(ResourceKind::Graph) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn graph(&self, name: &str) -> GraphResult<GraphDescriptor> {
        let call = self.request(Method::GET, self.url(&[name]), None);
        self.graph_call(call, Subject::graph(name)).await
    }

    #[instrument(skip(self))]
    async fn list_graphs(&self) -> GraphResult<Vec<GraphDescriptor>> {
        let call = self.request(Method::GET, self.url(&[]), None);
        let body = self.execute(call, Subject::default()).await?;
        Ok(serde_json::from_value(take_field(body, "graphs")?)?)
    }

    #[instrument(skip(self, definition), fields(collection = %definition.collection))]
    async fn add_edge_definition(
        &self,
        graph: &str,
        definition: &EdgeDefinition,
    ) -> GraphResult<GraphDescriptor> {
        let call = self
            .request(Method::POST, self.url(&[graph, "edge"]), None)
            .json(definition);
        self.graph_call(call, Subject::collection(graph, &definition.collection))
            .await
    }

    #[instrument(skip(self, definition), fields(collection = %definition.collection))]
    async fn replace_edge_definition(
        &self,
        graph: &str,
        definition: &EdgeDefinition,
    ) -> GraphResult<GraphDescriptor> {
        let call = self
            .request(
                Method::PUT,
                self.url(&[graph, "edge", &definition.collection]),
                None,
            )
            .json(definition);
        self.graph_call(call, Subject::collection(graph, &definition.collection))
            .await
    }

    #[instrument(skip(self))]
    async fn remove_edge_definition(
        &self,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> GraphResult<GraphDescriptor> {
        let call = self
            .request(Method::DELETE, self.url(&[graph, "edge", collection]), None)
            .query(&[("dropCollections", flag(drop_collection))]);
        self.graph_call(call, Subject::collection(graph, collection)).await
    }

    #[instrument(skip(self))]
    async fn add_vertex_collection(
        &self,
        graph: &str,
        collection: &str,
    ) -> GraphResult<GraphDescriptor> {
        let call = self
            .request(Method::POST, self.url(&[graph, "vertex"]), None)
            .json(&json!({ "collection": collection }));
        self.graph_call(call, Subject::collection(graph, collection)).await
    }

    #[instrument(skip(self))]
    async fn remove_vertex_collection(
        &self,
        graph: &str,
        collection: &str,
        drop_collection: bool,
    ) -> GraphResult<GraphDescriptor> {
        let call = self
            .request(Method::DELETE, self.url(&[graph, "vertex", collection]), None)
            .query(&[("dropCollection", flag(drop_collection))]);
        match self.graph_call(call, Subject::collection(graph, collection)).await {
            Err(err @ GraphError::Conflict {
                reason: ConflictReason::CollectionReferenced,
                ..
            }) => {
                // The server reports "not an orphan" both for referenced
                // collections and for ones outside the graph.
                let descriptor = self.graph(graph).await?;
                Err(not_in_orphans(err, &descriptor, collection))
            }
            other => other,
        }
    }

    #[instrument(skip(self, body), fields(graph = %target.graph, collection = %target.collection))]
    async fn insert_document(
        &self,
        target: CollectionRef<'_>,
        body: Map<String, Value>,
    ) -> GraphResult<DocumentMeta> {
        let url = self.url(&[target.graph, target.kind.as_path(), target.collection]);
        let call = self.request(Method::POST, url, None).json(&body);
        let subject = Subject::collection(target.graph, target.collection);
        let meta = self.document_call(call, target, subject).await?;
        Ok(serde_json::from_value(meta)?)
    }

    #[instrument(
        skip(self, if_match),
        fields(graph = %target.graph, collection = %target.collection)
    )]
    async fn get_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        if_match: Option<&Revision>,
    ) -> GraphResult<Option<Value>> {
        let url = self.url(&[target.graph, target.kind.as_path(), target.collection, key]);
        let call = self.request(Method::GET, url, if_match);
        let subject = Subject::document(target, key, if_match);
        match self.document_call(call, target, subject).await {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.is_not_found(ResourceKind::Document) => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(
        skip(self, body, if_match),
        fields(graph = %target.graph, collection = %target.collection)
    )]
    async fn replace_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        body: Map<String, Value>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        let url = self.url(&[target.graph, target.kind.as_path(), target.collection, key]);
        let call = self.request(Method::PUT, url, if_match).json(&body);
        let subject = Subject::document(target, key, if_match);
        let meta = self.document_call(call, target, subject).await?;
        Ok(serde_json::from_value(meta)?)
    }

    #[instrument(
        skip(self, patch, if_match),
        fields(graph = %target.graph, collection = %target.collection)
    )]
    async fn update_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        patch: Map<String, Value>,
        if_match: Option<&Revision>,
    ) -> GraphResult<DocumentMeta> {
        let url = self.url(&[target.graph, target.kind.as_path(), target.collection, key]);
        let call = self
            .request(Method::PATCH, url, if_match)
            .query(&[("keepNull", "true")])
            .json(&patch);
        let subject = Subject::document(target, key, if_match);
        let meta = self.document_call(call, target, subject).await?;
        Ok(serde_json::from_value(meta)?)
    }

    #[instrument(
        skip(self, if_match),
        fields(graph = %target.graph, collection = %target.collection)
    )]
    async fn remove_document(
        &self,
        target: CollectionRef<'_>,
        key: &str,
        if_match: Option<&Revision>,
    ) -> GraphResult<()> {
        let url = self.url(&[target.graph, target.kind.as_path(), target.collection, key]);
        let call = self.request(Method::DELETE, url, if_match);
        self.execute(call, Subject::document(target, key, if_match))
            .await?;
        Ok(())
    }
}
