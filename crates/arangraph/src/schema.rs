//! Graph and document schema types
//!
//! Wire shapes follow the gharial API:
//! - graphs carry `_id`, `_key`, `_rev`, `edgeDefinitions`, `orphanCollections`
//! - documents carry `_id`, `_key`, `_rev` and, for edges, `_from` / `_to`

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GraphError, GraphResult};
use crate::naming::{CollectionNameResolver, GraphEntity};

/// Attribute names owned by the store. Entity bodies must not set them.
pub const RESERVED_FIELDS: [&str; 5] = ["_id", "_key", "_rev", "_from", "_to"];

/// Opaque per-record version token. Only equality is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(token: impl Into<String>) -> Self {
        Revision(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Revision(s.to_string())
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Revision(s)
    }
}

/// Whether a collection holds graph nodes or graph relations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Vertex,
    Edge,
}

impl ElementKind {
    /// Path segment used by the gharial API.
    pub fn as_path(&self) -> &'static str {
        match self {
            ElementKind::Vertex => "vertex",
            ElementKind::Edge => "edge",
        }
    }
}

/// Store-assigned identity of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    /// Global id (`collection/key`)
    #[serde(rename = "_id")]
    pub id: String,
    /// Collection-local key
    #[serde(rename = "_key")]
    pub key: String,
    /// Current revision
    #[serde(rename = "_rev")]
    pub rev: Revision,
}

/// Endpoints of an edge record, as global vertex ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeEndpoints {
    #[serde(rename = "_from")]
    pub from: String,
    #[serde(rename = "_to")]
    pub to: String,
}

impl EdgeEndpoints {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A typed entity together with its store metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Document<T> {
    pub meta: DocumentMeta,
    /// Present for edge records only
    pub endpoints: Option<EdgeEndpoints>,
    pub body: T,
}

impl<T: DeserializeOwned> Document<T> {
    /// Split a stored JSON object into metadata and a typed body.
    pub(crate) fn from_stored(collection: &str, stored: Value) -> GraphResult<Self> {
        let mut object = match stored {
            Value::Object(object) => object,
            other => {
                return Err(GraphError::Transport(format!(
                    "store returned a non-object document for '{collection}': {other}"
                )))
            }
        };

        let meta = DocumentMeta {
            id: take_string(&mut object, "_id", collection)?,
            key: take_string(&mut object, "_key", collection)?,
            rev: Revision(take_string(&mut object, "_rev", collection)?),
        };
        let endpoints = match (object.remove("_from"), object.remove("_to")) {
            (Some(Value::String(from)), Some(Value::String(to))) => {
                Some(EdgeEndpoints { from, to })
            }
            _ => None,
        };

        let body = serde_json::from_value(Value::Object(object)).map_err(|e| {
            GraphError::validation(
                collection,
                format!("stored document {} does not match entity type: {e}", meta.key),
            )
        })?;

        Ok(Document {
            meta,
            endpoints,
            body,
        })
    }
}

fn take_string(
    object: &mut Map<String, Value>,
    field: &str,
    collection: &str,
) -> GraphResult<String> {
    match object.remove(field) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(GraphError::Transport(format!(
            "store document in '{collection}' is missing '{field}'"
        ))),
    }
}

/// Serialize an entity into a document body, rejecting reserved attributes.
pub(crate) fn entity_body<T: Serialize>(
    collection: &str,
    entity: &T,
) -> GraphResult<Map<String, Value>> {
    let value = serde_json::to_value(entity).map_err(|e| {
        GraphError::validation(collection, format!("entity is not serializable: {e}"))
    })?;
    match value {
        Value::Object(object) => {
            check_reserved(collection, &object)?;
            Ok(object)
        }
        other => Err(GraphError::validation(
            collection,
            format!("entity must serialize to a JSON object, got {}", json_type(&other)),
        )),
    }
}

pub(crate) fn check_reserved(collection: &str, object: &Map<String, Value>) -> GraphResult<()> {
    if let Some(field) = RESERVED_FIELDS.iter().find(|f| object.contains_key(**f)) {
        return Err(GraphError::validation(
            collection,
            format!("attribute '{field}' is assigned by the store"),
        ));
    }
    Ok(())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Sparse update: only the listed fields are written, everything else is
/// left as stored. A field set to `Value::Null` is stored as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Map<String, Value>);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` to `value`.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Explicitly null out `field`.
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.0.insert(field.into(), Value::Null);
        self
    }

    /// Build a patch from every non-null field of `entity`.
    ///
    /// Fields the entity leaves as `None` are not part of the patch and keep
    /// their stored value.
    pub fn from_entity<T: Serialize>(collection: &str, entity: &T) -> GraphResult<Self> {
        let mut object = entity_body(collection, entity)?;
        object.retain(|_, v| !v.is_null());
        Ok(Patch(object))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Patch {
    fn from(map: Map<String, Value>) -> Self {
        Patch(map)
    }
}

/// Which vertex collections an edge collection may connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// Edge collection name
    pub collection: String,
    /// Allowed source vertex collections
    pub from: Vec<String>,
    /// Allowed target vertex collections
    pub to: Vec<String>,
}

impl EdgeDefinition {
    /// Create a definition; duplicate endpoint names are dropped.
    pub fn new<I, J, S, U>(collection: impl Into<String>, from: I, to: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = U>,
        S: Into<String>,
        U: Into<String>,
    {
        Self {
            collection: collection.into(),
            from: dedup_names(from.into_iter().map(Into::into)),
            to: dedup_names(to.into_iter().map(Into::into)),
        }
    }

    /// Definition for edge type `E` connecting `F` to `T`, names resolved
    /// through `resolver`.
    pub fn between<E, F, T>(resolver: &CollectionNameResolver) -> GraphResult<Self>
    where
        E: GraphEntity,
        F: GraphEntity,
        T: GraphEntity,
    {
        Ok(Self::new(
            resolver.resolve::<E>()?,
            [resolver.resolve::<F>()?],
            [resolver.resolve::<T>()?],
        ))
    }

    /// Same definition with duplicate endpoint names removed.
    pub fn normalized(self) -> Self {
        Self::new(self.collection, self.from, self.to)
    }

    /// Union `from` / `to` additions into this definition, keeping order.
    pub fn extended<I, J>(&self, from: I, to: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        Self::new(
            self.collection.clone(),
            self.from.iter().cloned().chain(from),
            self.to.iter().cloned().chain(to),
        )
    }

    /// True if `collection` is a `from` or `to` endpoint.
    pub fn references(&self, collection: &str) -> bool {
        self.from.iter().chain(self.to.iter()).any(|c| c == collection)
    }

    /// Endpoint collections, `from` first, without duplicates.
    pub fn vertex_collections(&self) -> Vec<String> {
        dedup_names(self.from.iter().chain(self.to.iter()).cloned())
    }
}

/// Remove duplicates while keeping first-occurrence order.
pub(crate) fn dedup_names<I: IntoIterator<Item = String>>(names: I) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Server-side description of a named graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDescriptor {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_rev")]
    pub rev: Revision,
    #[serde(rename = "edgeDefinitions", default)]
    pub edge_definitions: Vec<EdgeDefinition>,
    #[serde(rename = "orphanCollections", default)]
    pub orphan_collections: Vec<String>,
}

impl GraphDescriptor {
    pub fn info(&self) -> GraphInfo {
        GraphInfo {
            id: self.id.clone(),
            key: self.key.clone(),
            rev: self.rev.clone(),
        }
    }
}

/// Identity of a graph: `(id, key, rev)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphInfo {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_rev")]
    pub rev: Revision,
}
