//! Entity type → collection name resolution
//!
//! Names are derived from a compile-time type name declared by each entity
//! ([`GraphEntity::TYPE_NAME`]) and a resolver configuration fixed at startup.
//! Resolution is pure: the same type always maps to the same collection.

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

const MAX_COLLECTION_NAME_LEN: usize = 256;

/// An application type stored as graph vertices or edges.
pub trait GraphEntity: Serialize + DeserializeOwned + Send + Sync {
    /// Stable type identity used for name resolution.
    const TYPE_NAME: &'static str;

    /// Collection override declared by the type itself.
    const COLLECTION: Option<&'static str> = None;
}

/// How a collection name is derived from a type name when no explicit
/// mapping exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    /// Use the type name verbatim (`Person` → `Person`)
    #[default]
    TypeName,
    /// `HostName` → `host_name`
    SnakeCase,
    /// `HostName` → `hostname`
    Lowercase,
    /// No derivation; every type must be mapped explicitly
    Explicit,
}

impl NamingConvention {
    fn apply(&self, type_name: &str) -> Option<String> {
        match self {
            NamingConvention::TypeName => Some(type_name.to_string()),
            NamingConvention::SnakeCase => Some(to_snake_case(type_name)),
            NamingConvention::Lowercase => Some(type_name.to_ascii_lowercase()),
            NamingConvention::Explicit => None,
        }
    }
}

/// Serializable resolver settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub convention: NamingConvention,
    /// Type name → collection name
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

/// Maps entity types to collection names.
#[derive(Debug, Clone, Default)]
pub struct CollectionNameResolver {
    convention: NamingConvention,
    mappings: HashMap<String, String>,
}

impl CollectionNameResolver {
    pub fn new(convention: NamingConvention) -> Self {
        Self {
            convention,
            mappings: HashMap::new(),
        }
    }

    /// Build a resolver from config, validating every mapped name.
    pub fn from_config(config: ResolverConfig) -> GraphResult<Self> {
        let mut resolver = Self::new(config.convention);
        for (type_name, collection) in config.mappings {
            resolver = resolver.with_mapping(type_name, collection)?;
        }
        Ok(resolver)
    }

    /// Map entity type `T` to `collection`.
    pub fn register<T: GraphEntity>(self, collection: impl Into<String>) -> GraphResult<Self> {
        self.with_mapping(T::TYPE_NAME, collection)
    }

    /// Map a type name to `collection`.
    pub fn with_mapping(
        mut self,
        type_name: impl Into<String>,
        collection: impl Into<String>,
    ) -> GraphResult<Self> {
        let collection = collection.into();
        validate_collection_name(&collection)?;
        self.mappings.insert(type_name.into(), collection);
        Ok(self)
    }

    pub fn convention(&self) -> NamingConvention {
        self.convention
    }

    /// Collection name for entity type `T`.
    pub fn resolve<T: GraphEntity>(&self) -> GraphResult<String> {
        self.resolve_parts(T::TYPE_NAME, T::COLLECTION)
    }

    /// Collection name for a type known only by name.
    pub fn resolve_name(&self, type_name: &str) -> GraphResult<String> {
        self.resolve_parts(type_name, None)
    }

    fn resolve_parts(&self, type_name: &str, declared: Option<&str>) -> GraphResult<String> {
        let name = self
            .mappings
            .get(type_name)
            .cloned()
            .or_else(|| declared.map(str::to_string))
            .or_else(|| self.convention.apply(type_name))
            .ok_or_else(|| {
                GraphError::configuration(format!(
                    "no collection mapping or naming rule for entity type '{type_name}'"
                ))
            })?;
        validate_collection_name(&name)?;
        Ok(name)
    }
}

/// Reject names the store would refuse.
pub fn validate_collection_name(name: &str) -> GraphResult<()> {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if !first_ok || !rest_ok || name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(GraphError::configuration(format!(
            "invalid collection name '{name}'"
        )));
    }
    Ok(())
}

fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).map(|n| n.is_ascii_lowercase()).unwrap_or(false);
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Person;

    impl GraphEntity for Person {
        const TYPE_NAME: &'static str = "Person";
    }

    #[derive(Serialize, Deserialize)]
    struct HostName;

    impl GraphEntity for HostName {
        const TYPE_NAME: &'static str = "HostName";
    }

    #[derive(Serialize, Deserialize)]
    struct Follow;

    impl GraphEntity for Follow {
        const TYPE_NAME: &'static str = "Follow";
        const COLLECTION: Option<&'static str> = Some("follows");
    }

    #[test]
    fn type_name_convention_is_default() {
        let resolver = CollectionNameResolver::default();
        assert_eq!(resolver.resolve::<Person>().unwrap(), "Person");
    }

    #[test]
    fn declared_collection_beats_convention() {
        let resolver = CollectionNameResolver::new(NamingConvention::SnakeCase);
        assert_eq!(resolver.resolve::<Follow>().unwrap(), "follows");
    }

    #[test]
    fn explicit_mapping_beats_everything() {
        let resolver = CollectionNameResolver::default()
            .register::<Follow>("edges_follow")
            .unwrap();
        assert_eq!(resolver.resolve::<Follow>().unwrap(), "edges_follow");
    }

    #[test]
    fn snake_case_convention() {
        let resolver = CollectionNameResolver::new(NamingConvention::SnakeCase);
        assert_eq!(resolver.resolve::<HostName>().unwrap(), "host_name");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("Node2Edge"), "node2_edge");
    }

    #[test]
    fn lowercase_convention() {
        let resolver = CollectionNameResolver::new(NamingConvention::Lowercase);
        assert_eq!(resolver.resolve::<HostName>().unwrap(), "hostname");
    }

    #[test]
    fn explicit_convention_without_mapping_is_configuration_error() {
        let resolver = CollectionNameResolver::new(NamingConvention::Explicit);
        let err = resolver.resolve::<Person>().unwrap_err();
        assert!(matches!(err, GraphError::Configuration { .. }));
    }

    #[test]
    fn resolution_is_stable() {
        let resolver = CollectionNameResolver::new(NamingConvention::SnakeCase);
        let first = resolver.resolve::<HostName>().unwrap();
        for _ in 0..10 {
            assert_eq!(resolver.resolve::<HostName>().unwrap(), first);
        }
    }

    #[test]
    fn invalid_mapping_rejected() {
        let err = CollectionNameResolver::default()
            .with_mapping("Person", "9lives")
            .unwrap_err();
        assert!(matches!(err, GraphError::Configuration { .. }));
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("has space").is_err());
        assert!(validate_collection_name("_system_ok").is_ok());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config: ResolverConfig = serde_json::from_str(
            r#"{"convention": "snake_case", "mappings": {"Person": "people"}}"#,
        )
        .unwrap();
        let resolver = CollectionNameResolver::from_config(config).unwrap();
        assert_eq!(resolver.resolve::<Person>().unwrap(), "people");
        assert_eq!(resolver.resolve_name("HostName").unwrap(), "host_name");
    }
}
