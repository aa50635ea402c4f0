//! Suite configuration partials and application/collection definitions.

use crate::model::{MethodDescriptor, Operation};
use crate::schema::SchemaDefinition;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const DEFAULT_BASE_PATH: &str = "/api";
pub const DEFAULT_SUITE_NAME: &str = "suite";
pub const DEFAULT_MAX_RESULTS: usize = 100;
pub const MAX_RESULTS_CEILING: usize = 1000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// One configuration source. Every field is optional; see [`SuiteConfig::merge`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_path: Option<String>,
    /// Prepended to every application's namespace.
    pub namespace_prefix: Option<String>,
    pub database_url: Option<String>,
    pub max_results: Option<usize>,
    pub max_body_bytes: Option<usize>,
    /// Shared named schemas, referenced as `#/definitions/<name>`.
    pub definitions: BTreeMap<String, SchemaDefinition>,
}

impl SuiteConfig {
    /// Overlay `later` onto `self`: each field set in `later` wins, definitions merge by name.
    pub fn merge(mut self, later: SuiteConfig) -> SuiteConfig {
        fn pick<T>(earlier: Option<T>, later: Option<T>) -> Option<T> {
            later.or(earlier)
        }
        self.name = pick(self.name, later.name);
        self.description = pick(self.description, later.description);
        self.base_path = pick(self.base_path, later.base_path);
        self.namespace_prefix = pick(self.namespace_prefix, later.namespace_prefix);
        self.database_url = pick(self.database_url, later.database_url);
        self.max_results = pick(self.max_results, later.max_results);
        self.max_body_bytes = pick(self.max_body_bytes, later.max_body_bytes);
        self.definitions.extend(later.definitions);
        self
    }

    /// Apply defaults and normalise.
    pub fn settings(&self) -> Settings {
        Settings {
            name: self.name.clone().unwrap_or_else(|| DEFAULT_SUITE_NAME.into()),
            description: self.description.clone().unwrap_or_default(),
            base_path: normalize_base_path(self.base_path.as_deref().unwrap_or(DEFAULT_BASE_PATH)),
            namespace_prefix: self.namespace_prefix.clone().unwrap_or_default(),
            database_url: self.database_url.clone(),
            max_results: self.max_results.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, MAX_RESULTS_CEILING),
            max_body_bytes: self.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
        }
    }
}

/// `api/` and `/api/` both become `/api`; `/` becomes the empty root.
pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Merged, defaulted configuration the suite runs with.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub name: String,
    pub description: String,
    pub base_path: String,
    pub namespace_prefix: String,
    pub database_url: Option<String>,
    pub max_results: usize,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        SuiteConfig::default().settings()
    }
}

/// Declaration of one collection, resolved into a [`crate::model::Collection`] at build time.
#[derive(Clone, Debug)]
pub struct CollectionDef {
    pub name: String,
    pub description: String,
    pub schema: SchemaDefinition,
    pub primary_key: String,
    pub indexes: Vec<String>,
    pub relations: BTreeMap<String, String>,
    pub methods: Vec<MethodDescriptor>,
    /// Built-in operations to expose. Defaults to all four.
    pub operations: BTreeSet<Operation>,
}

impl CollectionDef {
    pub fn new(name: impl Into<String>, schema: SchemaDefinition) -> Self {
        CollectionDef {
            name: name.into(),
            description: String::new(),
            schema,
            primary_key: "id".into(),
            indexes: Vec::new(),
            relations: BTreeMap::new(),
            methods: Vec::new(),
            operations: Operation::ALL.into_iter().collect(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(field.into());
        self
    }

    /// `target` is a collection name in the same application, or `app.collection`.
    pub fn relation(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(name.into(), target.into());
        self
    }

    /// Collection- or document-level method; the descriptor's owner kind decides which.
    pub fn register_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Restrict the built-in operations.
    pub fn operations(mut self, ops: impl IntoIterator<Item = Operation>) -> Self {
        self.operations = ops.into_iter().collect();
        self
    }
}

/// Declaration of one application.
#[derive(Clone)]
pub struct ApplicationDef {
    pub name: String,
    /// Defaults to the namespace prefix followed by the application name.
    pub namespace: Option<String>,
    pub description: String,
    pub collections: Vec<CollectionDef>,
    pub methods: Vec<MethodDescriptor>,
    pub store: Option<Arc<dyn Store>>,
}

impl std::fmt::Debug for ApplicationDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationDef")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("collections", &self.collections)
            .field("methods", &self.methods)
            .field("store", &self.store.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl ApplicationDef {
    pub fn new(name: impl Into<String>) -> Self {
        ApplicationDef {
            name: name.into(),
            namespace: None,
            description: String::new(),
            collections: Vec::new(),
            methods: Vec::new(),
            store: None,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn register_collection(mut self, collection: CollectionDef) -> Self {
        self.collections.push(collection);
        self
    }

    pub fn register_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Store used by this application's collections instead of the suite default.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_partials_override_field_by_field() {
        let shared = SuiteConfig {
            name: Some("shared".into()),
            database_url: Some("postgres://localhost/shared".into()),
            max_results: Some(50),
            definitions: [("money".to_string(), SchemaDefinition::number())].into_iter().collect(),
            ..Default::default()
        };
        let local = SuiteConfig {
            name: Some("local".into()),
            base_path: Some("v1/".into()),
            definitions: [("name".to_string(), SchemaDefinition::string())].into_iter().collect(),
            ..Default::default()
        };
        let merged = shared.merge(local);
        assert_eq!(merged.name.as_deref(), Some("local"));
        assert_eq!(merged.database_url.as_deref(), Some("postgres://localhost/shared"));
        assert_eq!(merged.max_results, Some(50));
        assert_eq!(merged.definitions.len(), 2);
        let settings = merged.settings();
        assert_eq!(settings.base_path, "/v1");
        assert_eq!(settings.max_results, 50);
    }

    #[test]
    fn defaults_and_clamping() {
        let settings = Settings::default();
        assert_eq!(settings.base_path, "/api");
        assert_eq!(settings.name, "suite");
        assert_eq!(settings.max_results, 100);
        assert_eq!(settings.max_body_bytes, 1024 * 1024);
        let big = SuiteConfig {
            max_results: Some(50_000),
            base_path: Some("/".into()),
            ..Default::default()
        }
        .settings();
        assert_eq!(big.max_results, 1000);
        assert_eq!(big.base_path, "");
    }
}
