//! Load configuration partials and resolve definitions into a ready [`Suite`].

use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::model::{Application, Collection, MethodDescriptor, Operation, OwnerKind, Suite};
use crate::schema::{SchemaDefinition, SchemaRegistry, SchemaType};
use crate::service::crud;
use crate::store::{Store, Table};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    env_var(name)
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::Load(format!("{}: {}", name, e)))
        })
        .transpose()
}

impl SuiteConfig {
    /// Partial from `SUITE_NAME`, `SUITE_BASE_PATH`, `SUITE_NAMESPACE_PREFIX`, `DATABASE_URL`,
    /// `SUITE_MAX_RESULTS` and `SUITE_MAX_BODY_BYTES`. Unset variables leave the field empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(SuiteConfig {
            name: env_var("SUITE_NAME"),
            description: None,
            base_path: env_var("SUITE_BASE_PATH"),
            namespace_prefix: env_var("SUITE_NAMESPACE_PREFIX"),
            database_url: env_var("DATABASE_URL"),
            max_results: env_usize("SUITE_MAX_RESULTS")?,
            max_body_bytes: env_usize("SUITE_MAX_BODY_BYTES")?,
            definitions: BTreeMap::new(),
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }
}

/// Collection resolved against the registry but not yet frozen.
struct PendingCollection {
    name: String,
    description: String,
    table: Table,
    key_type: SchemaType,
    indexes: Vec<String>,
    relations: BTreeMap<String, String>,
    schema: crate::schema::SchemaHandle,
    methods: BTreeMap<String, MethodDescriptor>,
    document_methods: BTreeMap<String, MethodDescriptor>,
    operations: BTreeMap<Operation, MethodDescriptor>,
    document_operations: BTreeMap<Operation, MethodDescriptor>,
}

struct PendingApplication {
    name: String,
    namespace: String,
    description: String,
    collections: Vec<PendingCollection>,
    methods: BTreeMap<String, MethodDescriptor>,
    operations: BTreeMap<Operation, MethodDescriptor>,
    store: Arc<dyn Store>,
}

fn segment(name: &str) -> String {
    urlencoding::encode(name).into_owned()
}

/// Build a suite from merged configuration (validates first). Schemas are registered in one pass,
/// the registry is frozen, then the object model is assembled.
pub fn resolve(
    config: SuiteConfig,
    applications: Vec<ApplicationDef>,
    default_store: Option<Arc<dyn Store>>,
) -> Result<Suite, ConfigError> {
    validate(&applications)?;
    let settings = config.settings();

    let mut registry = SchemaRegistry::new();
    for (name, def) in &config.definitions {
        registry.define(name.clone(), def.clone());
    }
    for (name, def) in &config.definitions {
        registry.register(def.clone(), &format!("definitions.{}", name))?;
    }

    let mut pending = Vec::with_capacity(applications.len());
    for app in applications {
        let store = app
            .store
            .clone()
            .or_else(|| default_store.clone())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "store",
                id: app.name.clone(),
            })?;
        let namespace = app
            .namespace
            .clone()
            .unwrap_or_else(|| format!("{}{}", settings.namespace_prefix, app.name));

        let mut collections = Vec::with_capacity(app.collections.len());
        for def in app.collections {
            collections.push(resolve_collection(&mut registry, &settings, &app.name, &namespace, def)?);
        }

        let mut methods = BTreeMap::new();
        for m in app.methods {
            let context = format!("{}.{}", app.name, m.name);
            let bound = m.bind(&mut registry, &context)?;
            methods.insert(bound.name.clone(), bound);
        }
        let mut operations = BTreeMap::new();
        let read = crud::application_read(app.name.clone()).bind(&mut registry, &format!("{}.read", app.name))?;
        operations.insert(Operation::Read, read);

        tracing::info!(application = %app.name, namespace = %namespace, collections = collections.len(), "application registered");
        pending.push(PendingApplication {
            name: app.name,
            namespace,
            description: app.description,
            collections,
            methods,
            operations,
            store,
        });
    }

    let registry = Arc::new(registry);
    let freeze = |m: BTreeMap<String, MethodDescriptor>| -> BTreeMap<String, Arc<MethodDescriptor>> {
        m.into_iter().map(|(k, v)| (k, Arc::new(v))).collect()
    };
    let freeze_ops = |m: BTreeMap<Operation, MethodDescriptor>| -> BTreeMap<Operation, Arc<MethodDescriptor>> {
        m.into_iter().map(|(k, v)| (k, Arc::new(v))).collect()
    };

    let mut apps = BTreeMap::new();
    for app in pending {
        let url = format!("{}/{}", settings.base_path, segment(&app.name));
        let mut collections = BTreeMap::new();
        for c in app.collections {
            let collection = Collection {
                url: format!("{}/{}", url, segment(&c.name)),
                name: c.name.clone(),
                application: app.name.clone(),
                description: c.description,
                table: c.table,
                key_type: c.key_type,
                indexes: c.indexes,
                relations: c.relations,
                schema: c.schema,
                registry: Arc::clone(&registry),
                methods: freeze(c.methods),
                document_methods: freeze(c.document_methods),
                operations: freeze_ops(c.operations),
                document_operations: freeze_ops(c.document_operations),
                store: Arc::clone(&app.store),
                max_results: settings.max_results,
            };
            collections.insert(c.name, Arc::new(collection));
        }
        let application = Application {
            name: app.name.clone(),
            namespace: app.namespace,
            description: app.description,
            url,
            collections,
            methods: freeze(app.methods),
            operations: freeze_ops(app.operations),
        };
        apps.insert(app.name, Arc::new(application));
    }

    Ok(Suite {
        settings,
        applications: apps,
        registry,
    })
}

fn resolve_collection(
    registry: &mut SchemaRegistry,
    settings: &Settings,
    app_name: &str,
    namespace: &str,
    def: CollectionDef,
) -> Result<PendingCollection, ConfigError> {
    let context = format!("{}.{}", app_name, def.name);
    let pk = def.primary_key.clone();

    let mut schema = registry.register_object(def.schema.clone(), &context)?;
    let mut resolved: SchemaDefinition = registry
        .definition(schema)
        .cloned()
        .ok_or_else(|| ConfigError::MissingReference {
            kind: "schema",
            id: context.clone(),
        })?;
    if !resolved.properties.contains_key(&pk) {
        resolved.properties.insert(pk.clone(), SchemaDefinition::string());
        schema = registry.register_object(resolved.clone(), &context)?;
    }
    let key_type = resolved
        .properties
        .get(&pk)
        .and_then(crud::key_type)
        .ok_or_else(|| ConfigError::InvalidPrimaryKey {
            collection: context.clone(),
            field: pk.clone(),
        })?;
    for field in &def.indexes {
        if !resolved.properties.contains_key(field) {
            return Err(ConfigError::MissingReference {
                kind: "index field",
                id: format!("{}.{}", context, field),
            });
        }
    }

    let mut methods = BTreeMap::new();
    let mut document_methods = BTreeMap::new();
    for m in def.methods {
        let method_context = format!("{}.{}", context, m.name);
        let bound = m.bind(registry, &method_context)?;
        match bound.owner {
            OwnerKind::Document => document_methods.insert(bound.name.clone(), bound),
            _ => methods.insert(bound.name.clone(), bound),
        };
    }

    let builtins = crud::collection_operations(&resolved, &pk, &def.operations, settings.max_results);
    let mut operations = BTreeMap::new();
    for m in builtins.collection {
        if let Some(op) = m.operation() {
            operations.insert(op, m.bind(registry, &format!("{}.{}", context, op.as_str()))?);
        }
    }
    let mut document_operations = BTreeMap::new();
    for m in builtins.document {
        if let Some(op) = m.operation() {
            document_operations.insert(op, m.bind(registry, &format!("{}.document.{}", context, op.as_str()))?);
        }
    }

    Ok(PendingCollection {
        table: Table::new(namespace, &def.name, &pk),
        name: def.name,
        description: def.description,
        key_type,
        indexes: def.indexes,
        relations: def.relations,
        schema,
        methods,
        document_methods,
        operations,
        document_operations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn store() -> Option<Arc<dyn Store>> {
        Some(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn json_partial_parses() {
        let partial = SuiteConfig::from_json_str(
            r#"{"name": "shop", "base_path": "/v2", "definitions": {"money": {"type": "number", "minimum": 0}}}"#,
        )
        .unwrap();
        assert_eq!(partial.name.as_deref(), Some("shop"));
        assert!(partial.definitions.contains_key("money"));
        assert!(matches!(SuiteConfig::from_json_str("{"), Err(ConfigError::Load(_))));
    }

    #[test]
    fn missing_primary_key_is_injected_as_string() {
        let apps = vec![ApplicationDef::new("app1").register_collection(CollectionDef::new(
            "notes",
            SchemaDefinition::object().property("text", SchemaDefinition::string()),
        ))];
        let suite = resolve(SuiteConfig::default(), apps, store()).unwrap();
        let notes = suite.lookup("app1").unwrap().collection("notes").unwrap();
        let schema = suite.registry().definition(notes.schema()).unwrap();
        assert_eq!(schema.properties["id"], SchemaDefinition::string());
        assert_eq!(notes.url(), "/api/app1/notes");
        assert_eq!(notes.table().namespace, "app1");
    }

    #[test]
    fn non_scalar_primary_key_is_rejected() {
        let apps = vec![ApplicationDef::new("app1").register_collection(CollectionDef::new(
            "notes",
            SchemaDefinition::object().property("id", SchemaDefinition::boolean()),
        ))];
        assert!(matches!(
            resolve(SuiteConfig::default(), apps, store()),
            Err(ConfigError::InvalidPrimaryKey { .. })
        ));
    }

    #[test]
    fn index_fields_must_be_declared() {
        let apps = vec![ApplicationDef::new("app1")
            .register_collection(CollectionDef::new("notes", SchemaDefinition::object()).index("missing"))];
        assert!(matches!(
            resolve(SuiteConfig::default(), apps, store()),
            Err(ConfigError::MissingReference { kind: "index field", .. })
        ));
    }

    #[test]
    fn store_is_required() {
        let apps = vec![ApplicationDef::new("app1")];
        assert!(matches!(
            resolve(SuiteConfig::default(), apps, None),
            Err(ConfigError::MissingReference { kind: "store", .. })
        ));
    }

    #[test]
    fn shared_definitions_resolve_and_prefix_applies() {
        let config = SuiteConfig {
            namespace_prefix: Some("acme_".into()),
            definitions: [(
                "money".to_string(),
                SchemaDefinition::from_value(json!({"type": "number", "minimum": 0})).unwrap(),
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        let apps = vec![ApplicationDef::new("shop").register_collection(CollectionDef::new(
            "orders",
            SchemaDefinition::from_value(json!({
                "type": "object",
                "properties": {"total": {"$ref": "#/definitions/money"}}
            }))
            .unwrap(),
        ))];
        let suite = resolve(config, apps, store()).unwrap();
        let app = suite.lookup("shop").unwrap();
        assert_eq!(app.namespace(), "acme_shop");
        let orders = app.collection("orders").unwrap();
        let err = suite.registry().validate(orders.schema(), &json!({"id": "a", "total": -1})).unwrap_err();
        assert_eq!(err.paths(), vec!["total"]);
    }
}
