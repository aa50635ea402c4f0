//! Collections: schema-typed document sets backed by an injected store.

use super::{Document, MethodDescriptor, Operation, Suite};
use crate::error::{DispatchError, RouteError, ValidationError};
use crate::schema::{SchemaHandle, SchemaRegistry, SchemaType};
use crate::store::{key_text, Filter, Store, Table};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub struct Collection {
    pub(crate) name: String,
    pub(crate) application: String,
    pub(crate) description: String,
    pub(crate) url: String,
    pub(crate) table: Table,
    pub(crate) key_type: SchemaType,
    pub(crate) indexes: Vec<String>,
    /// Relation name to target collection (`name` in the same application, or `app.name`).
    pub(crate) relations: BTreeMap<String, String>,
    pub(crate) schema: SchemaHandle,
    pub(crate) registry: Arc<SchemaRegistry>,
    pub(crate) methods: BTreeMap<String, Arc<MethodDescriptor>>,
    pub(crate) document_methods: BTreeMap<String, Arc<MethodDescriptor>>,
    pub(crate) operations: BTreeMap<Operation, Arc<MethodDescriptor>>,
    pub(crate) document_operations: BTreeMap<Operation, Arc<MethodDescriptor>>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) max_results: usize,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("application", &self.application)
            .field("url", &self.url)
            .field("primary_key", &self.table.primary_key)
            .field("indexes", &self.indexes)
            .field("relations", &self.relations)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("document_methods", &self.document_methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning application.
    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn primary_key(&self) -> &str {
        &self.table.primary_key
    }

    pub fn indexes(&self) -> &[String] {
        &self.indexes
    }

    pub fn relations(&self) -> &BTreeMap<String, String> {
        &self.relations
    }

    pub fn schema(&self) -> SchemaHandle {
        self.schema
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Collection-level methods, by name.
    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.methods.values()
    }

    pub fn document_method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.document_methods.get(name)
    }

    pub fn document_methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.document_methods.values()
    }

    /// Built-in operation at collection level, if enabled.
    pub fn operation(&self, op: Operation) -> Option<&Arc<MethodDescriptor>> {
        self.operations.get(&op)
    }

    pub fn document_operation(&self, op: Operation) -> Option<&Arc<MethodDescriptor>> {
        self.document_operations.get(&op)
    }

    /// Parse a path segment as a key. Integer keys must parse as integers; either kind must satisfy the key's schema.
    pub fn parse_key(&self, segment: &str) -> Option<Value> {
        let key = match self.key_type {
            SchemaType::Integer => Value::from(segment.parse::<i64>().ok()?),
            _ => Value::String(segment.to_string()),
        };
        self.registry
            .validate_property(self.schema, self.primary_key(), &key)
            .ok()
    }

    /// Build a document from raw input. Assigns a UUID key to string-keyed collections when absent.
    /// Nothing is persisted.
    pub fn create(self: &Arc<Self>, raw: Value) -> Result<Document, ValidationError> {
        let Value::Object(mut fields) = raw else {
            return Err(ValidationError::single("", Some("object".into()), "document must be an object"));
        };
        let pk = self.primary_key().to_string();
        if !fields.contains_key(&pk) && self.key_type == SchemaType::String {
            fields.insert(pk.clone(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        self.from_value(Value::Object(fields), None)
    }

    fn from_value(self: &Arc<Self>, value: Value, revision: Option<u64>) -> Result<Document, ValidationError> {
        let Value::Object(fields) = self.registry.validate(self.schema, &value)? else {
            return Err(ValidationError::single("", Some("object".into()), "document must be an object"));
        };
        let key = fields
            .get(self.primary_key())
            .cloned()
            .ok_or_else(|| ValidationError::single(self.primary_key(), None, "is required"))?;
        Ok(Document::from_valid(Arc::clone(self), key, fields, revision))
    }

    /// Load and re-validate. A stored document that no longer fits the schema is a server-side defect.
    pub async fn by_key(self: &Arc<Self>, key: &Value) -> Result<Document, DispatchError> {
        let record = self
            .store
            .get(&self.table, key)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("{} '{}'", self.name, key_text(key))))?;
        self.from_record(record.value, record.revision)
    }

    fn from_record(self: &Arc<Self>, value: Value, revision: u64) -> Result<Document, DispatchError> {
        self.from_value(value, Some(revision)).map_err(|source| {
            tracing::error!(collection = %self.name, error = %source, "stored document violates collection schema");
            DispatchError::SchemaViolation {
                target: format!("stored {} document", self.name),
                source,
            }
        })
    }

    /// Query the store. `limit` is clamped to 1000 and defaults to the suite's max results.
    pub async fn list(self: &Arc<Self>, mut filter: Filter) -> Result<Vec<Document>, DispatchError> {
        filter.limit = Some(filter.limit.unwrap_or(self.max_results).min(1000));
        let records = self.store.query(&self.table, &filter).await?;
        tracing::debug!(collection = %self.name, count = records.len(), "list");
        records
            .into_iter()
            .map(|r| self.from_record(r.value, r.revision))
            .collect()
    }

    /// Number of documents the filter selects, ignoring its paging.
    pub async fn count(&self, filter: &Filter) -> Result<u64, DispatchError> {
        Ok(self.store.count(&self.table, filter).await?)
    }

    pub async fn delete_where(&self, filter: &Filter) -> Result<u64, DispatchError> {
        Ok(self.store.delete_where(&self.table, filter).await?)
    }

    /// Resolve a declared relation to its target collection.
    pub fn related(&self, suite: &Suite, relation: &str) -> Result<Arc<Collection>, DispatchError> {
        let target = self
            .relations
            .get(relation)
            .ok_or_else(|| DispatchError::NotFound(format!("relation '{}' on {}", relation, self.name)))?;
        let (app, name) = split_target(&self.application, target);
        let found = suite
            .lookup(app)
            .and_then(|a| a.collection(name).map(Arc::clone))
            .map_err(|e: RouteError| DispatchError::Failed(format!("relation '{}': {}", relation, e)))?;
        Ok(found)
    }

    pub fn describe(&self) -> Value {
        let named = |m: &BTreeMap<String, Arc<MethodDescriptor>>| {
            m.iter()
                .filter(|(_, d)| d.exposed)
                .map(|(n, d)| (n.clone(), d.to_json()))
                .collect::<Map<_, _>>()
        };
        let ops = |m: &BTreeMap<Operation, Arc<MethodDescriptor>>| {
            let mut out = Map::new();
            for (op, d) in m {
                for verb in op.verbs() {
                    out.insert((*verb).to_string(), d.to_json());
                }
            }
            out
        };
        json!({
            "kind": "collection",
            "name": self.name,
            "application": self.application,
            "url": self.url,
            "description": self.description,
            "primaryKey": self.primary_key(),
            "indexes": self.indexes,
            "relations": self.relations,
            "schema": self.registry.definition(self.schema).map(|d| d.to_value()).unwrap_or(Value::Null),
            "methods": named(&self.methods),
            "documentMethods": named(&self.document_methods),
            "operations": ops(&self.operations),
            "documentOperations": ops(&self.document_operations),
        })
    }
}

/// `app.collection` names another application's collection; a bare name means the same application.
pub(crate) fn split_target<'a>(own_app: &'a str, target: &'a str) -> (&'a str, &'a str) {
    match target.split_once('.') {
        Some((app, name)) => (app, name),
        None => (own_app, target),
    }
}
