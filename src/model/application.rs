//! Applications: named groups of collections bound to one database namespace.

use super::{Collection, MethodDescriptor, Operation};
use crate::error::RouteError;
use crate::store::StoreError;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub struct Application {
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) description: String,
    pub(crate) url: String,
    pub(crate) collections: BTreeMap<String, Arc<Collection>>,
    pub(crate) methods: BTreeMap<String, Arc<MethodDescriptor>>,
    pub(crate) operations: BTreeMap<Operation, Arc<MethodDescriptor>>,
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Application {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical database namespace every collection of this application lives in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn collection(&self, name: &str) -> Result<&Arc<Collection>, RouteError> {
        self.collections
            .get(name)
            .ok_or_else(|| RouteError::NotFound(format!("collection '{}' in {}", name, self.name)))
    }

    pub fn collections(&self) -> impl Iterator<Item = &Arc<Collection>> {
        self.collections.values()
    }

    /// Ping each distinct store behind this application's collections.
    pub async fn ping_stores(&self) -> Result<(), StoreError> {
        let mut pinged: Vec<usize> = Vec::new();
        for collection in self.collections.values() {
            let store = Arc::as_ptr(collection.store()) as *const () as usize;
            if !pinged.contains(&store) {
                pinged.push(store);
                collection.store().ping().await?;
            }
        }
        Ok(())
    }

    pub fn method(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(name)
    }

    /// Application-level methods. They are invoked with no receiver.
    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.methods.values()
    }

    pub fn operation(&self, op: Operation) -> Option<&Arc<MethodDescriptor>> {
        self.operations.get(&op)
    }

    /// Listing returned by `GET {base}/{app}` and by the documentation variant.
    pub fn describe(&self) -> Value {
        let collections: Map<String, Value> = self
            .collections
            .iter()
            .map(|(name, c)| {
                (
                    name.clone(),
                    json!({"url": c.url(), "description": c.description()}),
                )
            })
            .collect();
        let methods: Map<String, Value> = self
            .methods
            .iter()
            .filter(|(_, m)| m.exposed)
            .map(|(name, m)| (name.clone(), m.to_json()))
            .collect();
        json!({
            "kind": "application",
            "name": self.name,
            "namespace": self.namespace,
            "url": self.url,
            "description": self.description,
            "collections": collections,
            "methods": methods,
        })
    }
}
