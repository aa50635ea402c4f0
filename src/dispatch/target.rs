//! The outcome of resolving one request.

use super::query::QueryArgs;
use crate::model::{Application, Collection, Document, MethodDescriptor, Operation, OwnerKind, Suite};
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum Action {
    /// Call a declared method or a built-in operation.
    Invoke(Arc<MethodDescriptor>),
    /// Documentation for the route; carries the method when the path named one.
    Describe(Option<Arc<MethodDescriptor>>),
}

#[derive(Debug)]
pub struct ResolvedTarget {
    pub application: Option<Arc<Application>>,
    pub collection: Option<Arc<Collection>>,
    pub document: Option<Document>,
    pub action: Action,
    pub query: QueryArgs,
    pub route: String,
}

impl ResolvedTarget {
    pub fn method(&self) -> Option<&Arc<MethodDescriptor>> {
        match &self.action {
            Action::Invoke(m) => Some(m),
            Action::Describe(m) => m.as_ref(),
        }
    }

    /// Collection-level create answers 201.
    pub fn is_create(&self) -> bool {
        matches!(&self.action, Action::Invoke(m) if m.owner == OwnerKind::Collection && m.operation() == Some(Operation::Create))
    }

    /// Documentation for exactly this route, produced without invoking anything.
    pub fn describe(&self, suite: &Suite) -> Value {
        let mut out = match (&self.action, &self.document, &self.collection, &self.application) {
            (Action::Describe(Some(m)) | Action::Invoke(m), _, _, _) if m.operation().is_none() => {
                let mut doc = m.to_json();
                if let Value::Object(map) = &mut doc {
                    map.insert("kind".into(), Value::String("method".into()));
                    map.insert("verbs".into(), json!(["GET", "POST"]));
                }
                doc
            }
            (_, Some(document), _, _) => describe_document(document),
            (_, None, Some(collection), _) => collection.describe(),
            (_, None, None, Some(app)) => app.describe(),
            _ => suite.describe(),
        };
        if let Value::Object(map) = &mut out {
            map.insert("route".into(), Value::String(self.route.clone()));
        }
        out
    }
}

fn describe_document(document: &Document) -> Value {
    let collection = document.collection();
    let methods: Map<String, Value> = collection
        .document_methods()
        .filter(|m| m.exposed)
        .map(|m| (m.name.clone(), m.to_json()))
        .collect();
    let mut operations = Map::new();
    for op in Operation::ALL {
        if let Some(m) = collection.document_operation(op) {
            for verb in op.verbs() {
                operations.insert((*verb).to_string(), m.to_json());
            }
        }
    }
    json!({
        "kind": "document",
        "collection": collection.name(),
        "key": document.key(),
        "url": document.url(),
        "schema": collection
            .registry()
            .definition(collection.schema())
            .map(|d| d.to_value())
            .unwrap_or(Value::Null),
        "methods": methods,
        "operations": operations,
    })
}
