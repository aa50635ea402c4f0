//! Method descriptors: the uniform shape of every callable exposed by an application, collection or document.

use super::{Collection, Document, Suite};
use crate::error::{ConfigError, DispatchError};
use crate::schema::{SchemaDefinition, SchemaHandle, SchemaRegistry};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Application,
    Collection,
    Document,
}

/// Operation inferred from the HTTP verb when no method segment is given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 4] = [Operation::Read, Operation::Create, Operation::Update, Operation::Delete];

    pub fn from_http(method: &axum::http::Method) -> Option<Self> {
        match method.as_str() {
            "GET" => Some(Operation::Read),
            "POST" => Some(Operation::Create),
            "PUT" | "PATCH" => Some(Operation::Update),
            "DELETE" => Some(Operation::Delete),
            _ => None,
        }
    }

    pub fn verbs(self) -> &'static [&'static str] {
        match self {
            Operation::Read => &["GET"],
            Operation::Create => &["POST"],
            Operation::Update => &["PUT", "PATCH"],
            Operation::Delete => &["DELETE"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Implicit receiver handed to a method: nothing, the collection, or the document.
#[derive(Debug)]
pub enum Receiver {
    None,
    Collection(Arc<Collection>),
    Document(Document),
}

impl Receiver {
    pub fn kind(&self) -> Option<OwnerKind> {
        match self {
            Receiver::None => None,
            Receiver::Collection(_) => Some(OwnerKind::Collection),
            Receiver::Document(_) => Some(OwnerKind::Document),
        }
    }
}

/// Validated arguments, keyed by parameter name.
pub type Arguments = Map<String, Value>;

/// Everything a method body receives.
#[derive(Debug)]
pub struct Invocation {
    pub suite: Arc<Suite>,
    pub receiver: Receiver,
    pub args: Arguments,
}

impl Invocation {
    /// Deserialize one argument. Absent or null yields `None`.
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, DispatchError> {
        match self.args.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| DispatchError::BadRequest(format!("argument '{}': {}", name, e))),
        }
    }

    /// The receiving collection, or the collection owning the receiving document.
    pub fn collection(&self) -> Result<&Arc<Collection>, DispatchError> {
        match &self.receiver {
            Receiver::Collection(c) => Ok(c),
            Receiver::Document(d) => Ok(d.collection()),
            Receiver::None => Err(DispatchError::Failed("method has no collection receiver".into())),
        }
    }

    pub fn document(&self) -> Result<&Document, DispatchError> {
        match &self.receiver {
            Receiver::Document(d) => Ok(d),
            _ => Err(DispatchError::Failed("method has no document receiver".into())),
        }
    }

    pub fn into_document(self) -> Result<Document, DispatchError> {
        match self.receiver {
            Receiver::Document(d) => Ok(d),
            _ => Err(DispatchError::Failed("method has no document receiver".into())),
        }
    }
}

#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(&self, invocation: Invocation) -> Result<Value, DispatchError>;
}

#[async_trait]
impl<F, Fut> MethodHandler for F
where
    F: Fn(Invocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
{
    async fn call(&self, invocation: Invocation) -> Result<Value, DispatchError> {
        (self)(invocation).await
    }
}

/// One callable. Declared before the suite is built, then bound to the registry and frozen.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub owner: OwnerKind,
    pub description: String,
    pub parameters: SchemaDefinition,
    pub returns: SchemaDefinition,
    pub exposed: bool,
    pub(crate) operation: Option<Operation>,
    handler: Arc<dyn MethodHandler>,
    parameter_handle: Option<SchemaHandle>,
    return_handle: Option<SchemaHandle>,
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("exposed", &self.exposed)
            .field("operation", &self.operation)
            .finish()
    }
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, owner: OwnerKind, handler: impl MethodHandler + 'static) -> Self {
        MethodDescriptor {
            name: name.into(),
            owner,
            description: String::new(),
            parameters: SchemaDefinition::object(),
            returns: SchemaDefinition::default(),
            exposed: true,
            operation: None,
            handler: Arc::new(handler),
            parameter_handle: None,
            return_handle: None,
        }
    }

    /// Free-function style: no receiver.
    pub fn application(name: impl Into<String>, handler: impl MethodHandler + 'static) -> Self {
        Self::new(name, OwnerKind::Application, handler)
    }

    /// Receives the collection.
    pub fn collection(name: impl Into<String>, handler: impl MethodHandler + 'static) -> Self {
        Self::new(name, OwnerKind::Collection, handler)
    }

    /// Receives the document addressed by key.
    pub fn document(name: impl Into<String>, handler: impl MethodHandler + 'static) -> Self {
        Self::new(name, OwnerKind::Document, handler)
    }

    pub(crate) fn builtin(operation: Operation, owner: OwnerKind, handler: impl MethodHandler + 'static) -> Self {
        let mut m = Self::new(operation.as_str(), owner, handler);
        m.operation = Some(operation);
        m
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parameters(mut self, schema: SchemaDefinition) -> Self {
        self.parameters = schema;
        self
    }

    pub fn returns(mut self, schema: SchemaDefinition) -> Self {
        self.returns = schema;
        self
    }

    /// Not reachable over HTTP; still callable in-process.
    pub fn hidden(mut self) -> Self {
        self.exposed = false;
        self
    }

    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    /// Register both schemas. The parameter schema must have an object root.
    pub(crate) fn bind(mut self, registry: &mut SchemaRegistry, context: &str) -> Result<Self, ConfigError> {
        self.parameter_handle = Some(registry.register_object(self.parameters.clone(), &format!("{}.parameters", context))?);
        self.return_handle = Some(registry.register(self.returns.clone(), &format!("{}.returns", context))?);
        if let Some(h) = self.parameter_handle {
            if let Some(resolved) = registry.definition(h) {
                self.parameters = resolved.clone();
            }
        }
        if let Some(h) = self.return_handle {
            if let Some(resolved) = registry.definition(h) {
                self.returns = resolved.clone();
            }
        }
        Ok(self)
    }

    pub fn parameter_schema(&self) -> Result<SchemaHandle, DispatchError> {
        self.parameter_handle
            .ok_or_else(|| DispatchError::Failed(format!("method '{}' was never registered", self.name)))
    }

    pub fn return_schema(&self) -> Result<SchemaHandle, DispatchError> {
        self.return_handle
            .ok_or_else(|| DispatchError::Failed(format!("method '{}' was never registered", self.name)))
    }

    /// Call the implementation directly, without validation.
    pub async fn call(&self, invocation: Invocation) -> Result<Value, DispatchError> {
        self.handler.call(invocation).await
    }

    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "name": self.name,
            "owner": self.owner,
            "description": self.description,
            "parameters": self.parameters.to_value(),
            "returns": self.returns.to_value(),
        });
        if let (Some(op), Value::Object(map)) = (self.operation, &mut out) {
            map.insert("operation".into(), Value::String(op.as_str().into()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn verbs_map_to_operations() {
        assert_eq!(Operation::from_http(&Method::GET), Some(Operation::Read));
        assert_eq!(Operation::from_http(&Method::POST), Some(Operation::Create));
        assert_eq!(Operation::from_http(&Method::PUT), Some(Operation::Update));
        assert_eq!(Operation::from_http(&Method::PATCH), Some(Operation::Update));
        assert_eq!(Operation::from_http(&Method::DELETE), Some(Operation::Delete));
        assert_eq!(Operation::from_http(&Method::OPTIONS), None);
    }

    #[test]
    fn parameter_root_must_be_object() {
        let mut registry = SchemaRegistry::new();
        let m = MethodDescriptor::application("ping", |_inv: Invocation| async { Ok::<_, DispatchError>(Value::Null) })
            .parameters(SchemaDefinition::string());
        assert!(matches!(m.bind(&mut registry, "app.ping"), Err(ConfigError::MalformedSchema { .. })));
    }

    #[test]
    fn describes_schemas() {
        let mut registry = SchemaRegistry::new();
        let m = MethodDescriptor::collection("count", |_inv: Invocation| async { Ok::<_, DispatchError>(json!(0)) })
            .describe("Count documents")
            .returns(SchemaDefinition::integer())
            .bind(&mut registry, "widgets.count")
            .unwrap();
        let doc = m.to_json();
        assert_eq!(doc["owner"], "collection");
        assert_eq!(doc["returns"]["type"], "integer");
        assert_eq!(doc["parameters"]["type"], "object");
        assert!(m.parameter_schema().is_ok());
    }
}
