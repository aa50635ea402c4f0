//! Validated invocation: parameters in, handler, return value out.

use super::target::{Action, ResolvedTarget};
use crate::error::{DispatchError, ValidationError};
use crate::model::{Arguments, Invocation, MethodDescriptor, OwnerKind, Receiver, Suite};
use crate::service::crud::ITEMS_ARG;
use serde_json::Value;
use std::sync::Arc;

pub struct Dispatcher {
    suite: Arc<Suite>,
}

impl Dispatcher {
    pub fn new(suite: Arc<Suite>) -> Self {
        Dispatcher { suite }
    }

    /// Run a resolved target. Describe targets produce documentation and never touch a handler.
    pub async fn invoke(&self, target: ResolvedTarget, body: Option<Value>) -> Result<Value, DispatchError> {
        let method = match &target.action {
            Action::Describe(_) => return Ok(target.describe(&self.suite)),
            Action::Invoke(m) => Arc::clone(m),
        };
        let ResolvedTarget {
            collection,
            document,
            query,
            ..
        } = target;

        let mut args = query.into_args();
        match body {
            None | Some(Value::Null) => {}
            Some(Value::Object(fields)) => {
                // body fields win over query fields of the same name
                args.extend(fields);
            }
            Some(items @ Value::Array(_)) if method.parameters.properties.contains_key(ITEMS_ARG) => {
                args.insert(ITEMS_ARG.to_string(), items);
            }
            Some(other) => {
                return Err(DispatchError::BadRequest(format!(
                    "request body must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        }

        let receiver = match (document, collection) {
            (Some(d), _) if method.owner == OwnerKind::Document => Receiver::Document(d),
            (_, Some(c)) if method.owner == OwnerKind::Collection => Receiver::Collection(c),
            _ => Receiver::None,
        };
        self.call(&method, receiver, args).await
    }

    /// Validate arguments, run the handler, then validate what it returned.
    pub async fn call(&self, method: &MethodDescriptor, receiver: Receiver, args: Arguments) -> Result<Value, DispatchError> {
        let expected = match method.owner {
            OwnerKind::Application => None,
            kind => Some(kind),
        };
        if receiver.kind() != expected {
            return Err(DispatchError::Failed(format!(
                "method '{}' is owned by {:?} but was called with {:?}",
                method.name,
                method.owner,
                receiver.kind()
            )));
        }

        let registry = self.suite.registry();
        let args = match registry.validate(method.parameter_schema()?, &Value::Object(args))? {
            Value::Object(args) => args,
            _ => Arguments::new(),
        };

        tracing::debug!(method = %method.name, owner = ?method.owner, "invoking method");
        let invocation = Invocation {
            suite: Arc::clone(&self.suite),
            receiver,
            args,
        };
        let output = method.call(invocation).await?;

        registry
            .validate(method.return_schema()?, &output)
            .map_err(|source: ValidationError| {
                tracing::error!(method = %method.name, error = %source, "method returned a value violating its declared schema");
                DispatchError::SchemaViolation {
                    target: format!("method '{}' return value", method.name),
                    source,
                }
            })
    }

    pub fn suite(&self) -> &Arc<Suite> {
        &self.suite
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
