//! Maps an HTTP verb, path and query onto one target.
//!
//! `{base}/{app}/{collection}[/{key}][/{method}]`, or `{base}/{app}/{method}` for application methods.
//! A third segment naming an exposed collection method is the method, even when it would also parse
//! as a key. Hidden methods do not reserve their names.

use super::query::QueryArgs;
use super::target::{Action, ResolvedTarget};
use crate::error::{AppError, RouteError};
use crate::model::{MethodDescriptor, Operation, Suite};
use axum::http::Method;
use std::collections::BTreeMap;
use std::sync::Arc;

const MAX_SEGMENTS: usize = 4;

/// Verbs a method segment answers to, besides OPTIONS.
const METHOD_VERBS: [&str; 3] = ["GET", "POST", "OPTIONS"];

pub struct Resolver {
    suite: Arc<Suite>,
}

/// Where in the tree the path stopped.
enum Level {
    Application,
    Collection,
    Document,
}

impl Resolver {
    pub fn new(suite: Arc<Suite>) -> Self {
        Resolver { suite }
    }

    /// Resolve a request. Loading a document by key touches the store, so store errors surface here too.
    pub async fn resolve(&self, method: &Method, path: &str, query: Option<&str>) -> Result<ResolvedTarget, AppError> {
        let query = QueryArgs::parse(query)?;
        let describe = method == Method::OPTIONS || query.describe;
        let segments = self.segments(path)?;
        tracing::debug!(method = %method, path = %path, segments = segments.len(), describe, "resolve");

        let mut target = ResolvedTarget {
            application: None,
            collection: None,
            document: None,
            action: Action::Describe(None),
            query,
            route: path.to_string(),
        };

        let Some(app_name) = segments.first() else {
            if describe || method == Method::GET {
                return Ok(target);
            }
            return Err(method_not_allowed(method, path, vec!["GET", "OPTIONS"]));
        };
        let app = Arc::clone(self.suite.lookup(app_name)?);
        target.application = Some(Arc::clone(&app));

        let Some(second) = segments.get(1) else {
            target.action = infer(method, path, describe, &app.operations, Level::Application)?;
            return Ok(target);
        };

        let collection = match app.collection(second) {
            Ok(c) => Arc::clone(c),
            Err(not_found) => {
                let m = exposed(app.method(second)).ok_or(not_found)?;
                if segments.len() > 2 {
                    return Err(RouteError::NotFound(path.to_string()).into());
                }
                target.action = explicit(method, path, describe, m)?;
                return Ok(self.finish(target));
            }
        };
        target.collection = Some(Arc::clone(&collection));

        let Some(third) = segments.get(2) else {
            target.action = infer(method, path, describe, &collection.operations, Level::Collection)?;
            return Ok(self.finish(target));
        };

        if let Some(m) = exposed(collection.method(third)) {
            if segments.len() > 3 {
                return Err(RouteError::NotFound(path.to_string()).into());
            }
            target.action = explicit(method, path, describe, m)?;
            return Ok(self.finish(target));
        }

        let key = collection
            .parse_key(third)
            .ok_or_else(|| RouteError::NotFound(format!("{} '{}'", collection.name(), third)))?;
        let document = collection.by_key(&key).await?;
        target.document = Some(document);

        match segments.get(3) {
            None => {
                target.action = infer(method, path, describe, &collection.document_operations, Level::Document)?;
            }
            Some(name) => {
                let m = exposed(collection.document_method(name))
                    .ok_or_else(|| RouteError::NotFound(format!("document method '{}' on {}", name, collection.name())))?;
                target.action = explicit(method, path, describe, m)?;
            }
        }
        Ok(self.finish(target))
    }

    /// Strip the base path and percent-decode each segment.
    fn segments(&self, path: &str) -> Result<Vec<String>, AppError> {
        let base = self.suite.base_path();
        let rest = if base.is_empty() {
            path
        } else {
            match path.strip_prefix(base) {
                Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
                _ => return Err(RouteError::NotFound(path.to_string()).into()),
            }
        };
        let segments = rest
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .map_err(|_| AppError::BadRequest(format!("path segment '{}' is not valid UTF-8", s)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if segments.len() > MAX_SEGMENTS {
            return Err(RouteError::NotFound(path.to_string()).into());
        }
        Ok(segments)
    }

    /// Apply schema-directed coercion of query values for the chosen method.
    fn finish(&self, mut target: ResolvedTarget) -> ResolvedTarget {
        if let Some(m) = target.method().cloned() {
            target.query.coerce(&m.parameters);
        }
        target
    }

    pub fn suite(&self) -> &Arc<Suite> {
        &self.suite
    }
}

fn exposed(m: Option<&Arc<MethodDescriptor>>) -> Option<Arc<MethodDescriptor>> {
    m.filter(|m| m.exposed).cloned()
}

fn method_not_allowed(method: &Method, path: &str, allowed: Vec<&'static str>) -> AppError {
    RouteError::MethodNotAllowed {
        method: method.to_string(),
        target: path.to_string(),
        allowed,
    }
    .into()
}

/// A named method answers GET and POST.
fn explicit(method: &Method, path: &str, describe: bool, m: Arc<MethodDescriptor>) -> Result<Action, AppError> {
    if describe {
        return Ok(Action::Describe(Some(m)));
    }
    if method == Method::GET || method == Method::POST {
        Ok(Action::Invoke(m))
    } else {
        Err(method_not_allowed(method, path, METHOD_VERBS.to_vec()))
    }
}

/// No method segment: the verb picks the built-in operation at this level.
fn infer(
    method: &Method,
    path: &str,
    describe: bool,
    operations: &BTreeMap<Operation, Arc<MethodDescriptor>>,
    level: Level,
) -> Result<Action, AppError> {
    if describe {
        return Ok(Action::Describe(None));
    }
    if let Some(m) = Operation::from_http(method).and_then(|op| operations.get(&op)) {
        return Ok(Action::Invoke(Arc::clone(m)));
    }
    let mut allowed: Vec<&'static str> = operations.keys().flat_map(|op| op.verbs().iter().copied()).collect();
    allowed.push("OPTIONS");
    let what = match level {
        Level::Application => "application",
        Level::Collection => "collection",
        Level::Document => "document",
    };
    tracing::debug!(method = %method, level = what, "no operation for verb");
    Err(method_not_allowed(method, path, allowed))
}
