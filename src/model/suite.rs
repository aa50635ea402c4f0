//! The suite: process-wide registry of applications, built once and read-only afterwards.

use super::Application;
use crate::config::{self, ApplicationDef, Settings, SuiteConfig};
use crate::error::{ConfigError, RouteError};
use crate::schema::SchemaRegistry;
use crate::store::{Store, StoreError};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct Suite {
    pub(crate) settings: Settings,
    pub(crate) applications: BTreeMap<String, Arc<Application>>,
    pub(crate) registry: Arc<SchemaRegistry>,
}

impl Suite {
    pub fn builder() -> SuiteBuilder {
        SuiteBuilder::default()
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<Application>, RouteError> {
        self.applications
            .get(name)
            .ok_or_else(|| RouteError::NotFound(format!("application '{}'", name)))
    }

    /// URL prefix every route lives under; empty means the server root.
    pub fn base_path(&self) -> &str {
        &self.settings.base_path
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn applications(&self) -> impl Iterator<Item = &Arc<Application>> {
        self.applications.values()
    }

    pub fn describe(&self) -> Value {
        let applications: Map<String, Value> = self
            .applications
            .iter()
            .map(|(name, app)| (name.clone(), json!({"url": app.url(), "description": app.description()})))
            .collect();
        let definitions: Map<String, Value> = self
            .registry
            .definitions()
            .iter()
            .map(|(name, d)| (name.clone(), d.to_value()))
            .collect();
        json!({
            "kind": "suite",
            "name": self.settings.name,
            "description": self.settings.description,
            "url": self.settings.base_path,
            "applications": applications,
            "definitions": definitions,
        })
    }

    /// Create the backing tables and indexes of every collection.
    pub async fn prepare_storage(&self) -> Result<(), StoreError> {
        for app in self.applications.values() {
            for collection in app.collections() {
                collection.store().prepare(collection.table(), collection.indexes()).await?;
            }
        }
        tracing::info!(suite = %self.settings.name, "storage prepared");
        Ok(())
    }

    /// Ping every distinct store once.
    pub async fn ping_stores(&self) -> Result<(), StoreError> {
        let mut seen: Vec<usize> = Vec::new();
        for app in self.applications.values() {
            for collection in app.collections() {
                let ptr = Arc::as_ptr(collection.store()) as *const () as usize;
                if seen.contains(&ptr) {
                    continue;
                }
                seen.push(ptr);
                collection.store().ping().await?;
            }
        }
        Ok(())
    }
}

/// Ordered configuration partials, application definitions and the default store.
#[derive(Default)]
pub struct SuiteBuilder {
    partials: Vec<SuiteConfig>,
    applications: Vec<ApplicationDef>,
    store: Option<Arc<dyn Store>>,
}

impl SuiteBuilder {
    /// Add a configuration partial. Later partials override earlier ones field by field.
    pub fn with_config(mut self, partial: SuiteConfig) -> Self {
        self.partials.push(partial);
        self
    }

    pub fn register(mut self, application: ApplicationDef) -> Self {
        self.applications.push(application);
        self
    }

    /// Default store for applications that do not bring their own.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate and resolve everything. Either a complete suite comes back or nothing does.
    pub fn build(self) -> Result<Arc<Suite>, ConfigError> {
        let merged = self
            .partials
            .into_iter()
            .fold(SuiteConfig::default(), |acc, next| acc.merge(next));
        let suite = config::resolve(merged, self.applications, self.store)?;
        tracing::info!(
            suite = %suite.settings.name,
            base_path = %suite.settings.base_path,
            applications = suite.applications.len(),
            "suite ready"
        );
        Ok(Arc::new(suite))
    }
}
