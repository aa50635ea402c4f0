//! Document store capability injected into collections.
//!
//! The core treats every call as an atomic black box. Write conflicts come back as
//! [`StoreError::Conflict`] and are never retried here.

mod filter;
mod memory;
mod postgres;

pub use filter::{json_order, CompareOp, Condition, Filter, OrderBy};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Where a collection's documents live: `namespace` is the application's database namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Table {
    pub namespace: String,
    pub name: String,
    pub primary_key: String,
}

impl Table {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Table {
            namespace: namespace.into(),
            name: name.into(),
            primary_key: primary_key.into(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// One stored document and its revision. Revisions start at 1 and grow by one per write.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub key: Value,
    pub value: Value,
    pub revision: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Fails with a conflict when the key already exists.
    Insert,
    /// Writes unconditionally when `expected_revision` is None; otherwise only over that revision.
    Replace { expected_revision: Option<u64> },
}

/// Canonical text form of a key: strings as-is, other scalars as JSON. `9.0` and `9` share one form.
pub fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64().filter(|f| !n.is_i64() && !n.is_u64() && f.fract() == 0.0) {
            Some(f) if f.abs() < i64::MAX as f64 => (f as i64).to_string(),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, table: &Table, key: &Value) -> Result<Option<Record>, StoreError>;

    async fn put(&self, table: &Table, key: &Value, value: Value, mode: WriteMode) -> Result<Record, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, table: &Table, key: &Value) -> Result<bool, StoreError>;

    async fn query(&self, table: &Table, filter: &Filter) -> Result<Vec<Record>, StoreError>;

    /// Number of records the filter selects. Ordering and paging are ignored.
    async fn count(&self, table: &Table, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self.query(table, &filter.unpaged()).await?.len() as u64)
    }

    /// Delete every record the filter selects. Ordering and paging are ignored.
    async fn delete_where(&self, table: &Table, filter: &Filter) -> Result<u64, StoreError> {
        let all = filter.unpaged();
        let mut deleted = 0;
        for record in self.query(table, &all).await? {
            if self.delete(table, &record.key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Create whatever backing structure the table needs. Called once per collection at startup.
    async fn prepare(&self, _table: &Table, _indexes: &[String]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
