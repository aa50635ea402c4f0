//! PostgreSQL store: one JSONB table per collection, in a schema named after the application namespace.

use super::{Filter, Record, Store, StoreError, Table, WriteMode};
use crate::sql::{self, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

type Row = (String, Value, i64);

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Connect a small pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(PgStore { pool })
    }

    /// Create the database named in `database_url` when it does not exist yet.
    /// Connects to the `postgres` maintenance database to do so.
    pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
        let (admin_url, db_name) = split_database_url(database_url)?;
        if db_name.is_empty() || db_name == "postgres" {
            return Ok(());
        }
        let opts = PgConnectOptions::from_str(&admin_url)
            .map_err(|e| StoreError::Backend(format!("invalid DATABASE_URL: {}", e)))?;
        let mut conn = opts.connect().await?;
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&db_name)
            .fetch_one(&mut conn)
            .await?;
        if !exists.0 {
            tracing::info!(database = %db_name, "creating database");
            sqlx::query(&sql::create_database(&db_name)).execute(&mut conn).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_optional(&self, q: &QueryBuf) -> Result<Option<Row>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_as::<_, Row>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        Ok(query.fetch_optional(&self.pool).await?)
    }

    async fn fetch_all(&self, q: &QueryBuf) -> Result<Vec<Row>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_as::<_, Row>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }
}

/// `postgres://u@h:5432/app?sslmode=x` -> (`postgres://u@h:5432/postgres`, `app`).
fn split_database_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Backend("DATABASE_URL has no database path".into()))?
        + 1;
    let db_name = url[path_start..].split('?').next().unwrap_or("").trim();
    Ok((format!("{}postgres", &url[..path_start]), db_name.to_string()))
}

/// The document body carries its own key with its real JSON type; the key column is text only.
fn to_record(table: &Table, (key, doc, revision): Row) -> Record {
    let key = doc.get(&table.primary_key).cloned().unwrap_or(Value::String(key));
    Record {
        key,
        value: doc,
        revision: u64::try_from(revision).unwrap_or(0),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, table: &Table, key: &Value) -> Result<Option<Record>, StoreError> {
        let q = sql::select_by_key(table, key);
        Ok(self.fetch_optional(&q).await?.map(|row| to_record(table, row)))
    }

    async fn put(&self, table: &Table, key: &Value, value: Value, mode: WriteMode) -> Result<Record, StoreError> {
        let q = match mode {
            WriteMode::Insert => sql::insert(table, key, &value),
            WriteMode::Replace { expected_revision: None } => sql::upsert(table, key, &value),
            WriteMode::Replace {
                expected_revision: Some(expected),
            } => sql::replace_checked(table, key, &value, expected),
        };
        if let Some(row) = self.fetch_optional(&q).await? {
            return Ok(to_record(table, row));
        }
        let key_text = super::key_text(key);
        match mode {
            WriteMode::Insert => Err(StoreError::Conflict(format!("{} '{}' already exists", table.name, key_text))),
            _ => match self.get(table, key).await? {
                Some(current) => Err(StoreError::Conflict(format!(
                    "{} '{}' is at revision {}, expected {:?}",
                    table.name, key_text, current.revision, mode
                ))),
                None => Err(StoreError::NotFound(format!("{} '{}'", table.name, key_text))),
            },
        }
    }

    async fn delete(&self, table: &Table, key: &Value) -> Result<bool, StoreError> {
        let q = sql::delete_by_key(table, key);
        Ok(self.execute(&q).await? > 0)
    }

    async fn query(&self, table: &Table, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let q = sql::select_list(table, filter);
        Ok(self
            .fetch_all(&q)
            .await?
            .into_iter()
            .map(|row| to_record(table, row))
            .collect())
    }

    async fn count(&self, table: &Table, filter: &Filter) -> Result<u64, StoreError> {
        let q = sql::select_count(table, filter);
        tracing::debug!(sql = %q.sql, params = ?q.params, "count");
        let mut query = sqlx::query_as::<_, (i64,)>(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let (n,) = query.fetch_one(&self.pool).await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn delete_where(&self, table: &Table, filter: &Filter) -> Result<u64, StoreError> {
        let q = sql::delete_where(table, filter);
        self.execute(&q).await
    }

    async fn prepare(&self, table: &Table, indexes: &[String]) -> Result<(), StoreError> {
        let mut statements = vec![sql::create_schema(table), sql::create_table(table)];
        statements.extend(indexes.iter().map(|field| sql::create_index(table, field)));
        for ddl in statements {
            tracing::debug!(sql = %ddl, "ddl");
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        tracing::info!(table = %table.qualified_name(), indexes = indexes.len(), "table ready");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
