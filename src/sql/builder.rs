//! Builds parameterized DDL and document statements for one JSONB table per collection.
//!
//! Every table has the same shape: `key TEXT PRIMARY KEY, doc JSONB, revision BIGINT, updated_at`.

use super::params::PgBindValue;
use crate::store::{Condition, Filter, Table};
use serde_json::Value;

/// Quote identifier for PostgreSQL (identifiers only come from registered names).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote a string literal; used for JSON field names inside expressions.
fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Full qualified table name.
fn qualified_table(table: &Table) -> String {
    format!("{}.{}", quoted(&table.namespace), quoted(&table.name))
}

pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE {}", quoted(name))
}

const COLUMNS: &str = "key, doc, revision";

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

pub fn create_schema(table: &Table) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(&table.namespace))
}

pub fn create_table(table: &Table) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, doc JSONB NOT NULL, revision BIGINT NOT NULL DEFAULT 1, updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
        qualified_table(table)
    )
}

/// Expression index on `doc->>field`.
pub fn create_index(table: &Table, field: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ((doc ->> {}))",
        quoted(&format!("{}_{}_idx", table.name, field)),
        qualified_table(table),
        literal(field)
    )
}

pub fn select_by_key(table: &Table, key: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(PgBindValue::key(key));
    q.sql = format!("SELECT {} FROM {} WHERE key = ${}", COLUMNS, qualified_table(table), n);
    q
}

fn where_clause(q: &mut QueryBuf, filter: &Filter) -> String {
    let mut parts: Vec<String> = filter
        .equals
        .iter()
        .map(|(field, value)| {
            let n = q.push_param(PgBindValue::Json(value.clone()));
            format!("doc -> {} = ${}", literal(field), n)
        })
        .collect();
    parts.extend(filter.conditions.iter().map(|c| condition(q, c)));
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// Comparisons only hold between values of one JSON type; a missing field yields NULL and never matches.
fn condition(q: &mut QueryBuf, c: &Condition) -> String {
    match c {
        Condition::Compare { field, op, value } => {
            let n = q.push_param(PgBindValue::Json(value.clone()));
            let f = literal(field);
            format!(
                "(jsonb_typeof(doc -> {f}) = jsonb_typeof(${n}) AND doc -> {f} {op} ${n})",
                f = f,
                n = n,
                op = op.as_sql()
            )
        }
        Condition::Match { field, pattern } => {
            let n = q.push_param(PgBindValue::Text(pattern.clone()));
            let f = literal(field);
            format!("(jsonb_typeof(doc -> {f}) = 'string' AND doc ->> {f} ~ ${n})", f = f, n = n)
        }
        Condition::Contains { field, value } => {
            let n = q.push_param(PgBindValue::Json(Value::Array(vec![value.clone()])));
            let f = literal(field);
            format!("(jsonb_typeof(doc -> {f}) = 'array' AND doc -> {f} @> ${n})", f = f, n = n)
        }
        Condition::HasFields(fields) => {
            let checks: Vec<String> = fields
                .iter()
                .map(|field| format!("doc ? ${}", q.push_param(PgBindValue::Text(field.clone()))))
                .collect();
            format!("({})", checks.join(" AND "))
        }
    }
}

/// SELECT with filters on document fields, ordered by `order_by` then the primary-key field, LIMIT/OFFSET.
pub fn select_list(table: &Table, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, filter);
    let key_order = format!("doc -> {}", literal(&table.primary_key));
    let order_clause = match &filter.order_by {
        Some(order) => format!(
            " ORDER BY doc -> {} {}, {}",
            literal(&order.field),
            if order.descending { "DESC NULLS FIRST" } else { "ASC NULLS LAST" },
            key_order
        ),
        None => format!(" ORDER BY {}", key_order),
    };
    let limit_clause = filter.limit.map(|n| format!(" LIMIT {}", n.min(1000))).unwrap_or_default();
    let offset_clause = if filter.offset > 0 {
        format!(" OFFSET {}", filter.offset)
    } else {
        String::new()
    };
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        COLUMNS,
        qualified_table(table),
        where_sql,
        order_clause,
        limit_clause,
        offset_clause
    );
    q
}

pub fn select_count(table: &Table, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, filter);
    q.sql = format!("SELECT count(*) FROM {}{}", qualified_table(table), where_sql);
    q
}

/// INSERT that yields no row when the key exists.
pub fn insert(table: &Table, key: &Value, doc: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let k = q.push_param(PgBindValue::key(key));
    let d = q.push_param(PgBindValue::Json(doc.clone()));
    q.sql = format!(
        "INSERT INTO {} (key, doc) VALUES (${}, ${}) ON CONFLICT (key) DO NOTHING RETURNING {}",
        qualified_table(table),
        k,
        d,
        COLUMNS
    );
    q
}

/// Unconditional write: insert or bump the revision.
pub fn upsert(table: &Table, key: &Value, doc: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let name = qualified_table(table);
    let k = q.push_param(PgBindValue::key(key));
    let d = q.push_param(PgBindValue::Json(doc.clone()));
    q.sql = format!(
        "INSERT INTO {} AS t (key, doc) VALUES (${}, ${}) ON CONFLICT (key) DO UPDATE SET doc = EXCLUDED.doc, revision = t.revision + 1, updated_at = NOW() RETURNING {}",
        name, k, d, COLUMNS
    );
    q
}

/// UPDATE guarded by the expected revision; yields no row when stale or missing.
pub fn replace_checked(table: &Table, key: &Value, doc: &Value, expected_revision: u64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let k = q.push_param(PgBindValue::key(key));
    let d = q.push_param(PgBindValue::Json(doc.clone()));
    let r = q.push_param(PgBindValue::revision(expected_revision));
    q.sql = format!(
        "UPDATE {} SET doc = ${}, revision = revision + 1, updated_at = NOW() WHERE key = ${} AND revision = ${} RETURNING {}",
        qualified_table(table),
        d,
        k,
        r,
        COLUMNS
    );
    q
}

pub fn delete_by_key(table: &Table, key: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(PgBindValue::key(key));
    q.sql = format!("DELETE FROM {} WHERE key = ${}", qualified_table(table), n);
    q
}

pub fn delete_where(table: &Table, filter: &Filter) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, filter);
    q.sql = format!("DELETE FROM {}{}", qualified_table(table), where_sql);
    q
}
