//! In-process store. Used by tests and the demo when no database is configured.

use super::{Filter, Record, Store, StoreError, Table, WriteMode};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// Numeric keys sort numerically, string keys by text, matching JSONB order for one key type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeyOrd {
    Int(i64),
    Text(String),
}

impl KeyOrd {
    fn of(key: &Value) -> Self {
        match key {
            Value::Number(_) => match super::key_text(key).parse::<i64>() {
                Ok(n) => KeyOrd::Int(n),
                Err(_) => KeyOrd::Text(super::key_text(key)),
            },
            _ => KeyOrd::Text(super::key_text(key)),
        }
    }
}

type Rows = BTreeMap<KeyOrd, Record>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Rows>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, table: &Table, key: &Value) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .get(&table.qualified_name())
            .and_then(|rows| rows.get(&KeyOrd::of(key)))
            .cloned())
    }

    async fn put(&self, table: &Table, key: &Value, value: Value, mode: WriteMode) -> Result<Record, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let rows = tables.entry(table.qualified_name()).or_default();
        let k = KeyOrd::of(key);
        let current = rows.get(&k).map(|r| r.revision);
        let revision = match (mode, current) {
            (WriteMode::Insert, Some(_)) => {
                return Err(StoreError::Conflict(format!(
                    "{} '{}' already exists",
                    table.name,
                    super::key_text(key)
                )))
            }
            (WriteMode::Replace { expected_revision: Some(expected) }, Some(found)) if expected != found => {
                return Err(StoreError::Conflict(format!(
                    "{} '{}' is at revision {}, expected {}",
                    table.name,
                    super::key_text(key),
                    found,
                    expected
                )))
            }
            (WriteMode::Replace { expected_revision: Some(_) }, None) => {
                return Err(StoreError::NotFound(format!("{} '{}'", table.name, super::key_text(key))))
            }
            (_, Some(found)) => found + 1,
            (_, None) => 1,
        };
        let record = Record {
            key: key.clone(),
            value,
            revision,
        };
        rows.insert(k, record.clone());
        Ok(record)
    }

    async fn delete(&self, table: &Table, key: &Value) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        Ok(tables
            .get_mut(&table.qualified_name())
            .and_then(|rows| rows.remove(&KeyOrd::of(key)))
            .is_some())
    }

    async fn query(&self, table: &Table, filter: &Filter) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let Some(rows) = tables.get(&table.qualified_name()) else {
            return Ok(Vec::new());
        };
        let mut matching: Vec<&Record> = rows.values().filter(|r| filter.matches(&r.value)).collect();
        if let Some(order) = &filter.order_by {
            // stable, so key order breaks ties
            matching.sort_by(|a, b| order.compare(&a.value, &b.value));
        }
        let page = matching.into_iter().skip(filter.offset);
        Ok(match filter.limit {
            Some(limit) => page.take(limit).cloned().collect(),
            None => page.cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Condition, OrderBy};
    use serde_json::json;

    fn widgets() -> Table {
        Table::new("app1", "widgets", "id")
    }

    #[tokio::test]
    async fn insert_conflicts_on_existing_key() {
        let store = MemoryStore::new();
        let t = widgets();
        let rec = store.put(&t, &json!("a"), json!({"id": "a"}), WriteMode::Insert).await.unwrap();
        assert_eq!(rec.revision, 1);
        let err = store.put(&t, &json!("a"), json!({"id": "a"}), WriteMode::Insert).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn stale_replace_conflicts() {
        let store = MemoryStore::new();
        let t = widgets();
        store.put(&t, &json!(1), json!({"id": 1}), WriteMode::Insert).await.unwrap();
        let rec = store
            .put(&t, &json!(1), json!({"id": 1, "n": 2}), WriteMode::Replace { expected_revision: Some(1) })
            .await
            .unwrap();
        assert_eq!(rec.revision, 2);
        let err = store
            .put(&t, &json!(1), json!({"id": 1, "n": 3}), WriteMode::Replace { expected_revision: Some(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn query_filters_orders_and_pages() {
        let store = MemoryStore::new();
        let t = widgets();
        for (id, color) in [(10, "red"), (9, "blue"), (2, "red"), (1, "red")] {
            store
                .put(&t, &json!(id), json!({"id": id, "color": color}), WriteMode::Insert)
                .await
                .unwrap();
        }
        let filter = Filter {
            equals: vec![("color".into(), json!("red"))],
            limit: Some(2),
            offset: 1,
            ..Default::default()
        };
        let keys: Vec<Value> = store.query(&t, &filter).await.unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![json!(2), json!(10)]);
        assert_eq!(store.delete_where(&t, &Filter { equals: vec![("color".into(), json!("red"))], ..Default::default() }).await.unwrap(), 3);
        assert_eq!(store.query(&t, &Filter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn whole_float_keys_share_the_integer_slot() {
        let store = MemoryStore::new();
        let t = Table::new("app1", "gadgets", "num");
        store.put(&t, &json!(9.0), json!({"num": 9}), WriteMode::Insert).await.unwrap();
        assert!(store.get(&t, &json!(9)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn string_keys_order_as_text() {
        let store = MemoryStore::new();
        let t = widgets();
        for id in ["2", "10", "b"] {
            store.put(&t, &json!(id), json!({"id": id}), WriteMode::Insert).await.unwrap();
        }
        let keys: Vec<Value> = store.query(&t, &Filter::default()).await.unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![json!("10"), json!("2"), json!("b")]);
    }

    #[tokio::test]
    async fn conditions_order_and_count() {
        let store = MemoryStore::new();
        let t = widgets();
        for (id, n, tags) in [("a", 5, json!(["x"])), ("b", 1, json!(["y"])), ("c", 3, json!(["x", "y"]))] {
            store
                .put(&t, &json!(id), json!({"id": id, "n": n, "tags": tags}), WriteMode::Insert)
                .await
                .unwrap();
        }
        store.put(&t, &json!("d"), json!({"id": "d"}), WriteMode::Insert).await.unwrap();

        let filter = Filter {
            conditions: Condition::parse_all(&json!([
                {"op": ">=", "lhs": "n", "rhs": 3},
                {"op": "contains", "lhs": "tags", "rhs": "x"}
            ]))
            .unwrap(),
            order_by: Some(OrderBy::parse("-n")),
            ..Default::default()
        };
        let keys: Vec<Value> = store.query(&t, &filter).await.unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![json!("a"), json!("c")]);

        let limited = Filter {
            limit: Some(1),
            ..filter.clone()
        };
        assert_eq!(store.query(&t, &limited).await.unwrap().len(), 1);
        assert_eq!(store.count(&t, &limited).await.unwrap(), 2);

        let has = Filter {
            conditions: vec![Condition::HasFields(vec!["n".into()])],
            ..Default::default()
        };
        assert_eq!(store.count(&t, &has).await.unwrap(), 3);
        let matched = Filter {
            conditions: Condition::parse_all(&json!({"op": "match", "lhs": "id", "rhs": "^[ab]$"})).unwrap(),
            ..Default::default()
        };
        assert_eq!(store.count(&t, &matched).await.unwrap(), 2);
    }
}
