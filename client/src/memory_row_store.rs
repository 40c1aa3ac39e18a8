use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use board::StoreError;

use crate::row_store::{Filter, Order, Row, RowStore};

/// In-memory row store. Tables are created on first touch; each row keeps the
/// sequence number it was inserted under, which breaks ordering ties so a
/// listing is deterministic even for equal column values.
#[derive(Default)]
pub struct MemoryRowStore {
    tables: Mutex<HashMap<String, Table>>,
}

#[derive(Default)]
struct Table {
    next_seq: u64,
    rows: Vec<StoredRow>,
}

struct StoredRow {
    seq: u64,
    row: Row,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn value_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn list(
        &self,
        table: &str,
        filter: Option<&Filter>,
        order: Option<&Order>,
    ) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.lock().expect("store state poisoned");
        let mut matches: Vec<(u64, Row)> = tables
            .get(table)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter(|stored| match filter {
                Some(filter) => stored.row.get(&filter.column) == Some(&filter.value),
                None => true,
            })
            .map(|stored| (stored.seq, stored.row.clone()))
            .collect();

        match order {
            Some(order) => matches.sort_by(|(seq_a, row_a), (seq_b, row_b)| {
                let a = row_a.get(&order.column).unwrap_or(&Value::Null);
                let b = row_b.get(&order.column).unwrap_or(&Value::Null);
                let by_column = if order.ascending {
                    value_cmp(a, b)
                } else {
                    value_cmp(b, a)
                };
                by_column.then(seq_a.cmp(seq_b))
            }),
            None => matches.sort_by_key(|(seq, _)| *seq),
        }

        Ok(matches.into_iter().map(|(_, row)| row).collect())
    }

    async fn get_by_id(&self, table: &str, id: &str) -> Result<Row, StoreError> {
        let tables = self.tables.lock().expect("store state poisoned");
        tables
            .get(table)
            .and_then(|t| t.rows.iter().find(|stored| row_id(&stored.row) == Some(id)))
            .map(|stored| stored.row.clone())
            .ok_or_else(|| StoreError::not_found(table, id))
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let id = match row_id(&row) {
            Some(id) => id.to_string(),
            None => return Err(StoreError::persistence(table, "row has no id column")),
        };
        let mut tables = self.tables.lock().expect("store state poisoned");
        let t = tables.entry(table.to_string()).or_insert_with(Table::default);
        if t.rows.iter().any(|stored| row_id(&stored.row) == Some(&*id)) {
            return Err(StoreError::persistence(
                table,
                format!("duplicate id {}", id),
            ));
        }
        let seq = t.next_seq;
        t.next_seq += 1;
        t.rows.push(StoredRow {
            seq,
            row: row.clone(),
        });
        Ok(row)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> Result<Row, StoreError> {
        let mut tables = self.tables.lock().expect("store state poisoned");
        let stored = tables
            .get_mut(table)
            .and_then(|t| {
                t.rows
                    .iter_mut()
                    .find(|stored| row_id(&stored.row) == Some(id))
            })
            .ok_or_else(|| StoreError::not_found(table, id))?;
        for (column, value) in patch {
            stored.row.insert(column, value);
        }
        Ok(stored.row.clone())
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().expect("store state poisoned");
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::not_found(table, id))?;
        let before = t.rows.len();
        t.rows.retain(|stored| row_id(&stored.row) != Some(id));
        if t.rows.len() == before {
            Err(StoreError::not_found(table, id))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, extra: &[(&str, Value)]) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::String(id.into()));
        for (column, value) in extra {
            row.insert((*column).into(), value.clone());
        }
        row
    }

    #[tokio::test]
    async fn it_round_trips_a_row() {
        let store = MemoryRowStore::new();
        store
            .insert("sessions", row("a", &[("name", json!("first"))]))
            .await
            .expect("");
        let fetched = store.get_by_id("sessions", "a").await.expect("");
        assert_eq!(fetched.get("name"), Some(&json!("first")));
    }

    #[tokio::test]
    async fn it_rejects_duplicate_ids() {
        let store = MemoryRowStore::new();
        store.insert("sessions", row("a", &[])).await.expect("");
        let err = store.insert("sessions", row("a", &[])).await.unwrap_err();
        assert!(matches!(err, StoreError::Persistence { .. }));
    }

    #[tokio::test]
    async fn it_patches_only_named_columns() {
        let store = MemoryRowStore::new();
        store
            .insert(
                "sessions",
                row("a", &[("name", json!("first")), ("rank", json!(1))]),
            )
            .await
            .expect("");
        let updated = store
            .update("sessions", "a", row("a", &[("name", json!("second"))]))
            .await
            .expect("");
        assert_eq!(updated.get("name"), Some(&json!("second")));
        assert_eq!(updated.get("rank"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn it_reports_missing_rows() {
        let store = MemoryRowStore::new();
        store.insert("sessions", row("a", &[])).await.expect("");
        store.delete_by_id("sessions", "a").await.expect("");
        let err = store.get_by_id("sessions", "a").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        let err = store.delete_by_id("sessions", "a").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn it_filters_and_orders() {
        let store = MemoryRowStore::new();
        for (id, owner, rank) in &[("a", "u1", 3), ("b", "u2", 1), ("c", "u1", 2)] {
            store
                .insert(
                    "shapes",
                    row(id, &[("owner", json!(owner)), ("rank", json!(rank))]),
                )
                .await
                .expect("");
        }

        let mine = store
            .list(
                "shapes",
                Some(&Filter::eq("owner", "u1")),
                Some(&Order::asc("rank")),
            )
            .await
            .expect("");
        let ids: Vec<_> = mine.iter().filter_map(|r| row_id(r)).collect();
        assert_eq!(ids, vec!["c", "a"]);

        let all_desc = store
            .list("shapes", None, Some(&Order::desc("rank")))
            .await
            .expect("");
        let ids: Vec<_> = all_desc.iter().filter_map(|r| row_id(r)).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }
}
