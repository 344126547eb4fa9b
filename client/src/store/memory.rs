//! In-process tabular store.
//!
//! Backs tests and demos: real probe semantics (a configurable physical
//! column set per table) and a change feed fed by its own mutations, so
//! the full sync + realtime path runs without a network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use divvy_engine::Row;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{ChangeEvent, ChangeKind, Order, TabularStore};
use crate::error::StoreError;

const CHANGE_BUFFER: usize = 64;

/// In-memory `TabularStore` with configurable columns and a broadcast
/// change feed.
pub struct MemoryStore {
    tables: DashMap<String, HashMap<String, Row>>,
    columns: DashMap<String, HashSet<String>>,
    reachable: AtomicBool,
    changes_tx: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    /// Create a store exposing the default snake_case columns for the
    /// users/groups/expenses tables.
    pub fn new() -> Self {
        let store = Self::empty();
        store.set_columns(
            "users",
            &["id", "name", "created_at", "updated_at"],
        );
        store.set_columns(
            "groups",
            &[
                "id",
                "name",
                "created_by",
                "updated_by",
                "members",
                "participants",
                "total_expenses",
                "expense_count",
                "created_at",
                "updated_at",
            ],
        );
        store.set_columns(
            "expenses",
            &[
                "id",
                "group_id",
                "description",
                "amount",
                "paid_by",
                "split_between",
                "created_by",
                "created_at",
                "updated_at",
                "per_person_amount",
            ],
        );
        store
    }

    /// Create a store with no tables at all.
    pub fn empty() -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            tables: DashMap::new(),
            columns: DashMap::new(),
            reachable: AtomicBool::new(true),
            changes_tx,
        }
    }

    /// Declare which physical columns a table exposes (replacing any
    /// previous declaration). Probes consult this set.
    pub fn set_columns(&self, table: &str, columns: &[&str]) {
        self.columns.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self.tables.entry(table.to_string()).or_default();
    }

    /// Simulate the remote becoming (un)reachable; while unreachable every
    /// operation fails with `StoreError::Unreachable`.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of rows currently in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.len()).unwrap_or(0)
    }

    /// Fetch a row directly, bypassing reachability. Test convenience.
    pub fn raw_row(&self, table: &str, key_column: &str, key: &str) -> Option<Row> {
        self.tables.get(table).and_then(|rows| {
            rows.values()
                .find(|row| row.get(key_column).and_then(Value::as_str) == Some(key))
                .cloned()
        })
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unreachable("memory store offline".into()))
        }
    }

    fn key_of(row: &Row, key_column: &str) -> Result<String, StoreError> {
        row.get(key_column)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                StoreError::Malformed(format!("row has no string key '{key_column}'"))
            })
    }

    fn emit(&self, table: &str, kind: ChangeKind, new: Option<Row>, old: Option<Row>) {
        // No subscribers is fine; the send result only says whether anyone
        // was listening.
        let _ = self.changes_tx.send(ChangeEvent {
            table: table.to_string(),
            kind,
            new,
            old,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn probe_column(&self, table: &str, column: &str) -> Result<(), StoreError> {
        self.check_reachable()?;
        let columns = self
            .columns
            .get(table)
            .ok_or_else(|| StoreError::TableMissing(table.to_string()))?;
        if columns.contains(column) {
            Ok(())
        } else {
            Err(StoreError::ColumnMissing {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }

    async fn select_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<Row>, StoreError> {
        self.check_reachable()?;
        Ok(self.raw_row(table, key_column, key))
    }

    async fn select_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
        order: Option<Order>,
    ) -> Result<Vec<Row>, StoreError> {
        self.check_reachable()?;
        let Some(rows) = self.tables.get(table) else {
            return Err(StoreError::TableMissing(table.to_string()));
        };
        let mut matched: Vec<Row> = rows
            .values()
            .filter(|row| row.get(column).and_then(Value::as_str) == Some(value))
            .cloned()
            .collect();
        drop(rows);

        if let Some(order) = order {
            matched.sort_by(|a, b| {
                let a = a.get(&order.column).map(Value::to_string).unwrap_or_default();
                let b = b.get(&order.column).map(Value::to_string).unwrap_or_default();
                if order.descending {
                    b.cmp(&a)
                } else {
                    a.cmp(&b)
                }
            });
        }
        Ok(matched)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        self.check_reachable()?;
        let key = Self::key_of(&row, "id")?;
        let mut rows = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableMissing(table.to_string()))?;
        if rows.contains_key(&key) {
            return Err(StoreError::Http {
                status: 409,
                detail: format!("duplicate key '{key}'"),
            });
        }
        rows.insert(key, row.clone());
        drop(rows);
        self.emit(table, ChangeKind::Insert, Some(row), None);
        Ok(())
    }

    async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<(), StoreError> {
        self.check_reachable()?;
        let key = Self::key_of(&row, key_column)?;
        let mut rows = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableMissing(table.to_string()))?;
        let old = rows.insert(key, row.clone());
        drop(rows);

        let kind = if old.is_some() {
            ChangeKind::Update
        } else {
            ChangeKind::Insert
        };
        self.emit(table, kind, Some(row), old);
        Ok(())
    }

    async fn update_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        changes: Row,
    ) -> Result<(), StoreError> {
        self.check_reachable()?;
        let mut rows = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableMissing(table.to_string()))?;
        let Some(row) = rows.values_mut().find(|row| {
            row.get(key_column).and_then(Value::as_str) == Some(key)
        }) else {
            return Ok(()); // no matching row affects nothing
        };

        let old = row.clone();
        for (column, value) in changes {
            row.insert(column, value);
        }
        let new = row.clone();
        drop(rows);
        self.emit(table, ChangeKind::Update, Some(new), Some(old));
        Ok(())
    }

    async fn delete_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<u64, StoreError> {
        self.check_reachable()?;
        let mut rows = self
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableMissing(table.to_string()))?;
        let doomed: Vec<String> = rows
            .iter()
            .filter(|(_, row)| row.get(column).and_then(Value::as_str) == Some(value))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for key in doomed {
            if let Some(old) = rows.remove(&key) {
                removed.push(old);
            }
        }
        drop(rows);

        let count = removed.len() as u64;
        for old in removed {
            self.emit(table, ChangeKind::Delete, None, Some(old));
        }
        Ok(count)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes_tx.subscribe()
    }
}
