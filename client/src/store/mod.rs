//! The remote tabular store abstraction.
//!
//! The sync engine assumes a generic tabular store reachable via
//! request/response calls plus a subscribe-to-changes stream; the wire
//! protocol behind that is not this crate's business. `MemoryStore`
//! backs tests and demos, `RestStore` speaks the PostgREST dialect.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use divvy_engine::Row;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::StoreError;

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification from the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Physical table the change happened on.
    pub table: String,
    pub kind: ChangeKind,
    /// Row image after the change (inserts and updates).
    pub new: Option<Row>,
    /// Row image before the change (updates and deletes).
    pub old: Option<Row>,
}

impl ChangeEvent {
    /// Whichever row image is available, preferring the new one.
    pub fn row(&self) -> Option<&Row> {
        self.new.as_ref().or(self.old.as_ref())
    }

    /// Decode a realtime change payload as delivered by the remote
    /// store's subscription transport: an object carrying `eventType`,
    /// `table`, and the `new`/`old` row images.
    pub fn from_realtime(payload: &serde_json::Value) -> Result<Self, StoreError> {
        #[derive(Deserialize)]
        struct Payload {
            #[serde(rename = "eventType")]
            event_type: ChangeKind,
            table: String,
            #[serde(default)]
            new: Option<Row>,
            #[serde(default)]
            old: Option<Row>,
        }

        let payload: Payload = serde_json::from_value(payload.clone())
            .map_err(|e| StoreError::Malformed(format!("realtime payload: {e}")))?;
        Ok(Self {
            table: payload.table,
            kind: payload.event_type,
            new: payload.new,
            old: payload.old,
        })
    }
}

/// Result ordering for `select_eq`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    /// Descending order on a column.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Request/response operations against the remote tabular store, plus the
/// change-notification stream.
///
/// Every operation takes physical table and column names; the schema-aware
/// layer above (`RemoteStore`) resolves logical names first.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Minimal existence probe: select one row restricted to `column`.
    /// Returns `StoreError::ColumnMissing` when the column does not exist.
    async fn probe_column(&self, table: &str, column: &str) -> Result<(), StoreError>;

    /// Fetch the single row whose `key_column` equals `key`.
    async fn select_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<Row>, StoreError>;

    /// Fetch all rows whose `column` equals `value`, optionally ordered.
    async fn select_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
        order: Option<Order>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Insert a new row. Fails if the key already exists.
    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError>;

    /// Insert or fully overwrite the row identified by `key_column`.
    async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<(), StoreError>;

    /// Merge `changes` into the row whose `key_column` equals `key`.
    /// Updating a missing row affects nothing and is not an error.
    async fn update_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        changes: Row,
    ) -> Result<(), StoreError>;

    /// Delete all rows whose `column` equals `value`; returns how many.
    async fn delete_eq(&self, table: &str, column: &str, value: &str)
        -> Result<u64, StoreError>;

    /// Subscribe to row-level change notifications.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ChangeKind::Insert).unwrap(),
            r#""INSERT""#
        );
        let kind: ChangeKind = serde_json::from_str(r#""DELETE""#).unwrap();
        assert_eq!(kind, ChangeKind::Delete);
    }

    #[test]
    fn event_row_prefers_new() {
        let mut new = Row::new();
        new.insert("id".into(), serde_json::json!("n"));
        let mut old = Row::new();
        old.insert("id".into(), serde_json::json!("o"));

        let event = ChangeEvent {
            table: "groups".into(),
            kind: ChangeKind::Update,
            new: Some(new),
            old: Some(old.clone()),
        };
        assert_eq!(event.row().unwrap()["id"], "n");

        let delete = ChangeEvent {
            table: "groups".into(),
            kind: ChangeKind::Delete,
            new: None,
            old: Some(old),
        };
        assert_eq!(delete.row().unwrap()["id"], "o");
    }

    #[test]
    fn realtime_payload_decodes() {
        let payload = serde_json::json!({
            "eventType": "UPDATE",
            "schema": "public",
            "table": "expenses",
            "new": {"id": "e1", "amount": 150},
            "old": {"id": "e1", "amount": 100},
        });

        let event = ChangeEvent::from_realtime(&payload).unwrap();
        assert_eq!(event.table, "expenses");
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.new.unwrap()["amount"], 150);

        let garbage = serde_json::json!({"table": "expenses"});
        assert!(ChangeEvent::from_realtime(&garbage).is_err());
    }
}
