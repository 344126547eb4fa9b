//! PostgREST-dialect HTTP adapter.
//!
//! Speaks the REST surface the original deployment exposes: column
//! filters as `col=eq.value` query parameters, upserts via
//! `Prefer: resolution=merge-duplicates`, and an api key sent both as the
//! `apikey` header and as a bearer token.
//!
//! The adapter covers the request/response half of the store contract.
//! Change notifications arrive over whatever subscription transport the
//! embedder runs; it feeds decoded payloads in through [`RestStore::ingest_change`].

use std::time::Duration;

use async_trait::async_trait;
use divvy_engine::Row;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tokio::sync::broadcast;

use super::{ChangeEvent, Order, TabularStore};
use crate::error::StoreError;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CHANGE_BUFFER: usize = 64;

/// Postgres error code for "column does not exist", surfaced by PostgREST
/// in error bodies. Probing keys off it.
const UNDEFINED_COLUMN: &str = "42703";

/// HTTP client for a PostgREST-style remote store.
pub struct RestStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    changes_tx: broadcast::Sender<ChangeEvent>,
}

impl RestStore {
    /// Create a client for the given REST endpoint.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let (changes_tx, _) = broadcast::channel(CHANGE_BUFFER);

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            changes_tx,
        })
    }

    /// Feed a change event decoded from the subscription transport into
    /// the store's change stream (see [`ChangeEvent::from_realtime`]).
    pub fn ingest_change(&self, event: ChangeEvent) {
        let _ = self.changes_tx.send(event);
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(StoreError::Http {
            status: status.as_u16(),
            detail,
        })
    }

    async fn rows_from(response: Response) -> Result<Vec<Row>, StoreError> {
        response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl TabularStore for RestStore {
    async fn probe_column(&self, table: &str, column: &str) -> Result<(), StoreError> {
        let response = self
            .request(Method::GET, table)
            .query(&[("select", column), ("limit", "1")])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && detail.contains(UNDEFINED_COLUMN) {
            Err(StoreError::ColumnMissing {
                table: table.to_string(),
                column: column.to_string(),
            })
        } else if status == StatusCode::NOT_FOUND {
            Err(StoreError::TableMissing(table.to_string()))
        } else {
            Err(StoreError::Http {
                status: status.as_u16(),
                detail,
            })
        }
    }

    async fn select_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> Result<Option<Row>, StoreError> {
        let filter = format!("eq.{key}");
        let response = self
            .request(Method::GET, table)
            .query(&[("select", "*"), (key_column, filter.as_str()), ("limit", "1")])
            .send()
            .await?;
        let rows = Self::rows_from(Self::check(response).await?).await?;
        Ok(rows.into_iter().next())
    }

    async fn select_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
        order: Option<Order>,
    ) -> Result<Vec<Row>, StoreError> {
        let filter = format!("eq.{value}");
        let mut request = self
            .request(Method::GET, table)
            .query(&[("select", "*"), (column, filter.as_str())]);
        if let Some(order) = order {
            let direction = if order.descending { "desc" } else { "asc" };
            request = request.query(&[("order", format!("{}.{direction}", order.column))]);
        }

        let response = request.send().await?;
        Self::rows_from(Self::check(response).await?).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(&[row])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, table)
            .query(&[("on_conflict", key_column)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        changes: Row,
    ) -> Result<(), StoreError> {
        let filter = format!("eq.{key}");
        let response = self
            .request(Method::PATCH, table)
            .query(&[(key_column, filter.as_str())])
            .header("Prefer", "return=minimal")
            .json(&changes)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_eq(&self, table: &str, column: &str, value: &str) -> Result<u64, StoreError> {
        let filter = format!("eq.{value}");
        let response = self
            .request(Method::DELETE, table)
            .query(&[(column, filter.as_str())])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows = Self::rows_from(Self::check(response).await?).await?;
        Ok(rows.len() as u64)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChangeKind;

    #[test]
    fn base_url_is_normalized() {
        let store = RestStore::new("https://example.test/rest/v1/", "key").unwrap();
        assert_eq!(store.base_url, "https://example.test/rest/v1");
    }

    #[tokio::test]
    async fn ingested_changes_reach_subscribers() {
        let store = RestStore::new("https://example.test/rest/v1", "key").unwrap();
        let mut rx = store.changes();

        store.ingest_change(ChangeEvent {
            table: "groups".into(),
            kind: ChangeKind::Update,
            new: None,
            old: None,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, "groups");
    }
}
