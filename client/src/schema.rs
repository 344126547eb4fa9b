//! Runtime discovery of the remote store's column naming.
//!
//! For each ambiguous logical field the mapper issues minimal existence
//! probes, candidate by candidate, and the first one the store confirms
//! wins. Discovery happens once per process: concurrent first callers are
//! deduplicated onto a single in-flight probe round, and afterwards
//! `resolve` returns the memoized mapping instantly. Probe failures are
//! never fatal — unconfirmed fields keep the snake_case defaults.

use std::sync::Arc;

use divvy_engine::{ProbeField, SchemaMapping};
use futures::future::join_all;
use tokio::sync::OnceCell;

use crate::store::TabularStore;

/// Resolves and memoizes the [`SchemaMapping`] for one remote store.
pub struct SchemaMapper<S> {
    store: Arc<S>,
    resolved: OnceCell<SchemaMapping>,
}

impl<S: TabularStore> SchemaMapper<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            resolved: OnceCell::new(),
        }
    }

    /// The resolved mapping, probing the remote store on first call.
    ///
    /// Safe to call concurrently: callers overlapping a discovery await
    /// the same in-flight result instead of re-probing.
    pub async fn resolve(&self) -> &SchemaMapping {
        self.resolved
            .get_or_init(|| Self::discover(Arc::clone(&self.store)))
            .await
    }

    /// Whether discovery has already completed.
    pub fn is_resolved(&self) -> bool {
        self.resolved.initialized()
    }

    async fn discover(store: Arc<S>) -> SchemaMapping {
        tracing::info!("detecting remote schema");
        let mut mapping = SchemaMapping::default();

        // Fields probe concurrently; candidates within a field go in
        // order so the first confirmed spelling wins deterministically.
        let probes = ProbeField::ALL.map(|field| {
            let store = Arc::clone(&store);
            async move { (field, confirm_field(&*store, field).await) }
        });

        for (field, confirmed) in join_all(probes).await {
            match confirmed {
                Some(column) => {
                    tracing::debug!(table = %field.table(), column, "schema column confirmed");
                    field.apply(&mut mapping, column);
                }
                None => {
                    tracing::debug!(
                        table = %field.table(),
                        ?field,
                        "no candidate confirmed, keeping default"
                    );
                }
            }
        }

        tracing::info!("remote schema detection complete");
        mapping
    }
}

async fn confirm_field<S: TabularStore>(store: &S, field: ProbeField) -> Option<&'static str> {
    for &candidate in field.candidates() {
        match store.probe_column(field.table().name(), candidate).await {
            Ok(()) => return Some(candidate),
            Err(e) if e.is_column_missing() => continue,
            Err(e) => {
                // Best effort: one failed probe must not abort the rest.
                tracing::warn!(
                    table = %field.table(),
                    candidate,
                    error = %e,
                    "schema probe failed"
                );
                continue;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{ChangeEvent, MemoryStore, Order, TabularStore};
    use async_trait::async_trait;
    use divvy_engine::Row;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    /// Delegating store that counts probe calls.
    struct CountingStore {
        inner: MemoryStore,
        probes: AtomicUsize,
    }

    impl CountingStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                probes: AtomicUsize::new(0),
            }
        }

        fn probe_count(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TabularStore for CountingStore {
        async fn probe_column(&self, table: &str, column: &str) -> Result<(), StoreError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.inner.probe_column(table, column).await
        }

        async fn select_by_key(
            &self,
            table: &str,
            key_column: &str,
            key: &str,
        ) -> Result<Option<Row>, StoreError> {
            self.inner.select_by_key(table, key_column, key).await
        }

        async fn select_eq(
            &self,
            table: &str,
            column: &str,
            value: &str,
            order: Option<Order>,
        ) -> Result<Vec<Row>, StoreError> {
            self.inner.select_eq(table, column, value, order).await
        }

        async fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
            self.inner.insert(table, row).await
        }

        async fn upsert(&self, table: &str, key_column: &str, row: Row) -> Result<(), StoreError> {
            self.inner.upsert(table, key_column, row).await
        }

        async fn update_by_key(
            &self,
            table: &str,
            key_column: &str,
            key: &str,
            changes: Row,
        ) -> Result<(), StoreError> {
            self.inner.update_by_key(table, key_column, key, changes).await
        }

        async fn delete_eq(
            &self,
            table: &str,
            column: &str,
            value: &str,
        ) -> Result<u64, StoreError> {
            self.inner.delete_eq(table, column, value).await
        }

        fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
            self.inner.changes()
        }
    }

    #[tokio::test]
    async fn snake_case_store_confirms_defaults() {
        let mapper = SchemaMapper::new(Arc::new(MemoryStore::new()));
        let mapping = mapper.resolve().await;

        assert_eq!(mapping.groups.created_by, "created_by");
        assert_eq!(mapping.expenses.group_id, "group_id");
        assert!(mapper.is_resolved());
    }

    #[tokio::test]
    async fn compact_columns_are_discovered() {
        let store = MemoryStore::empty();
        store.set_columns("users", &["id", "name", "createdat", "updatedat"]);
        store.set_columns("groups", &["id", "name", "createdby", "createdat", "members"]);
        store.set_columns("expenses", &["id", "groupid", "paidby", "amount"]);

        let mapper = SchemaMapper::new(Arc::new(store));
        let mapping = mapper.resolve().await;

        assert_eq!(mapping.users.created_at, "createdat");
        assert_eq!(mapping.users.updated_at, "updatedat");
        assert_eq!(mapping.groups.created_by, "createdby");
        assert_eq!(mapping.groups.created_at, "createdat");
        assert_eq!(mapping.expenses.group_id, "groupid");
        assert_eq!(mapping.expenses.paid_by, "paidby");
    }

    #[tokio::test]
    async fn resolution_is_deterministic_and_never_reprobed() {
        let store = MemoryStore::empty();
        // created_by exists, createdby does not: the second candidate wins.
        store.set_columns("users", &["id", "created_at", "updated_at"]);
        store.set_columns("groups", &["id", "created_by", "created_at"]);
        store.set_columns("expenses", &["id", "group_id", "paid_by"]);

        let store = Arc::new(CountingStore::new(store));
        let mapper = SchemaMapper::new(Arc::clone(&store));

        let first = mapper.resolve().await.clone();
        assert_eq!(first.groups.created_by, "created_by");
        let probes_after_first = store.probe_count();
        assert!(probes_after_first > 0);

        // Second resolve answers from the memo, no further probes.
        let second = mapper.resolve().await.clone();
        assert_eq!(first, second);
        assert_eq!(store.probe_count(), probes_after_first);
    }

    #[tokio::test]
    async fn concurrent_resolvers_share_one_probe_round() {
        let store = Arc::new(CountingStore::new(MemoryStore::new()));
        let mapper = Arc::new(SchemaMapper::new(Arc::clone(&store)));

        let (a, b) = tokio::join!(
            {
                let mapper = Arc::clone(&mapper);
                async move { mapper.resolve().await.clone() }
            },
            {
                let mapper = Arc::clone(&mapper);
                async move { mapper.resolve().await.clone() }
            }
        );

        assert_eq!(a, b);
        // One probe per candidate at most: a second discovery would double it.
        let max_single_round: usize = ProbeField::ALL
            .iter()
            .map(|f| f.candidates().len())
            .sum();
        assert!(store.probe_count() <= max_single_round);
    }

    #[tokio::test]
    async fn unreachable_store_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.set_reachable(false);

        let mapper = SchemaMapper::new(Arc::new(store));
        let mapping = mapper.resolve().await;

        // Probing failed entirely; the defaults survive.
        assert_eq!(*mapping, SchemaMapping::default());
        assert!(mapper.is_resolved());
    }
}
