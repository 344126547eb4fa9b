//! The sync orchestrator.
//!
//! Owns the "no concurrent sync" invariant and the offline delete queue,
//! and is the only component that reconciles the local cache with the
//! remote store. Within one push, groups and their expenses go out
//! strictly sequentially with a pacing delay between groups; conflicts
//! resolve last-write-wins with no version vector.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use divvy_engine::{Error as EngineError, Group};
use tokio::task::JoinHandle;

use crate::cache::{DeleteQueue, EntityKind, LocalCache};
use crate::connectivity::Connectivity;
use crate::error::{Result, SyncError};
use crate::remote::RemoteStore;
use crate::store::TabularStore;
use crate::ui::{Severity, UiBridge};

/// Outcome of a `push_all` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Every group and expense was pushed.
    Completed { groups: usize, expenses: usize },
    /// Another sync is in flight; nothing was pushed.
    AlreadySyncing,
    /// A documented no-op: the preconditions for syncing were not met.
    Skipped(SkipReason),
}

/// Why a `push_all` call was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    NoRemote,
    NoUser,
}

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The remote delete succeeded.
    Deleted,
    /// Offline: the delete was queued for replay on reconnect.
    Queued,
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            cap: Duration::from_secs(300),
        }
    }
}

impl Backoff {
    /// Delay before the next attempt: base doubling per failure, capped.
    fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(8);
        let scaled = self.base.saturating_mul(2u32.saturating_pow(exp));
        scaled.min(self.cap)
    }
}

/// Orchestrates full-state sync between the local cache and the remote.
pub struct SyncEngine<S> {
    remote: Option<Arc<RemoteStore<S>>>,
    cache: LocalCache,
    queue: DeleteQueue,
    connectivity: Arc<Connectivity>,
    ui: Arc<dyn UiBridge>,
    syncing: AtomicBool,
    pacing: Duration,
    backoff: Backoff,
}

impl<S: TabularStore> SyncEngine<S> {
    /// Create an engine. `remote` is `None` when no remote store is
    /// configured, which turns every push into a documented no-op.
    pub fn new(
        remote: Option<Arc<RemoteStore<S>>>,
        cache: LocalCache,
        queue: DeleteQueue,
        connectivity: Arc<Connectivity>,
        ui: Arc<dyn UiBridge>,
    ) -> Self {
        Self {
            remote,
            cache,
            queue,
            connectivity,
            ui,
            syncing: AtomicBool::new(false),
            pacing: Duration::from_millis(200),
            backoff: Backoff::default(),
        }
    }

    /// Override the inter-group pacing delay.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Override the reconnect backoff parameters.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn delete_queue(&self) -> &DeleteQueue {
        &self.queue
    }

    pub fn connectivity(&self) -> &Arc<Connectivity> {
        &self.connectivity
    }

    pub fn ui(&self) -> &Arc<dyn UiBridge> {
        &self.ui
    }

    pub fn remote(&self) -> Option<&Arc<RemoteStore<S>>> {
        self.remote.as_ref()
    }

    /// Whether a push is currently in flight.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// When the last full push completed, if ever.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.cache.last_sync_time()
    }

    /// Push the current user, then every local group and its expenses, to
    /// the remote store.
    ///
    /// Only one push may run at a time: a competing call gets
    /// `AlreadySyncing` immediately instead of queueing. Offline, no
    /// remote, or no claimed identity are no-ops, not errors. A failed
    /// upsert aborts the rest of the push and surfaces the error; the
    /// next push re-upserts everything idempotently.
    pub async fn push_all(&self) -> Result<PushOutcome> {
        let Some(remote) = self.remote.as_ref() else {
            tracing::debug!("skipping sync: no remote store configured");
            return Ok(PushOutcome::Skipped(SkipReason::NoRemote));
        };
        if !self.connectivity.is_online() {
            tracing::debug!("skipping sync: offline");
            return Ok(PushOutcome::Skipped(SkipReason::Offline));
        }
        let Some(user) = self.cache.current_user() else {
            tracing::debug!("skipping sync: no current user");
            return Ok(PushOutcome::Skipped(SkipReason::NoUser));
        };

        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("sync already in progress, rejecting concurrent push");
            return Ok(PushOutcome::AlreadySyncing);
        }

        let result = self.push_all_inner(remote, &user).await;
        self.syncing.store(false, Ordering::SeqCst);

        match &result {
            Ok(PushOutcome::Completed { groups, expenses }) => {
                tracing::info!(groups, expenses, "full sync complete");
                self.ui
                    .notify("All data synced to cloud", Severity::Success);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "full sync failed");
                self.ui
                    .notify(&format!("Sync failed: {e}"), Severity::Error);
            }
        }
        result
    }

    async fn push_all_inner(
        &self,
        remote: &Arc<RemoteStore<S>>,
        user: &divvy_engine::User,
    ) -> Result<PushOutcome> {
        remote.mapper().resolve().await;
        remote.upsert_user(user).await?;

        let groups = self.cache.load();
        let mut expenses = 0usize;
        for (index, group) in groups.iter().enumerate() {
            tracing::debug!(group = %group.id, "pushing group");
            remote.upsert_group(group, &user.id).await?;
            for expense in &group.expenses {
                remote.upsert_expense(expense, &group.id).await?;
                expenses += 1;
            }
            if index + 1 < groups.len() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        self.cache.set_last_sync_time(Utc::now());
        Ok(PushOutcome::Completed {
            groups: groups.len(),
            expenses,
        })
    }

    /// Fetch one group from the remote store and overwrite the local copy.
    ///
    /// The overwrite is total: local-only edits to that group that were
    /// never pushed are lost (last-write-wins).
    pub async fn pull_group(&self, group_id: &str) -> Result<Option<Group>> {
        let remote = self.require_remote()?;
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }

        let fetched = remote.fetch_group(group_id).await?;
        if let Some(group) = &fetched {
            self.cache.upsert_group(group.clone());
            tracing::debug!(group = group_id, "local copy overwritten from remote");
        }
        Ok(fetched)
    }

    /// Re-fetch one group but graft only its expense list and total onto
    /// the cached copy, preserving the other locally-loaded fields. Used
    /// when a realtime expense change arrives for the open group.
    pub async fn refresh_group_expenses(&self, group_id: &str) -> Result<Option<Group>> {
        let remote = self.require_remote()?;
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }

        let Some(fetched) = remote.fetch_group(group_id).await? else {
            return Ok(None);
        };

        let merged = match self.cache.get_group(group_id) {
            Some(mut local) => {
                local.graft_expenses(fetched.expenses);
                local
            }
            None => fetched,
        };
        self.cache.upsert_group(merged.clone());
        Ok(Some(merged))
    }

    /// Delete an expense remotely, or queue the delete while offline.
    ///
    /// Removing the expense from the local cache is the caller's separate
    /// responsibility (optimistic removal). Remote failures propagate;
    /// retries happen only via queue replay on reconnect.
    pub async fn delete_expense(&self, expense_id: &str) -> Result<DeleteOutcome> {
        if expense_id.is_empty() {
            return Err(EngineError::MissingId("expense").into());
        }
        if !self.connectivity.is_online() {
            self.queue
                .enqueue(EntityKind::Expense, expense_id, Utc::now());
            return Ok(DeleteOutcome::Queued);
        }

        let remote = self.require_remote()?;
        remote.delete_expense(expense_id).await?;
        // Defensive cleanup even if this delete was never queued.
        self.queue.dequeue(EntityKind::Expense, expense_id);
        Ok(DeleteOutcome::Deleted)
    }

    /// Delete a group remotely, or queue the delete while offline.
    pub async fn delete_group(&self, group_id: &str) -> Result<DeleteOutcome> {
        if group_id.is_empty() {
            return Err(EngineError::MissingId("group").into());
        }
        if !self.connectivity.is_online() {
            self.queue.enqueue(EntityKind::Group, group_id, Utc::now());
            return Ok(DeleteOutcome::Queued);
        }

        let remote = self.require_remote()?;
        remote.delete_group(group_id).await?;
        self.queue.dequeue(EntityKind::Group, group_id);
        Ok(DeleteOutcome::Deleted)
    }

    /// Join a user to a group (idempotent). See [`RemoteStore::add_member`].
    pub async fn add_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        let remote = self.require_remote()?;
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }
        remote.add_member(group_id, user_id).await
    }

    /// Replay queued deletes against the remote store, oldest first.
    ///
    /// Stops at the first failure, leaving that entry and the rest queued
    /// for the next attempt. Returns how many entries were replayed.
    pub async fn replay_pending_deletes(&self) -> Result<usize> {
        let Some(remote) = self.remote.as_ref() else {
            return Ok(0);
        };

        let pending = self.queue.drain();
        if pending.is_empty() {
            return Ok(0);
        }
        tracing::info!(count = pending.len(), "replaying queued deletes");

        let mut replayed = 0;
        for entry in pending {
            let result = match entry.entity {
                EntityKind::Group => remote.delete_group(&entry.id).await,
                EntityKind::Expense => remote.delete_expense(&entry.id).await,
            };
            match result {
                Ok(()) => {
                    self.queue.dequeue(entry.entity, &entry.id);
                    replayed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        entity = ?entry.entity,
                        id = %entry.id,
                        error = %e,
                        "delete replay failed, entry stays queued"
                    );
                    return Err(e);
                }
            }
        }
        Ok(replayed)
    }

    fn require_remote(&self) -> std::result::Result<&Arc<RemoteStore<S>>, SyncError> {
        self.remote.as_ref().ok_or(SyncError::NotConfigured)
    }
}

impl<S: TabularStore + 'static> SyncEngine<S> {
    /// Spawn the reconnect task: on every offline→online transition it
    /// replays queued deletes and runs a full push, retrying with bounded
    /// exponential backoff while the connection holds.
    pub fn spawn_reconnect_task(self: Arc<Self>) -> JoinHandle<()> {
        let engine = self;
        let mut watch = engine.connectivity.watch();

        tokio::spawn(async move {
            let mut was_online = *watch.borrow();
            loop {
                if watch.changed().await.is_err() {
                    break; // connectivity handle dropped
                }
                let online = *watch.borrow_and_update();
                if online && !was_online {
                    tracing::info!("back online, resyncing");
                    engine.resync_with_backoff().await;
                }
                was_online = online;
            }
        })
    }

    async fn resync_with_backoff(&self) {
        let mut failures = 0u32;
        loop {
            if !self.connectivity.is_online() {
                return; // went offline again; the next transition retries
            }

            let result = async {
                self.replay_pending_deletes().await?;
                self.push_all().await
            }
            .await;

            match result {
                Ok(_) => return,
                Err(e) => {
                    failures += 1;
                    let delay = self.backoff.delay(failures);
                    tracing::warn!(
                        error = %e,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "resync failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
