//! Durable local cache and the offline delete queue.
//!
//! The cache is the single source of truth for rendering: groups (with
//! their expenses), the current user, and the last sync time. The remote
//! store stays the source of truth for cross-client consistency; only the
//! sync engine reconciles the two.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use divvy_engine::{Group, User};
use serde::{Deserialize, Serialize};

use crate::storage::Storage;

const GROUPS_KEY: &str = "groups";
const USER_KEY: &str = "current_user";
const DELETE_QUEUE_KEY: &str = "delete_queue";
const LAST_SYNC_KEY: &str = "last_sync_time";

/// Process-local durable store of group aggregates and identity.
///
/// All operations are synchronous and never raise: corrupted data reads
/// as empty, and a failed write leaves the prior state intact.
#[derive(Clone)]
pub struct LocalCache {
    storage: Arc<dyn Storage>,
}

impl LocalCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load all groups. Missing or corrupted state reads as empty.
    pub fn load(&self) -> Vec<Group> {
        let Some(raw) = self.storage.get(GROUPS_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(error = %e, "corrupted group cache, treating as empty");
                Vec::new()
            }
        }
    }

    /// Persist all groups, re-deriving totals and per-person shares first.
    /// Upstream callers may hand us stale derived fields.
    pub fn save(&self, groups: &mut [Group]) {
        for group in groups.iter_mut() {
            group.recompute_totals();
        }
        match serde_json::to_string(&groups) {
            Ok(json) => {
                self.storage.put(GROUPS_KEY, &json);
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize group cache"),
        }
    }

    /// Fetch one group by id.
    pub fn get_group(&self, group_id: &str) -> Option<Group> {
        self.load().into_iter().find(|g| g.id == group_id)
    }

    /// Insert or replace one group by id.
    pub fn upsert_group(&self, group: Group) {
        let mut groups = self.load();
        match groups.iter_mut().find(|g| g.id == group.id) {
            Some(slot) => *slot = group,
            None => groups.push(group),
        }
        self.save(&mut groups);
    }

    /// Drop one group by id, if present.
    pub fn remove_group(&self, group_id: &str) {
        let mut groups = self.load();
        groups.retain(|g| g.id != group_id);
        self.save(&mut groups);
    }

    /// The persisted identity, if one has been claimed.
    pub fn current_user(&self) -> Option<User> {
        let raw = self.storage.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "corrupted current user, treating as unset");
                None
            }
        }
    }

    /// Persist the identity separately from groups.
    pub fn set_current_user(&self, user: &User) {
        match serde_json::to_string(user) {
            Ok(json) => {
                self.storage.put(USER_KEY, &json);
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize current user"),
        }
    }

    /// When the last full push completed, if ever.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.storage.get(LAST_SYNC_KEY)?;
        DateTime::parse_from_rfc3339(raw.trim_matches('"'))
            .map(|t| t.with_timezone(&Utc))
            .ok()
    }

    pub fn set_last_sync_time(&self, at: DateTime<Utc>) {
        self.storage.put(LAST_SYNC_KEY, &at.to_rfc3339());
    }
}

/// What kind of entity a pending delete refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Group,
    Expense,
}

/// A deletion recorded while offline, to be replayed on reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDelete {
    pub entity: EntityKind,
    pub id: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Durable queue of deletes attempted while offline.
#[derive(Clone)]
pub struct DeleteQueue {
    storage: Arc<dyn Storage>,
}

impl DeleteQueue {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn read(&self) -> Vec<PendingDelete> {
        let Some(raw) = self.storage.get(DELETE_QUEUE_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "corrupted delete queue, treating as empty");
                Vec::new()
            }
        }
    }

    fn write(&self, entries: &[PendingDelete]) {
        match serde_json::to_string(entries) {
            Ok(json) => {
                self.storage.put(DELETE_QUEUE_KEY, &json);
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize delete queue"),
        }
    }

    /// Record a pending delete. Duplicate (entity, id) pairs are a no-op;
    /// returns whether a new entry was added.
    pub fn enqueue(&self, entity: EntityKind, id: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.read();
        if entries.iter().any(|p| p.entity == entity && p.id == id) {
            return false;
        }
        entries.push(PendingDelete {
            entity,
            id: id.to_string(),
            enqueued_at: now,
        });
        self.write(&entries);
        tracing::info!(?entity, id, "queued delete for replay");
        true
    }

    /// Remove a pending entry once its remote delete succeeded.
    pub fn dequeue(&self, entity: EntityKind, id: &str) {
        let mut entries = self.read();
        let before = entries.len();
        entries.retain(|p| !(p.entity == entity && p.id == id));
        if entries.len() != before {
            self.write(&entries);
        }
    }

    /// Snapshot of the pending deletes, oldest first. Entries leave the
    /// queue individually via `dequeue` as their remote deletes succeed.
    pub fn drain(&self) -> Vec<PendingDelete> {
        self.read()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
