//! Schema-aware adapter over the remote tabular store.
//!
//! Every method resolves the column mapping first and then speaks
//! physical names only. Upserts are last-write-wins: `updated_at` is
//! stamped unconditionally and whatever remote state existed is
//! overwritten, with no version check.

use std::sync::Arc;

use chrono::Utc;
use divvy_engine::{
    assemble_group, expense_row, group_from_row, group_row, user_row, Error as EngineError,
    Expense, Group, User,
};
use serde_json::Value;

use crate::error::Result;
use crate::schema::SchemaMapper;
use crate::store::{Order, TabularStore};

/// The only component that talks to the remote store directly.
pub struct RemoteStore<S> {
    store: Arc<S>,
    mapper: SchemaMapper<S>,
}

impl<S: TabularStore> RemoteStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            mapper: SchemaMapper::new(Arc::clone(&store)),
            store,
        }
    }

    /// The underlying store (for subscribing to its change feed).
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The schema mapper, shared with anything that must read raw rows.
    pub fn mapper(&self) -> &SchemaMapper<S> {
        &self.mapper
    }

    /// Insert-or-overwrite the user row.
    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        let mapping = self.mapper.resolve().await;
        tracing::debug!(user = %user.id, "upserting user");
        let row = user_row(mapping, user, Utc::now());
        self.store
            .upsert("users", &mapping.users.id, row)
            .await
            .map_err(Into::into)
    }

    /// Insert-or-overwrite the group row (without its expenses).
    pub async fn upsert_group(&self, group: &Group, updated_by: &str) -> Result<()> {
        group.validate()?;
        let mapping = self.mapper.resolve().await;
        tracing::debug!(group = %group.id, "upserting group");
        let row = group_row(mapping, group, updated_by, Utc::now());
        self.store
            .upsert("groups", &mapping.groups.id, row)
            .await
            .map_err(Into::into)
    }

    /// Insert-or-overwrite one expense row under `group_id`.
    pub async fn upsert_expense(&self, expense: &Expense, group_id: &str) -> Result<()> {
        if group_id.is_empty() {
            return Err(EngineError::MissingId("group").into());
        }
        let mut expense = expense.clone();
        expense.group_id = group_id.to_string();
        expense.validate()?;

        let mapping = self.mapper.resolve().await;
        tracing::debug!(expense = %expense.id, group = group_id, "upserting expense");
        let row = expense_row(mapping, &expense, Utc::now());
        self.store
            .upsert("expenses", &mapping.expenses.id, row)
            .await
            .map_err(Into::into)
    }

    /// Fetch a complete group aggregate: the group row plus its expenses
    /// ordered newest first, with totals re-derived.
    ///
    /// Returns `None` when the group row does not exist. Any other
    /// failure — transport or malformed rows — is raised to the caller.
    pub async fn fetch_group(&self, group_id: &str) -> Result<Option<Group>> {
        if group_id.is_empty() {
            return Err(EngineError::MissingId("group").into());
        }
        let mapping = self.mapper.resolve().await;

        let Some(row) = self
            .store
            .select_by_key("groups", &mapping.groups.id, group_id)
            .await?
        else {
            tracing::warn!(group = group_id, "group not found remotely");
            return Ok(None);
        };

        let expense_rows = self
            .store
            .select_eq(
                "expenses",
                &mapping.expenses.group_id,
                group_id,
                Some(Order::desc(mapping.expenses.created_at.as_str())),
            )
            .await?;

        let group = assemble_group(mapping, &row, &expense_rows, Utc::now())?;
        tracing::debug!(
            group = group_id,
            expenses = group.expenses.len(),
            "group assembled"
        );
        Ok(Some(group))
    }

    /// Delete one expense row. Raises if the remote is unreachable.
    pub async fn delete_expense(&self, expense_id: &str) -> Result<()> {
        if expense_id.is_empty() {
            return Err(EngineError::MissingId("expense").into());
        }
        let mapping = self.mapper.resolve().await;
        let deleted = self
            .store
            .delete_eq("expenses", &mapping.expenses.id, expense_id)
            .await?;
        if deleted == 0 {
            tracing::warn!(expense = expense_id, "no expense rows deleted");
        }
        Ok(())
    }

    /// Delete a group row and its dependent expenses.
    ///
    /// Expenses go first, best-effort: if that sweep fails the group row
    /// is still deleted and the orphaned expense rows are accepted.
    pub async fn delete_group(&self, group_id: &str) -> Result<()> {
        if group_id.is_empty() {
            return Err(EngineError::MissingId("group").into());
        }
        let mapping = self.mapper.resolve().await;

        if let Err(e) = self
            .store
            .delete_eq("expenses", &mapping.expenses.group_id, group_id)
            .await
        {
            tracing::warn!(group = group_id, error = %e, "failed to delete group expenses");
        }

        self.store
            .delete_eq("groups", &mapping.groups.id, group_id)
            .await?;
        tracing::info!(group = group_id, "group deleted remotely");
        Ok(())
    }

    /// Add `user_id` to a group's membership, keeping the legacy
    /// `participants` column in step.
    ///
    /// Returns `Ok(true)` when the user joined or was already a member,
    /// `Ok(false)` when the group row does not exist.
    pub async fn add_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        if group_id.is_empty() {
            return Err(EngineError::MissingId("group").into());
        }
        if user_id.is_empty() {
            return Err(EngineError::MissingId("user").into());
        }
        let mapping = self.mapper.resolve().await;

        let Some(row) = self
            .store
            .select_by_key("groups", &mapping.groups.id, group_id)
            .await?
        else {
            tracing::warn!(group = group_id, "cannot join: group not found");
            return Ok(false);
        };

        let mut group = group_from_row(mapping, &row, Utc::now())?;
        if !group.add_member(user_id) {
            tracing::debug!(group = group_id, user = user_id, "already a member");
            return Ok(true);
        }

        let members = Value::Array(
            group
                .members
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        );
        let mut changes = divvy_engine::Row::new();
        changes.insert(mapping.groups.members.clone(), members.clone());
        changes.insert(mapping.groups.participants.clone(), members);
        changes.insert(
            mapping.groups.updated_at.clone(),
            Value::String(Utc::now().to_rfc3339()),
        );

        self.store
            .update_by_key("groups", &mapping.groups.id, group_id, changes)
            .await?;
        tracing::info!(group = group_id, user = user_id, "user joined group");
        Ok(true)
    }

    /// Whether a user row with this id already exists remotely.
    pub async fn user_exists(&self, user_id: &str) -> Result<bool> {
        if user_id.is_empty() {
            return Err(EngineError::MissingId("user").into());
        }
        let mapping = self.mapper.resolve().await;
        let row = self
            .store
            .select_by_key("users", &mapping.users.id, user_id)
            .await?;
        Ok(row.is_some())
    }

    /// Create a user row, failing if the id is already claimed.
    pub async fn create_user(&self, user: &User) -> Result<()> {
        let mapping = self.mapper.resolve().await;
        let row = user_row(mapping, user, Utc::now());
        self.store.insert("users", row).await.map_err(Into::into)
    }
}
