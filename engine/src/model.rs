//! Domain types for users, groups, and expenses.
//!
//! Groups are the unit of sync: each group aggregate carries its expenses.
//! `total_expenses` and `per_person_amount` are derived values and are
//! recomputed on every write; stored copies are never authoritative.

use crate::{error::Result, Error, ExpenseId, GroupId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A person identified by a client-generated id.
///
/// Identity is claimed, not arbitrated: the id is derived from the display
/// name plus a timestamp/random suffix and trusted to be globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user.
    pub fn new(id: impl Into<UserId>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at,
        }
    }

    /// Check a claimed user id: alphanumeric, at least four characters.
    pub fn validate_id(id: &str) -> Result<()> {
        if id.len() >= 4 && id.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(())
        } else {
            Err(Error::InvalidUserId(id.to_string()))
        }
    }
}

/// A single shared expense inside a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    /// Display name (stored remotely in the `description` column).
    pub name: String,
    pub amount: Decimal,
    pub paid_by: UserId,
    pub split_between: Vec<UserId>,
    pub created_by: UserId,
    pub date: DateTime<Utc>,
    /// Derived: `amount / |split_between|`. Recomputed on every write.
    pub per_person_amount: Decimal,
}

impl Expense {
    /// Create a new expense with its share already derived.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<ExpenseId>,
        group_id: impl Into<GroupId>,
        name: impl Into<String>,
        amount: Decimal,
        paid_by: impl Into<UserId>,
        split_between: Vec<UserId>,
        created_by: impl Into<UserId>,
        date: DateTime<Utc>,
    ) -> Self {
        let mut expense = Self {
            id: id.into(),
            group_id: group_id.into(),
            name: name.into(),
            amount,
            paid_by: paid_by.into(),
            split_between,
            created_by: created_by.into(),
            date,
            per_person_amount: Decimal::ZERO,
        };
        expense.recompute_share();
        expense
    }

    /// Re-derive `per_person_amount` from `amount` and the split set.
    ///
    /// An empty split divides by one; `validate` rejects empty splits on
    /// the write path, but decoded remote rows may carry them.
    pub fn recompute_share(&mut self) {
        let n = self.split_between.len().max(1);
        self.per_person_amount = self.amount / Decimal::from(n as u64);
    }

    /// Validate write-path invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::MissingId("expense"));
        }
        if self.group_id.is_empty() {
            return Err(Error::MissingId("group"));
        }
        if self.amount < Decimal::ZERO {
            return Err(Error::NegativeAmount(self.id.clone()));
        }
        if self.split_between.is_empty() {
            return Err(Error::EmptySplit(self.id.clone()));
        }
        Ok(())
    }
}

/// A group of people sharing expenses. The aggregate that syncs as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Ordered set: insertion order is kept, duplicates are rejected.
    pub members: Vec<UserId>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expenses: Vec<Expense>,
    /// Derived: sum of expense amounts. Recomputed on every write.
    pub total_expenses: Decimal,
}

impl Group {
    /// Create a new group with the creator as first member.
    pub fn new(
        id: impl Into<GroupId>,
        name: impl Into<String>,
        created_by: impl Into<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let created_by = created_by.into();
        Self {
            id: id.into(),
            name: name.into(),
            members: vec![created_by.clone()],
            created_by,
            created_at,
            updated_at: created_at,
            expenses: Vec::new(),
            total_expenses: Decimal::ZERO,
        }
    }

    /// Check membership.
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    /// Add a member, keeping insertion order. Returns false if already present.
    pub fn add_member(&mut self, user_id: impl Into<UserId>) -> bool {
        let user_id = user_id.into();
        if self.is_member(&user_id) {
            false
        } else {
            self.members.push(user_id);
            true
        }
    }

    /// Re-derive `total_expenses` and every expense's share.
    pub fn recompute_totals(&mut self) {
        let mut total = Decimal::ZERO;
        for expense in &mut self.expenses {
            expense.recompute_share();
            total += expense.amount;
        }
        self.total_expenses = total;
    }

    /// Validate write-path invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::MissingId("group"));
        }
        if self.members.is_empty() {
            return Err(Error::NoMembers(self.id.clone()));
        }
        if !self.created_by.is_empty() && !self.is_member(&self.created_by) {
            return Err(Error::CreatorNotMember {
                group: self.id.clone(),
                creator: self.created_by.clone(),
            });
        }
        Ok(())
    }

    /// Replace the expense list and re-derive totals, leaving all other
    /// fields untouched. Used when a realtime expense change re-pulls only
    /// the expense set of the open group.
    pub fn graft_expenses(&mut self, expenses: Vec<Expense>) {
        self.expenses = expenses;
        self.recompute_totals();
    }
}
