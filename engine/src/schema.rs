//! Logical-to-physical column mapping for the remote store.
//!
//! The remote store's column naming is not fixed: deployments exist with
//! compact (`createdat`) and snake_case (`created_at`) spellings. The
//! mapping starts from the snake_case defaults and is refined once per
//! process by live probing (see the client crate's `SchemaMapper`). After
//! that it is passed explicitly to every row translation; nothing reads a
//! row by trying several names ad hoc.

use serde::{Deserialize, Serialize};

/// The logical tables the sync engine works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Users,
    Groups,
    Expenses,
}

impl Table {
    /// Physical table name. Table names are stable; only columns vary.
    pub fn name(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Groups => "groups",
            Table::Expenses => "expenses",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical column names for the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserColumns {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Default for UserColumns {
    fn default() -> Self {
        Self {
            id: "id".into(),
            name: "name".into(),
            created_at: "created_at".into(),
            updated_at: "updated_at".into(),
        }
    }
}

/// Physical column names for the `groups` table.
///
/// `participants` is a legacy twin of `members`; writes keep both in sync
/// and reads fall back to it when `members` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupColumns {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub updated_by: String,
    pub members: String,
    pub participants: String,
    pub total_expenses: String,
    pub expense_count: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Default for GroupColumns {
    fn default() -> Self {
        Self {
            id: "id".into(),
            name: "name".into(),
            created_by: "created_by".into(),
            updated_by: "updated_by".into(),
            members: "members".into(),
            participants: "participants".into(),
            total_expenses: "total_expenses".into(),
            expense_count: "expense_count".into(),
            created_at: "created_at".into(),
            updated_at: "updated_at".into(),
        }
    }
}

/// Physical column names for the `expenses` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseColumns {
    pub id: String,
    pub group_id: String,
    pub description: String,
    pub amount: String,
    pub paid_by: String,
    pub split_between: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub per_person_amount: String,
}

impl Default for ExpenseColumns {
    fn default() -> Self {
        Self {
            id: "id".into(),
            group_id: "group_id".into(),
            description: "description".into(),
            amount: "amount".into(),
            paid_by: "paid_by".into(),
            split_between: "split_between".into(),
            created_by: "created_by".into(),
            created_at: "created_at".into(),
            updated_at: "updated_at".into(),
            per_person_amount: "per_person_amount".into(),
        }
    }
}

/// Resolved logical-to-physical column mapping for all tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaMapping {
    pub users: UserColumns,
    pub groups: GroupColumns,
    pub expenses: ExpenseColumns,
}

/// A logical field whose physical column name is ambiguous and must be
/// discovered by probing. Candidates are tried in order; the first one the
/// remote store confirms wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeField {
    UsersCreatedAt,
    UsersUpdatedAt,
    GroupsCreatedBy,
    GroupsCreatedAt,
    ExpensesGroupId,
    ExpensesPaidBy,
}

impl ProbeField {
    /// Every ambiguous field, in probe order.
    pub const ALL: [ProbeField; 6] = [
        ProbeField::UsersCreatedAt,
        ProbeField::UsersUpdatedAt,
        ProbeField::GroupsCreatedBy,
        ProbeField::GroupsCreatedAt,
        ProbeField::ExpensesGroupId,
        ProbeField::ExpensesPaidBy,
    ];

    /// The table this field lives in.
    pub fn table(self) -> Table {
        match self {
            ProbeField::UsersCreatedAt | ProbeField::UsersUpdatedAt => Table::Users,
            ProbeField::GroupsCreatedBy | ProbeField::GroupsCreatedAt => Table::Groups,
            ProbeField::ExpensesGroupId | ProbeField::ExpensesPaidBy => Table::Expenses,
        }
    }

    /// Candidate physical names, most compact spelling first.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            ProbeField::UsersCreatedAt => &["createdat", "created_at"],
            ProbeField::UsersUpdatedAt => &["updatedat", "updated_at"],
            ProbeField::GroupsCreatedBy => &["createdby", "created_by"],
            ProbeField::GroupsCreatedAt => &["createdat", "created_at"],
            ProbeField::ExpensesGroupId => &["groupid", "group_id"],
            ProbeField::ExpensesPaidBy => &["paidby", "paid_by"],
        }
    }

    /// Overwrite the mapping entry for this field with a confirmed column.
    pub fn apply(self, mapping: &mut SchemaMapping, column: &str) {
        let slot = match self {
            ProbeField::UsersCreatedAt => &mut mapping.users.created_at,
            ProbeField::UsersUpdatedAt => &mut mapping.users.updated_at,
            ProbeField::GroupsCreatedBy => &mut mapping.groups.created_by,
            ProbeField::GroupsCreatedAt => &mut mapping.groups.created_at,
            ProbeField::ExpensesGroupId => &mut mapping.expenses.group_id,
            ProbeField::ExpensesPaidBy => &mut mapping.expenses.paid_by,
        };
        *slot = column.to_string();
    }

    /// Current mapping entry for this field.
    pub fn current(self, mapping: &SchemaMapping) -> &str {
        match self {
            ProbeField::UsersCreatedAt => &mapping.users.created_at,
            ProbeField::UsersUpdatedAt => &mapping.users.updated_at,
            ProbeField::GroupsCreatedBy => &mapping.groups.created_by,
            ProbeField::GroupsCreatedAt => &mapping.groups.created_at,
            ProbeField::ExpensesGroupId => &mapping.expenses.group_id,
            ProbeField::ExpensesPaidBy => &mapping.expenses.paid_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_snake_case() {
        let mapping = SchemaMapping::default();
        assert_eq!(mapping.users.created_at, "created_at");
        assert_eq!(mapping.groups.created_by, "created_by");
        assert_eq!(mapping.expenses.group_id, "group_id");
        assert_eq!(mapping.expenses.per_person_amount, "per_person_amount");
    }

    #[test]
    fn apply_overwrites_single_entry() {
        let mut mapping = SchemaMapping::default();
        ProbeField::ExpensesGroupId.apply(&mut mapping, "groupid");

        assert_eq!(mapping.expenses.group_id, "groupid");
        // Every other entry keeps its default.
        assert_eq!(mapping.expenses.paid_by, "paid_by");
        assert_eq!(mapping.groups.created_by, "created_by");
    }

    #[test]
    fn candidates_cover_both_spellings() {
        for field in ProbeField::ALL {
            let candidates = field.candidates();
            assert_eq!(candidates.len(), 2);
            // The snake_case default must be among the candidates, so an
            // unconfirmed probe round leaves a reachable column in place.
            let mapping = SchemaMapping::default();
            assert!(candidates.contains(&field.current(&mapping)));
        }
    }

    #[test]
    fn table_names() {
        assert_eq!(Table::Users.name(), "users");
        assert_eq!(Table::Groups.name(), "groups");
        assert_eq!(Table::Expenses.name(), "expenses");
        assert_eq!(ProbeField::GroupsCreatedBy.table(), Table::Groups);
    }

    #[test]
    fn mapping_serialization_roundtrip() {
        let mut mapping = SchemaMapping::default();
        ProbeField::UsersCreatedAt.apply(&mut mapping, "createdat");

        let json = serde_json::to_string(&mapping).unwrap();
        let parsed: SchemaMapping = serde_json::from_str(&json).unwrap();
        assert_eq!(mapping, parsed);
    }
}
