//! # Divvy Engine
//!
//! Domain logic for Divvy, an offline-first group-expense tracker that
//! syncs against a remote tabular store of variable column naming.
//!
//! This crate is the pure core: data types, invariants, and the
//! logical-to-physical schema mapping. It performs no IO — timestamps are
//! parameters, probing and persistence live in `divvy-client`.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of files, network, or clocks
//! - **Derived fields are never trusted**: `total_expenses` and
//!   `per_person_amount` are recomputed on every write and every decode
//! - **One mapping, passed explicitly**: remote rows are translated only
//!   through a resolved [`SchemaMapping`], never by ad-hoc name guessing
//!
//! ## Core Concepts
//!
//! ### Aggregates
//!
//! A [`Group`] is the unit of sync and carries its [`Expense`]s. A
//! [`User`] is a client-claimed identity — the id is generated from the
//! display name plus a timestamp/random suffix and trusted globally.
//!
//! ### Schema mapping
//!
//! The remote store's column names vary between deployments
//! (`createdat` vs `created_at`). [`SchemaMapping`] holds the resolved
//! physical name for every logical field; [`ProbeField`] enumerates the
//! ambiguous ones together with their probe candidates.
//!
//! ### Rows
//!
//! The [`row`] module translates aggregates to and from [`row::Row`]
//! values (JSON objects keyed by physical column names) for upserts,
//! fetches, and realtime change payloads.

pub mod error;
pub mod model;
pub mod row;
pub mod schema;

// Re-export main types at crate root
pub use error::Error;
pub use model::{Expense, Group, User};
pub use row::{
    assemble_group, expense_from_row, expense_row, expense_row_group_id, group_from_row,
    group_members, group_row, group_row_id, user_row, Row,
};
pub use schema::{
    ExpenseColumns, GroupColumns, ProbeField, SchemaMapping, Table, UserColumns,
};

/// Type aliases for clarity
pub type UserId = String;
pub type GroupId = String;
pub type ExpenseId = String;
