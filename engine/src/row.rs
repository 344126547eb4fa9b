//! Row translation between domain types and remote store rows.
//!
//! A `Row` is the wire shape of one record in the remote tabular store:
//! a JSON object keyed by physical column names. All translation goes
//! through a resolved [`SchemaMapping`]; the only multi-name read is the
//! sanctioned `members` → `participants` legacy fallback.

use crate::{error::Result, Error, Expense, Group, SchemaMapping, User};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

/// One remote record: physical column name → JSON value.
pub type Row = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a user for upsert. `updated_at` is always `now`.
pub fn user_row(mapping: &SchemaMapping, user: &User, now: DateTime<Utc>) -> Row {
    let cols = &mapping.users;
    let mut row = Row::new();
    row.insert(cols.id.clone(), Value::String(user.id.clone()));
    row.insert(cols.name.clone(), Value::String(user.name.clone()));
    row.insert(
        cols.created_at.clone(),
        Value::String(user.created_at.to_rfc3339()),
    );
    row.insert(cols.updated_at.clone(), Value::String(now.to_rfc3339()));
    row
}

/// Encode a group for upsert.
///
/// Members are written to both `members` and the legacy `participants`
/// column. `updated_by` is the id of the client doing the write and
/// `updated_at` is always `now`.
pub fn group_row(
    mapping: &SchemaMapping,
    group: &Group,
    updated_by: &str,
    now: DateTime<Utc>,
) -> Row {
    let cols = &mapping.groups;
    let members = id_array(&group.members);
    let mut row = Row::new();
    row.insert(cols.id.clone(), Value::String(group.id.clone()));
    row.insert(cols.name.clone(), Value::String(group.name.clone()));
    row.insert(
        cols.created_by.clone(),
        Value::String(group.created_by.clone()),
    );
    row.insert(cols.updated_by.clone(), Value::String(updated_by.to_string()));
    row.insert(cols.members.clone(), members.clone());
    row.insert(cols.participants.clone(), members);
    row.insert(cols.total_expenses.clone(), decimal_value(group.total_expenses));
    row.insert(
        cols.expense_count.clone(),
        Value::Number(group.expenses.len().into()),
    );
    row.insert(
        cols.created_at.clone(),
        Value::String(group.created_at.to_rfc3339()),
    );
    row.insert(cols.updated_at.clone(), Value::String(now.to_rfc3339()));
    row
}

/// Encode an expense for upsert. The expense date maps to the remote
/// `created_at` column; `per_person_amount` is re-derived, never copied.
pub fn expense_row(mapping: &SchemaMapping, expense: &Expense, now: DateTime<Utc>) -> Row {
    let cols = &mapping.expenses;
    let paid_by = if expense.paid_by.is_empty() {
        "unknown"
    } else {
        expense.paid_by.as_str()
    };
    let share = {
        let n = expense.split_between.len().max(1);
        expense.amount / Decimal::from(n as u64)
    };

    let mut row = Row::new();
    row.insert(cols.id.clone(), Value::String(expense.id.clone()));
    row.insert(cols.group_id.clone(), Value::String(expense.group_id.clone()));
    row.insert(cols.description.clone(), Value::String(expense.name.clone()));
    row.insert(cols.amount.clone(), decimal_value(expense.amount));
    row.insert(cols.paid_by.clone(), Value::String(paid_by.to_string()));
    row.insert(cols.split_between.clone(), id_array(&expense.split_between));
    row.insert(
        cols.created_by.clone(),
        Value::String(expense.created_by.clone()),
    );
    row.insert(
        cols.created_at.clone(),
        Value::String(expense.date.to_rfc3339()),
    );
    row.insert(cols.updated_at.clone(), Value::String(now.to_rfc3339()));
    row.insert(cols.per_person_amount.clone(), decimal_value(share));
    row
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a group row (without expenses). Missing id or name is a hard
/// failure; timestamps missing from old rows fall back to `fallback`.
pub fn group_from_row(
    mapping: &SchemaMapping,
    row: &Row,
    fallback: DateTime<Utc>,
) -> Result<Group> {
    let cols = &mapping.groups;
    let id = required_str("groups", row, &cols.id)?;
    let name = required_str("groups", row, &cols.name)?;

    // Legacy deployments stored membership under `participants`.
    let members = id_list(row, &cols.members)
        .or_else(|| id_list(row, &cols.participants))
        .unwrap_or_default();

    Ok(Group {
        id,
        name,
        members,
        created_by: opt_str(row, &cols.created_by).unwrap_or_default(),
        created_at: timestamp_or(row, &cols.created_at, fallback),
        updated_at: timestamp_or(row, &cols.updated_at, fallback),
        expenses: Vec::new(),
        total_expenses: Decimal::ZERO,
    })
}

/// Decode an expense row. The remote `created_at` column is the expense
/// date; the stored per-person amount is discarded and re-derived.
pub fn expense_from_row(
    mapping: &SchemaMapping,
    row: &Row,
    fallback: DateTime<Utc>,
) -> Result<Expense> {
    let cols = &mapping.expenses;
    let id = required_str("expenses", row, &cols.id)?;

    let mut expense = Expense {
        id,
        group_id: opt_str(row, &cols.group_id).unwrap_or_default(),
        name: opt_str(row, &cols.description).unwrap_or_default(),
        amount: decimal_or_zero("expenses", row, &cols.amount)?,
        paid_by: opt_str(row, &cols.paid_by).unwrap_or_default(),
        split_between: id_list(row, &cols.split_between).unwrap_or_default(),
        created_by: opt_str(row, &cols.created_by).unwrap_or_default(),
        date: timestamp_or(row, &cols.created_at, fallback),
        per_person_amount: Decimal::ZERO,
    };
    expense.recompute_share();
    Ok(expense)
}

/// Assemble a complete group aggregate from its row and its expense rows,
/// re-deriving the totals.
pub fn assemble_group(
    mapping: &SchemaMapping,
    group_row: &Row,
    expense_rows: &[Row],
    fallback: DateTime<Utc>,
) -> Result<Group> {
    let mut group = group_from_row(mapping, group_row, fallback)?;
    let mut expenses = Vec::with_capacity(expense_rows.len());
    for row in expense_rows {
        expenses.push(expense_from_row(mapping, row, fallback)?);
    }
    group.expenses = expenses;
    group.recompute_totals();
    Ok(group)
}

// ---------------------------------------------------------------------------
// Single-field reads (realtime payload inspection)
// ---------------------------------------------------------------------------

/// Member ids from a group row, honoring the `participants` fallback.
pub fn group_members(mapping: &SchemaMapping, row: &Row) -> Vec<String> {
    id_list(row, &mapping.groups.members)
        .or_else(|| id_list(row, &mapping.groups.participants))
        .unwrap_or_default()
}

/// Primary id of a group row, if present.
pub fn group_row_id(mapping: &SchemaMapping, row: &Row) -> Option<String> {
    opt_str(row, &mapping.groups.id)
}

/// Owning group id of an expense row, if present.
pub fn expense_row_group_id(mapping: &SchemaMapping, row: &Row) -> Option<String> {
    opt_str(row, &mapping.expenses.group_id)
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn id_array(ids: &[String]) -> Value {
    Value::Array(ids.iter().cloned().map(Value::String).collect())
}

fn decimal_value(d: Decimal) -> Value {
    serde_json::to_value(d).unwrap_or(Value::Null)
}

fn required_str(table: &'static str, row: &Row, column: &str) -> Result<String> {
    match row.get(column) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Null) | None => Err(Error::MissingColumn {
            table,
            column: column.to_string(),
        }),
        Some(other) => Err(Error::MalformedRow {
            table,
            detail: format!("column '{column}' is not a string: {other}"),
        }),
    }
}

fn opt_str(row: &Row, column: &str) -> Option<String> {
    match row.get(column) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn id_list(row: &Row, column: &str) -> Option<Vec<String>> {
    match row.get(column) {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    }
}

fn decimal_or_zero(table: &'static str, row: &Row, column: &str) -> Result<Decimal> {
    let malformed = |value: &Value| Error::MalformedRow {
        table,
        detail: format!("column '{column}' is not numeric: {value}"),
    };
    match row.get(column) {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(value @ Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Decimal::from(i))
            } else {
                n.as_f64()
                    .and_then(|f| Decimal::try_from(f).ok())
                    .ok_or_else(|| malformed(value))
            }
        }
        Some(value @ Value::String(s)) => s.parse().map_err(|_| malformed(value)),
        Some(other) => Err(malformed(other)),
    }
}

fn timestamp_or(row: &Row, column: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    match row.get(column) {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(fallback),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(fallback),
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn sample_group() -> Group {
        let mut group = Group::new("g1", "Goa trip", "alice", ts(100));
        group.add_member("bob");
        group.expenses.push(Expense::new(
            "e1",
            "g1",
            "hotel",
            dec!(300),
            "alice",
            vec!["alice".into(), "bob".into(), "carol".into()],
            "alice",
            ts(200),
        ));
        group.recompute_totals();
        group
    }

    #[test]
    fn group_row_writes_both_member_columns() {
        let mapping = SchemaMapping::default();
        let row = group_row(&mapping, &sample_group(), "alice", ts(500));

        assert_eq!(row["members"], json!(["alice", "bob"]));
        assert_eq!(row["participants"], json!(["alice", "bob"]));
        assert_eq!(row["updated_by"], json!("alice"));
        assert_eq!(row["expense_count"], json!(1));
        assert_eq!(row["updated_at"], json!(ts(500).to_rfc3339()));
    }

    #[test]
    fn expense_row_uses_description_and_fresh_share() {
        let mapping = SchemaMapping::default();
        let mut expense = sample_group().expenses.remove(0);
        expense.per_person_amount = dec!(999); // stale; must not be written

        let row = expense_row(&mapping, &expense, ts(500));
        assert_eq!(row["description"], json!("hotel"));
        assert_eq!(row["per_person_amount"], json!(100.0));
        assert_eq!(row["created_at"], json!(ts(200).to_rfc3339()));
    }

    #[test]
    fn expense_row_defaults_unknown_payer() {
        let mapping = SchemaMapping::default();
        let mut expense = sample_group().expenses.remove(0);
        expense.paid_by.clear();

        let row = expense_row(&mapping, &expense, ts(500));
        assert_eq!(row["paid_by"], json!("unknown"));
    }

    #[test]
    fn encode_respects_remapped_columns() {
        let mut mapping = SchemaMapping::default();
        mapping.expenses.group_id = "groupid".into();
        mapping.expenses.paid_by = "paidby".into();

        let expense = sample_group().expenses.remove(0);
        let row = expense_row(&mapping, &expense, ts(500));

        assert_eq!(row["groupid"], json!("g1"));
        assert_eq!(row["paidby"], json!("alice"));
        assert!(!row.contains_key("group_id"));
    }

    #[test]
    fn decode_group_falls_back_to_participants() {
        let mapping = SchemaMapping::default();
        let row: Row = serde_json::from_value(json!({
            "id": "g1",
            "name": "Goa trip",
            "participants": ["alice", "bob"],
            "created_by": "alice",
            "created_at": ts(100).to_rfc3339(),
        }))
        .unwrap();

        let group = group_from_row(&mapping, &row, ts(0)).unwrap();
        assert_eq!(group.members, vec!["alice", "bob"]);
        assert_eq!(group.created_at, ts(100));
        assert_eq!(group.updated_at, ts(0)); // missing column falls back
    }

    #[test]
    fn decode_group_requires_id_and_name() {
        let mapping = SchemaMapping::default();
        let row: Row = serde_json::from_value(json!({"name": "nameless"})).unwrap();

        let err = group_from_row(&mapping, &row, ts(0)).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { table: "groups", .. }));
    }

    #[test]
    fn decode_expense_accepts_string_amount() {
        let mapping = SchemaMapping::default();
        let row: Row = serde_json::from_value(json!({
            "id": "e1",
            "group_id": "g1",
            "description": "taxi",
            "amount": "42.50",
            "paid_by": "bob",
            "split_between": ["alice", "bob"],
        }))
        .unwrap();

        let expense = expense_from_row(&mapping, &row, ts(0)).unwrap();
        assert_eq!(expense.amount, dec!(42.50));
        assert_eq!(expense.per_person_amount, dec!(21.25));
        assert_eq!(expense.name, "taxi");
    }

    #[test]
    fn decode_expense_rejects_garbage_amount() {
        let mapping = SchemaMapping::default();
        let row: Row = serde_json::from_value(json!({
            "id": "e1",
            "amount": "not-a-number",
        }))
        .unwrap();

        let err = expense_from_row(&mapping, &row, ts(0)).unwrap_err();
        assert!(matches!(err, Error::MalformedRow { table: "expenses", .. }));
    }

    #[test]
    fn decode_discards_stored_share() {
        let mapping = SchemaMapping::default();
        let row: Row = serde_json::from_value(json!({
            "id": "e1",
            "amount": 300,
            "split_between": ["a", "b", "c"],
            "per_person_amount": 12.34, // stale stored derivation
        }))
        .unwrap();

        let expense = expense_from_row(&mapping, &row, ts(0)).unwrap();
        assert_eq!(expense.per_person_amount, dec!(100));
    }

    #[test]
    fn assemble_group_rederives_total() {
        let mapping = SchemaMapping::default();
        let group_row_json: Row = serde_json::from_value(json!({
            "id": "g1",
            "name": "trip",
            "members": ["a", "b"],
            "total_expenses": 1.23, // stale; must be recomputed
        }))
        .unwrap();
        let expense_rows: Vec<Row> = vec![
            serde_json::from_value(json!({"id": "e1", "amount": 100, "split_between": ["a", "b"]}))
                .unwrap(),
            serde_json::from_value(json!({"id": "e2", "amount": 50, "split_between": ["a"]}))
                .unwrap(),
        ];

        let group = assemble_group(&mapping, &group_row_json, &expense_rows, ts(0)).unwrap();
        assert_eq!(group.total_expenses, dec!(150));
        assert_eq!(group.expenses.len(), 2);
        assert_eq!(group.expenses[0].per_person_amount, dec!(50));
    }

    #[test]
    fn epoch_millis_timestamps_accepted() {
        let mapping = SchemaMapping::default();
        let row: Row = serde_json::from_value(json!({
            "id": "g1",
            "name": "trip",
            "members": [],
            "created_at": 1_700_000_000_000_i64,
        }))
        .unwrap();

        let group = group_from_row(&mapping, &row, ts(0)).unwrap();
        assert_eq!(group.created_at.timestamp_millis(), 1_700_000_000_000);
    }
}
