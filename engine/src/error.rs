//! Error types for the Divvy engine.

use thiserror::Error;

/// All possible errors from the Divvy engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("missing {0} id")]
    MissingId(&'static str),

    #[error("group '{0}' has no members")]
    NoMembers(String),

    #[error("group '{group}' members do not include creator '{creator}'")]
    CreatorNotMember { group: String, creator: String },

    #[error("expense '{0}' is split between nobody")]
    EmptySplit(String),

    #[error("negative amount on expense '{0}'")]
    NegativeAmount(String),

    #[error("invalid user id '{0}'")]
    InvalidUserId(String),

    // Row decode errors
    #[error("{table} row is missing column '{column}'")]
    MissingColumn { table: &'static str, column: String },

    #[error("malformed {table} row: {detail}")]
    MalformedRow { table: &'static str, detail: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::MissingId("group");
        assert_eq!(err.to_string(), "missing group id");

        let err = Error::MissingColumn {
            table: "expenses",
            column: "group_id".into(),
        };
        assert_eq!(err.to_string(), "expenses row is missing column 'group_id'");

        let err = Error::CreatorNotMember {
            group: "g1".into(),
            creator: "alice".into(),
        };
        assert_eq!(
            err.to_string(),
            "group 'g1' members do not include creator 'alice'"
        );
    }
}
