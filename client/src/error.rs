//! Unified error handling for the sync client.

use thiserror::Error;

/// Errors from the remote tabular store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("column '{column}' not found on table '{table}'")]
    ColumnMissing { table: String, column: String },

    #[error("table '{0}' not found")]
    TableMissing(String),

    #[error("remote store unreachable: {0}")]
    Unreachable(String),

    #[error("remote store returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("malformed remote response: {0}")]
    Malformed(String),
}

impl StoreError {
    /// True for the probe outcome that means "this candidate column does
    /// not exist" — the one failure schema discovery acts on.
    pub fn is_column_missing(&self) -> bool {
        matches!(self, StoreError::ColumnMissing { .. })
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Unreachable(err.to_string())
    }
}

/// Errors surfaced by the public sync entry points.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] divvy_engine::Error),

    #[error("no remote store configured")]
    NotConfigured,

    #[error("offline")]
    Offline,
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
