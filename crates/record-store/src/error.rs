use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The aggregate moved on since it was loaded.
    /// The expected version did not match the stored version.
    #[error(
        "Concurrency conflict for {aggregate}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate: String,
        expected: Version,
        actual: Version,
    },

    /// A write would break a uniqueness rule (one cart per owner, one line
    /// per product and variant, one default address per user).
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A commit was malformed and was rejected before touching any rows.
    #[error("Invalid commit: {0}")]
    InvalidCommit(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if retrying the whole operation may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::UniqueViolation { .. }
        )
    }
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
