//! # Database Error Types
//!
//! Error types for the local store, device storage and backups.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error / io::Error / serde_json::Error / CoreError               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├──► backup/restore: propagated to the caller                    │
//! │       │                                                                 │
//! │       └──► sale commit: mapped to SaleOutcome in the terminal          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use tillbox_core::{CoreError, ValidationError};

/// Local store and device storage errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Entity cannot be removed while other rows reference it.
    ///
    /// ## When This Occurs
    /// - Deleting a product that sale items still point at
    #[error("{entity} {id} is still referenced")]
    InUse { entity: String, id: String },

    /// A store row failed to decode into its record type.
    ///
    /// ## When This Occurs
    /// - A row was written by an older build with a different shape
    /// - A backup was edited by hand
    #[error("Corrupt row {table}/{row_id}: {reason}")]
    CorruptRow {
        table: String,
        row_id: String,
        reason: String,
    },

    /// A business rule rejected the operation. Nothing was written.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// JSON encoding or decoding failed outside a specific row.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Writing a backup file failed. The recovery queue was not cleared.
    #[error("Backup failed: {0}")]
    BackupFailed(String),

    /// Restoring a backup failed.
    ///
    /// If this happens after the current tables were deleted the store may be
    /// left empty; restore again from a known-good file.
    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    /// Backup file name is not one this service produces.
    #[error("Invalid backup file name: {0}")]
    InvalidBackupName(String),

    /// Internal error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn corrupt_row(
        table: impl Into<String>,
        row_id: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        DbError::CorruptRow {
            table: table.into(),
            row_id: row_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the domain error if a business rule rejected the operation.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → DbError::QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_pass_through() {
        let err: DbError = CoreError::InsufficientStock {
            product_id: "p1".into(),
            available: 6,
            requested: 10,
        }
        .into();

        assert_eq!(
            err.to_string(),
            "Insufficient stock for p1: available 6, requested 10"
        );
        assert!(matches!(
            err.as_domain(),
            Some(CoreError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn test_validation_maps_to_domain() {
        let err: DbError = ValidationError::MustBePositive {
            field: "quantity".into(),
        }
        .into();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::Validation(_))
        ));
    }
}
