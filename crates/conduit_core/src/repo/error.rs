//! Repository error taxonomy.
//!
//! # Invariants
//! - Expected conditions (missing row, constraint violation) are values,
//!   never panics.
//! - Driver failures are classified once, here, so every `?` in the
//!   repositories yields the same typed error.

use crate::db::DbError;
use rusqlite::{ffi, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Error returned by every repository operation.
#[derive(Debug)]
pub enum RepoError {
    /// No row matches the requested key.
    NotFound { entity: &'static str, key: String },
    /// A uniqueness or referential constraint rejected the write.
    Conflict(String),
    /// Pool checkout or driver failure; transient, the caller may retry.
    Connection(DbError),
    /// Commit or rollback failed, or scopes were nested. The effect of the
    /// operation is indeterminate.
    Transaction(DbError),
    /// The call context expired or was cancelled; nothing was applied.
    Cancelled,
    /// The request violates a storage-level policy.
    InvalidArgument(String),
    /// Persisted data cannot be decoded into the domain model.
    InvalidData(String),
}

impl RepoError {
    pub(crate) fn not_found(entity: &'static str, key: impl Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, key } => write!(f, "{entity} not found: {key}"),
            Self::Conflict(detail) => write!(f, "conflict: {detail}"),
            Self::Connection(err) => write!(f, "database unavailable: {err}"),
            Self::Transaction(err) => write!(f, "transaction failed: {err}"),
            Self::Cancelled => write!(f, "operation cancelled or deadline exceeded"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connection(err) | Self::Transaction(err) => Some(err),
            Self::NotFound { .. }
            | Self::Conflict(_)
            | Self::Cancelled
            | Self::InvalidArgument(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => classify_sqlite(err),
            DbError::Cancelled => Self::Cancelled,
            DbError::Commit(_) | DbError::Rollback(_) | DbError::NestedScope => {
                Self::Transaction(value)
            }
            DbError::Pool(_)
            | DbError::InvalidConfig(_)
            | DbError::UnsupportedSchemaVersion { .. } => Self::Connection(value),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        classify_sqlite(value)
    }
}

fn classify_sqlite(err: rusqlite::Error) -> RepoError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            let detail = message.unwrap_or_else(|| failure.to_string());
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE
                | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                | ffi::SQLITE_CONSTRAINT_FOREIGNKEY => RepoError::Conflict(detail),
                _ => RepoError::InvalidArgument(detail),
            }
        }
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::OperationInterrupted =>
        {
            RepoError::Cancelled
        }
        other @ (rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)) => {
            RepoError::InvalidData(other.to_string())
        }
        other => RepoError::Connection(DbError::Sqlite(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::RepoError;
    use crate::db::DbError;
    use rusqlite::Connection;

    fn failing_insert(sql_setup: &str, insert: &str) -> RepoError {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(sql_setup).unwrap();
        conn.execute_batch(insert).unwrap_err().into()
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = failing_insert(
            "CREATE TABLE t (name TEXT NOT NULL UNIQUE); INSERT INTO t VALUES ('a');",
            "INSERT INTO t VALUES ('a');",
        );
        assert!(matches!(err, RepoError::Conflict(ref detail) if detail.contains("UNIQUE")));
    }

    #[test]
    fn check_violation_maps_to_invalid_argument() {
        let err = failing_insert(
            "CREATE TABLE t (n INTEGER NOT NULL CHECK (n >= 0));",
            "INSERT INTO t VALUES (-1);",
        );
        assert!(matches!(err, RepoError::InvalidArgument(_)));
    }

    #[test]
    fn commit_failure_maps_to_transaction_error() {
        let err: RepoError =
            DbError::Commit(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(matches!(err, RepoError::Transaction(DbError::Commit(_))));
        assert!(matches!(RepoError::from(DbError::Cancelled), RepoError::Cancelled));
    }

    #[test]
    fn other_driver_failures_map_to_connection_error() {
        let err: RepoError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, RepoError::Connection(DbError::Sqlite(_))));
    }
}
