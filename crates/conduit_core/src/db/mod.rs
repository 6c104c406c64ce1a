//! SQLite storage bootstrap, pooled connection wrapper and schema migrations.
//!
//! # Responsibility
//! - Build and configure the r2d2 pool of SQLite connections.
//! - Apply schema migrations in deterministic order before first use.
//! - Provide scoped execution (`run` / `run_in_transaction`) for repositories.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Every pooled connection has `foreign_keys=ON`.
//! - No scope leaves a transaction open after it returns.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod connection;
pub mod context;
pub mod migrations;
mod open;

pub use connection::RelationalConnection;
pub use context::{CallContext, CancelToken};
pub use open::{open_store, open_store_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Pool(r2d2::Error),
    /// The store configuration cannot produce a usable pool.
    InvalidConfig(String),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The call context expired before the scope could finish.
    Cancelled,
    Commit(rusqlite::Error),
    Rollback(rusqlite::Error),
    /// A scope was opened while another scope was active on the same thread.
    NestedScope,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Pool(err) => write!(f, "connection pool: {err}"),
            Self::InvalidConfig(message) => write!(f, "invalid store config: {message}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Cancelled => write!(f, "operation cancelled or deadline exceeded"),
            Self::Commit(err) => write!(f, "transaction commit failed: {err}"),
            Self::Rollback(err) => write!(f, "transaction rollback failed: {err}"),
            Self::NestedScope => write!(f, "nested database scopes are not allowed"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) | Self::Commit(err) | Self::Rollback(err) => Some(err),
            Self::Pool(err) => Some(err),
            Self::InvalidConfig(_)
            | Self::UnsupportedSchemaVersion { .. }
            | Self::Cancelled
            | Self::NestedScope => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<r2d2::Error> for DbError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}
