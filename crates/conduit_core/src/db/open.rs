//! Pool bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Build file or in-memory connection pools.
//! - Configure connection pragmas required by store behavior.
//! - Apply schema migrations before returning a usable store.
//!
//! # Invariants
//! - Returned pools hand out connections with `foreign_keys=ON`.
//! - Returned pools have migrations fully applied.

use super::connection::{RelationalConnection, SqlitePool};
use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use crate::config::{DatabaseLocation, StoreConfig};
use log::{error, info};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::time::{Duration, Instant};

/// Opens the store described by `config` and applies pending migrations.
///
/// # Side effects
/// - Creates the database file when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_store(config: &StoreConfig) -> DbResult<RelationalConnection> {
    let started_at = Instant::now();
    let mode = config.location.mode();
    info!("event=db_open module=db status=start mode={mode}");

    match build_pool(config).and_then(migrate) {
        Ok(pool) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={} max_connections={}",
                mode,
                started_at.elapsed().as_millis(),
                pool.max_size()
            );
            Ok(RelationalConnection::from_pool(pool))
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Opens a private in-memory store with one long-lived connection.
pub fn open_store_in_memory() -> DbResult<RelationalConnection> {
    open_store(&StoreConfig {
        location: DatabaseLocation::Memory,
        ..StoreConfig::default()
    })
}

fn build_pool(config: &StoreConfig) -> DbResult<SqlitePool> {
    if config.max_connections == 0 {
        return Err(DbError::InvalidConfig(
            "max_connections must be at least 1".to_string(),
        ));
    }
    let busy_timeout = config.busy_timeout;
    let pool = match &config.location {
        DatabaseLocation::File(path) => {
            let manager = SqliteConnectionManager::file(path)
                .with_init(move |conn| configure_connection(conn, busy_timeout, true));
            Pool::builder()
                .max_size(config.max_connections)
                .connection_timeout(config.connection_timeout)
                .build(manager)?
        }
        // Every in-memory connection is its own database, so the pool must
        // keep exactly one connection alive for the life of the store.
        DatabaseLocation::Memory => {
            let manager = SqliteConnectionManager::memory()
                .with_init(move |conn| configure_connection(conn, busy_timeout, false));
            Pool::builder()
                .max_size(1)
                .min_idle(Some(1))
                .idle_timeout(None)
                .max_lifetime(None)
                .connection_timeout(config.connection_timeout)
                .build(manager)?
        }
    };
    Ok(pool)
}

fn migrate(pool: SqlitePool) -> DbResult<SqlitePool> {
    {
        let mut conn = pool.get()?;
        apply_migrations(&mut conn)?;
    }
    Ok(pool)
}

fn configure_connection(
    conn: &mut Connection,
    busy_timeout: Duration,
    use_wal: bool,
) -> Result<(), rusqlite::Error> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    if use_wal {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
    }
    Ok(())
}
