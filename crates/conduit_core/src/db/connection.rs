//! Pooled connection wrapper with scoped transaction execution.
//!
//! # Responsibility
//! - Check out one pooled connection per repository call.
//! - Run multi-statement work inside a single `BEGIN IMMEDIATE` transaction.
//! - Abort in-flight statements when the call context is done.
//!
//! # Invariants
//! - Scopes are flat: opening a scope inside another one on the same thread
//!   fails with `DbError::NestedScope`.
//! - A transaction ends in exactly one of committed / rolled back before the
//!   scope returns; the progress handler is removed before the connection
//!   goes back to the pool.

use super::context::CallContext;
use super::migrations;
use super::{DbError, DbResult};
use log::{debug, error, warn};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::cell::Cell;
use std::os::raw::c_int;
use std::time::Instant;

/// VM instructions between two cancellation probes.
const INTERRUPT_CHECK_OPS: c_int = 1_000;

pub(crate) type SqlitePool = Pool<SqliteConnectionManager>;

thread_local! {
    static SCOPE_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Cloneable handle over the shared connection pool.
#[derive(Clone, Debug)]
pub struct RelationalConnection {
    pool: SqlitePool,
}

impl RelationalConnection {
    pub(crate) fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Current pool occupancy.
    pub fn pool_state(&self) -> r2d2::State {
        self.pool.state()
    }

    /// Schema version recorded in `PRAGMA user_version`.
    pub fn schema_version(&self, ctx: &CallContext) -> DbResult<u32> {
        self.run(ctx, |conn| migrations::current_version(conn))
    }

    /// Runs `f` against one pooled connection outside any explicit transaction.
    pub fn run<T, E, F>(&self, ctx: &CallContext, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DbError>,
    {
        let _scope = ScopeGuard::enter()?;
        let conn = self.checkout(ctx)?;
        let _interrupt = InterruptArm::install(&conn, ctx);
        f(&conn)
    }

    /// Runs `f` inside one immediate transaction.
    ///
    /// Commits when `f` returns `Ok`, otherwise rolls back and returns the
    /// error of `f` unchanged. Commit and rollback failures are reported as
    /// `DbError::Commit` / `DbError::Rollback`. A context that is done by the
    /// time `f` returns forces a rollback and yields `DbError::Cancelled`.
    pub fn run_in_transaction<T, E, F>(&self, ctx: &CallContext, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DbError>,
    {
        let _scope = ScopeGuard::enter()?;
        let mut conn = self.checkout(ctx)?;
        let started_at = Instant::now();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DbError::from)?;

        let interrupt = InterruptArm::install(&tx, ctx);
        let outcome = f(&tx);
        drop(interrupt);

        match outcome {
            Ok(value) if !ctx.is_done() => {
                if let Err(err) = tx.commit() {
                    error!(
                        "event=tx_commit module=db status=error duration_ms={} error={}",
                        started_at.elapsed().as_millis(),
                        err
                    );
                    return Err(DbError::Commit(err).into());
                }
                debug!(
                    "event=tx_commit module=db status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Ok(_) => {
                rollback(tx, started_at, "cancelled")?;
                Err(DbError::Cancelled.into())
            }
            Err(err) => {
                rollback(tx, started_at, "closure_error")?;
                Err(err)
            }
        }
    }

    fn checkout(&self, ctx: &CallContext) -> DbResult<PooledConnection<SqliteConnectionManager>> {
        if ctx.is_done() {
            return Err(DbError::Cancelled);
        }
        let conn = match ctx.remaining() {
            Some(remaining) => self.pool.get_timeout(remaining)?,
            None => self.pool.get()?,
        };
        Ok(conn)
    }
}

fn rollback(tx: Transaction<'_>, started_at: Instant, reason: &str) -> DbResult<()> {
    // Interrupts and some I/O failures make SQLite abort the transaction
    // itself; a second ROLLBACK would fail with "no transaction is active".
    if tx.is_autocommit() {
        warn!(
            "event=tx_rollback module=db status=ok reason={} source=sqlite duration_ms={}",
            reason,
            started_at.elapsed().as_millis()
        );
        return Ok(());
    }
    match tx.rollback() {
        Ok(()) => {
            warn!(
                "event=tx_rollback module=db status=ok reason={} duration_ms={}",
                reason,
                started_at.elapsed().as_millis()
            );
            Ok(())
        }
        Err(err) => {
            error!(
                "event=tx_rollback module=db status=error reason={} duration_ms={} error={}",
                reason,
                started_at.elapsed().as_millis(),
                err
            );
            Err(DbError::Rollback(err))
        }
    }
}

struct ScopeGuard;

impl ScopeGuard {
    fn enter() -> DbResult<Self> {
        SCOPE_ACTIVE.with(|active| {
            if active.replace(true) {
                Err(DbError::NestedScope)
            } else {
                Ok(Self)
            }
        })
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE_ACTIVE.with(|active| active.set(false));
    }
}

/// Installs the context probe as progress handler until dropped.
struct InterruptArm<'c> {
    conn: &'c Connection,
    armed: bool,
}

impl<'c> InterruptArm<'c> {
    fn install(conn: &'c Connection, ctx: &CallContext) -> Self {
        let armed = match ctx.interrupt_probe() {
            Some(probe) => {
                conn.progress_handler(INTERRUPT_CHECK_OPS, Some(probe));
                true
            }
            None => false,
        };
        Self { conn, armed }
    }
}

impl Drop for InterruptArm<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}
