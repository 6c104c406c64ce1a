//! Plain domain data for the blogging store.
//!
//! # Responsibility
//! - Define the User, Article, Comment and Tag records exchanged with callers.
//! - Keep entities free of persistence behavior; repositories own all I/O.
//!
//! # Invariants
//! - Id `0` means "not persisted yet"; repositories assign real ids.
//! - Timestamps are Unix epoch milliseconds.

pub mod article;
pub mod user;

/// Current wall clock in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
