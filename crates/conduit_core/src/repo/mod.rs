//! Repository contracts and their SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access for users and articles.
//! - Keep SQL, eager-loading and cascade order out of calling code.
//!
//! # Invariants
//! - Every multi-statement write runs in one `run_in_transaction` scope.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to transport errors.

pub mod article_repo;
pub mod error;
pub mod query;
pub mod user_repo;
