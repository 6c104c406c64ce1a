//! Persistence layer of the Conduit blogging service.
//! Users, the follow graph, articles, comments, tags and favorites over
//! pooled SQLite connections.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::{ConfigError, DatabaseLocation, LogConfig, StoreConfig};
pub use db::{
    open_store, open_store_in_memory, CallContext, CancelToken, DbError, DbResult,
    RelationalConnection,
};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::article::{Article, ArticleId, Comment, CommentId, Tag, TagId};
pub use model::user::{Author, User, UserId};
pub use repo::article_repo::{ArticleRepository, SqliteArticleRepository};
pub use repo::error::{RepoError, RepoResult};
pub use repo::query::{normalize_tag, normalize_tags, ArticleFilter, Page};
pub use repo::user_repo::{SqliteUserRepository, UserRepository};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
