//! User repository contract and SQLite implementation.
//!
//! # Responsibility
//! - CRUD over the `users` table.
//! - Follow-graph edges in `follows` and read access to a user's favorites.
//!
//! # Invariants
//! - Username and email stay globally unique; violations surface as
//!   `RepoError::Conflict` and leave no row behind.
//! - Follow/unfollow are idempotent: the `(follower_id, followee_id)` key
//!   decides whether an edge is new, so concurrent duplicates collapse.
//! - Deleting a user removes every row that references it in one
//!   transaction and keeps `favorites_count` equal to the favorite rows.

use super::error::{RepoError, RepoResult};
use super::query::{
    ensure_user_exists, purge_articles, query_ids, row_exists, ArticleScope,
};
use crate::db::{CallContext, RelationalConnection};
use crate::model::article::ArticleId;
use crate::model::now_millis;
use crate::model::user::{User, UserId};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

const USER_SELECT_SQL: &str = "SELECT
    id,
    username,
    email,
    password_hash,
    bio,
    image,
    created_at,
    updated_at
FROM users";

/// Repository interface for the User aggregate.
pub trait UserRepository {
    /// Inserts `user` and writes back its id and timestamps.
    fn create(&self, ctx: &CallContext, user: &mut User) -> RepoResult<()>;
    fn get_by_id(&self, ctx: &CallContext, id: UserId) -> RepoResult<User>;
    fn get_by_email(&self, ctx: &CallContext, email: &str) -> RepoResult<User>;
    fn get_by_username(&self, ctx: &CallContext, username: &str) -> RepoResult<User>;
    /// Persists username, email, password hash, bio and image.
    fn update(&self, ctx: &CallContext, user: &mut User) -> RepoResult<()>;
    /// Removes the user together with everything it authored or linked.
    fn delete(&self, ctx: &CallContext, id: UserId) -> RepoResult<()>;
    /// Adds the edge `follower_id -> followee_id`; existing edges are kept.
    fn follow(&self, ctx: &CallContext, follower_id: UserId, followee_id: UserId)
        -> RepoResult<()>;
    /// Removes the edge if present.
    fn unfollow(
        &self,
        ctx: &CallContext,
        follower_id: UserId,
        followee_id: UserId,
    ) -> RepoResult<()>;
    fn is_following(
        &self,
        ctx: &CallContext,
        follower_id: UserId,
        followee_id: UserId,
    ) -> RepoResult<bool>;
    /// Ids `user_id` follows, ascending.
    fn get_following_user_ids(&self, ctx: &CallContext, user_id: UserId)
        -> RepoResult<Vec<UserId>>;
    /// Ids following `user_id`, ascending.
    fn get_follower_user_ids(&self, ctx: &CallContext, user_id: UserId)
        -> RepoResult<Vec<UserId>>;
    /// Articles `user_id` favorited, ascending.
    fn get_favorite_article_ids(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> RepoResult<Vec<ArticleId>>;
}

/// SQLite-backed user repository.
#[derive(Debug, Clone)]
pub struct SqliteUserRepository {
    conn: RelationalConnection,
}

impl SqliteUserRepository {
    pub fn new(conn: RelationalConnection) -> Self {
        Self { conn }
    }
}

impl UserRepository for SqliteUserRepository {
    fn create(&self, ctx: &CallContext, user: &mut User) -> RepoResult<()> {
        let now = now_millis();
        let id = self.conn.run(ctx, |conn| -> RepoResult<UserId> {
            conn.execute(
                "INSERT INTO users (
                    username,
                    email,
                    password_hash,
                    bio,
                    image,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
                params![
                    user.username.as_str(),
                    user.email.as_str(),
                    user.password_hash.as_slice(),
                    user.bio.as_deref(),
                    user.image.as_deref(),
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        user.id = id;
        user.created_at = now;
        user.updated_at = now;
        info!("event=user_create module=repo status=ok user_id={id}");
        Ok(())
    }

    fn get_by_id(&self, ctx: &CallContext, id: UserId) -> RepoResult<User> {
        self.conn
            .run(ctx, |conn| find_user(conn, "id", &id))?
            .ok_or_else(|| RepoError::not_found("user", id))
    }

    fn get_by_email(&self, ctx: &CallContext, email: &str) -> RepoResult<User> {
        self.conn
            .run(ctx, |conn| find_user(conn, "email", &email))?
            .ok_or_else(|| RepoError::not_found("user", email))
    }

    fn get_by_username(&self, ctx: &CallContext, username: &str) -> RepoResult<User> {
        self.conn
            .run(ctx, |conn| find_user(conn, "username", &username))?
            .ok_or_else(|| RepoError::not_found("user", username))
    }

    fn update(&self, ctx: &CallContext, user: &mut User) -> RepoResult<()> {
        let now = now_millis();
        let changed = self.conn.run(ctx, |conn| -> RepoResult<usize> {
            Ok(conn.execute(
                "UPDATE users
                 SET
                    username = ?1,
                    email = ?2,
                    password_hash = ?3,
                    bio = ?4,
                    image = ?5,
                    updated_at = ?6
                 WHERE id = ?7;",
                params![
                    user.username.as_str(),
                    user.email.as_str(),
                    user.password_hash.as_slice(),
                    user.bio.as_deref(),
                    user.image.as_deref(),
                    now,
                    user.id,
                ],
            )?)
        })?;

        if changed == 0 {
            return Err(RepoError::not_found("user", user.id));
        }

        user.updated_at = now;
        debug!("event=user_update module=repo status=ok user_id={}", user.id);
        Ok(())
    }

    fn delete(&self, ctx: &CallContext, id: UserId) -> RepoResult<()> {
        let articles_removed = self.conn.run_in_transaction(ctx, |tx| -> RepoResult<usize> {
            ensure_user_exists(tx, id)?;

            // Favorites this user left on other people's articles.
            tx.execute(
                "UPDATE articles
                 SET favorites_count = favorites_count - 1
                 WHERE id IN (SELECT article_id FROM favorite_articles WHERE user_id = ?1)
                   AND favorites_count > 0;",
                [id],
            )?;
            tx.execute("DELETE FROM favorite_articles WHERE user_id = ?1;", [id])?;
            tx.execute("DELETE FROM comments WHERE author_id = ?1;", [id])?;

            let articles_removed = purge_articles(tx, ArticleScope::ByAuthor(id))?;

            tx.execute(
                "DELETE FROM follows WHERE follower_id = ?1 OR followee_id = ?1;",
                [id],
            )?;
            tx.execute("DELETE FROM users WHERE id = ?1;", [id])?;
            Ok(articles_removed)
        })?;

        info!(
            "event=user_delete module=repo status=ok user_id={id} articles_removed={articles_removed}"
        );
        Ok(())
    }

    fn follow(
        &self,
        ctx: &CallContext,
        follower_id: UserId,
        followee_id: UserId,
    ) -> RepoResult<()> {
        if follower_id == followee_id {
            return Err(RepoError::InvalidArgument(format!(
                "user {follower_id} cannot follow themselves"
            )));
        }

        let created = self.conn.run_in_transaction(ctx, |tx| -> RepoResult<bool> {
            ensure_user_exists(tx, follower_id)?;
            ensure_user_exists(tx, followee_id)?;
            let inserted = tx.execute(
                "INSERT INTO follows (follower_id, followee_id, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (follower_id, followee_id) DO NOTHING;",
                params![follower_id, followee_id, now_millis()],
            )?;
            Ok(inserted == 1)
        })?;

        debug!(
            "event=user_follow module=repo status=ok follower_id={follower_id} followee_id={followee_id} created={created}"
        );
        Ok(())
    }

    fn unfollow(
        &self,
        ctx: &CallContext,
        follower_id: UserId,
        followee_id: UserId,
    ) -> RepoResult<()> {
        let removed = self.conn.run(ctx, |conn| -> RepoResult<usize> {
            Ok(conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2;",
                [follower_id, followee_id],
            )?)
        })?;

        debug!(
            "event=user_unfollow module=repo status=ok follower_id={follower_id} followee_id={followee_id} removed={}",
            removed == 1
        );
        Ok(())
    }

    fn is_following(
        &self,
        ctx: &CallContext,
        follower_id: UserId,
        followee_id: UserId,
    ) -> RepoResult<bool> {
        self.conn.run(ctx, |conn| {
            row_exists(
                conn,
                "SELECT EXISTS(
                    SELECT 1
                    FROM follows
                    WHERE follower_id = ?1 AND followee_id = ?2
                );",
                [follower_id, followee_id],
            )
        })
    }

    fn get_following_user_ids(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> RepoResult<Vec<UserId>> {
        self.conn.run(ctx, |conn| {
            query_ids(
                conn,
                "SELECT followee_id FROM follows WHERE follower_id = ?1 ORDER BY followee_id;",
                [user_id],
            )
        })
    }

    fn get_follower_user_ids(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> RepoResult<Vec<UserId>> {
        self.conn.run(ctx, |conn| {
            query_ids(
                conn,
                "SELECT follower_id FROM follows WHERE followee_id = ?1 ORDER BY follower_id;",
                [user_id],
            )
        })
    }

    fn get_favorite_article_ids(
        &self,
        ctx: &CallContext,
        user_id: UserId,
    ) -> RepoResult<Vec<ArticleId>> {
        self.conn.run(ctx, |conn| {
            query_ids(
                conn,
                "SELECT article_id FROM favorite_articles WHERE user_id = ?1 ORDER BY article_id;",
                [user_id],
            )
        })
    }
}

fn find_user(conn: &Connection, column: &str, value: &dyn ToSql) -> RepoResult<Option<User>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT_SQL} WHERE {column} = ?1;"))?;
    let user = stmt.query_row([value], parse_user_row).optional()?;
    Ok(user)
}

fn parse_user_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        bio: row.get("bio")?,
        image: row.get("image")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
