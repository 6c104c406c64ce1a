//! Article repository contract and SQLite implementation.
//!
//! # Responsibility
//! - CRUD for articles and their owned comments.
//! - Tag resolution (reuse-or-create by name) and tag-set replacement.
//! - Favorite toggling with the denormalized `favorites_count`.
//! - Filtered listings and the follow feed, with authors and tags
//!   eager-loaded in the same statement.
//!
//! # Invariants
//! - `favorites_count` changes only when a favorite row is actually
//!   inserted or removed, inside the same transaction.
//! - Article creation/update and tag linking commit or roll back together.
//! - Deleting an article removes its favorites, tag links and comments first.

use super::error::{RepoError, RepoResult};
use super::query::{
    apply_article_filter, author_from_row, ensure_article_exists, ensure_user_exists,
    normalize_tags, purge_articles, row_exists, tags_from_json, ArticleFilter, ArticleScope, Page,
    SelectBuilder, AUTHOR_COLUMNS, TAGS_JSON_COLUMN,
};
use crate::db::{CallContext, RelationalConnection};
use crate::model::article::{Article, ArticleId, Comment, CommentId, Tag, TagId};
use crate::model::now_millis;
use crate::model::user::UserId;
use log::{debug, info};
use once_cell::sync::Lazy;
use rusqlite::{params, Connection, Row};

static ARTICLE_SELECT_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT
            a.id AS id,
            a.title AS title,
            a.description AS description,
            a.body AS body,
            a.author_id AS author_id,
            a.favorites_count AS favorites_count,
            a.created_at AS created_at,
            a.updated_at AS updated_at,
            {AUTHOR_COLUMNS},
            {TAGS_JSON_COLUMN}
        FROM articles a
        INNER JOIN users u ON u.id = a.author_id"
    )
});

const ARTICLE_COUNT_SQL: &str = "SELECT COUNT(*)
FROM articles a
INNER JOIN users u ON u.id = a.author_id";

static COMMENT_SELECT_SQL: Lazy<String> = Lazy::new(|| {
    format!(
        "SELECT
            c.id AS id,
            c.body AS body,
            c.author_id AS author_id,
            c.article_id AS article_id,
            c.created_at AS created_at,
            c.updated_at AS updated_at,
            {AUTHOR_COLUMNS}
        FROM comments c
        INNER JOIN users u ON u.id = c.author_id"
    )
});

/// Repository interface for the Article aggregate.
pub trait ArticleRepository {
    /// Inserts `article`, resolving its tags by name, and writes back the
    /// id, timestamps and stored tag rows.
    fn create(&self, ctx: &CallContext, article: &mut Article) -> RepoResult<()>;
    /// Loads one article with author and tags.
    fn get_by_id(&self, ctx: &CallContext, id: ArticleId) -> RepoResult<Article>;
    /// Persists title, description and body and replaces the tag set.
    fn update(&self, ctx: &CallContext, article: &mut Article) -> RepoResult<()>;
    /// Removes the article with its comments, tag links and favorites.
    fn delete(&self, ctx: &CallContext, id: ArticleId) -> RepoResult<()>;
    /// Comments of one article with authors, oldest first.
    fn get_comments(&self, ctx: &CallContext, article_id: ArticleId) -> RepoResult<Vec<Comment>>;
    fn create_comment(&self, ctx: &CallContext, comment: &mut Comment) -> RepoResult<()>;
    fn get_comment_by_id(&self, ctx: &CallContext, id: CommentId) -> RepoResult<Comment>;
    fn delete_comment(&self, ctx: &CallContext, id: CommentId) -> RepoResult<()>;
    /// Marks the article as favorited by the user; repeats are no-ops.
    fn add_favorite(
        &self,
        ctx: &CallContext,
        article_id: ArticleId,
        user_id: UserId,
    ) -> RepoResult<()>;
    /// Drops the favorite if present.
    fn delete_favorite(
        &self,
        ctx: &CallContext,
        article_id: ArticleId,
        user_id: UserId,
    ) -> RepoResult<()>;
    /// `false` whenever either id is missing (`None` or `0`).
    fn is_favorited(
        &self,
        ctx: &CallContext,
        article_id: Option<ArticleId>,
        user_id: Option<UserId>,
    ) -> RepoResult<bool>;
    /// Filtered listing, newest first.
    fn get_articles(
        &self,
        ctx: &CallContext,
        filter: &ArticleFilter,
        page: Page,
    ) -> RepoResult<Vec<Article>>;
    /// Total rows matching `filter`, ignoring pagination.
    fn count_articles(&self, ctx: &CallContext, filter: &ArticleFilter) -> RepoResult<u64>;
    /// Articles written by any of `author_ids`, newest first.
    fn get_feed_articles(
        &self,
        ctx: &CallContext,
        author_ids: &[UserId],
        page: Page,
    ) -> RepoResult<Vec<Article>>;
    fn count_feed_articles(&self, ctx: &CallContext, author_ids: &[UserId]) -> RepoResult<u64>;
    /// Every tag row, by name.
    fn get_tags(&self, ctx: &CallContext) -> RepoResult<Vec<Tag>>;
}

/// SQLite-backed article repository.
#[derive(Debug, Clone)]
pub struct SqliteArticleRepository {
    conn: RelationalConnection,
}

impl SqliteArticleRepository {
    pub fn new(conn: RelationalConnection) -> Self {
        Self { conn }
    }

    fn list(&self, ctx: &CallContext, select: &SelectBuilder) -> RepoResult<Vec<Article>> {
        self.conn.run(ctx, |conn| -> RepoResult<Vec<Article>> {
            let mut stmt = conn.prepare(select.sql())?;
            let mut rows = stmt.query(select.params())?;
            let mut articles = Vec::new();
            while let Some(row) = rows.next()? {
                articles.push(parse_article_row(row)?);
            }
            Ok(articles)
        })
    }

    fn count(&self, ctx: &CallContext, select: &SelectBuilder) -> RepoResult<u64> {
        self.conn.run(ctx, |conn| -> RepoResult<u64> {
            let count: i64 = conn.query_row(select.sql(), select.params(), |row| row.get(0))?;
            u64::try_from(count)
                .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
        })
    }
}

impl ArticleRepository for SqliteArticleRepository {
    fn create(&self, ctx: &CallContext, article: &mut Article) -> RepoResult<()> {
        let tag_names = normalize_tags(article.tags.iter().map(|tag| tag.name.as_str()));
        let now = now_millis();

        let (id, tags) =
            self.conn
                .run_in_transaction(ctx, |tx| -> RepoResult<(ArticleId, Vec<Tag>)> {
                    ensure_user_exists(tx, article.author_id)?;
                    tx.execute(
                        "INSERT INTO articles (
                            author_id,
                            title,
                            description,
                            body,
                            favorites_count,
                            created_at,
                            updated_at
                        ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5);",
                        params![
                            article.author_id,
                            article.title.as_str(),
                            article.description.as_str(),
                            article.body.as_str(),
                            now,
                        ],
                    )?;
                    let id = tx.last_insert_rowid();
                    let tags = link_tags(tx, id, &tag_names, now)?;
                    Ok((id, tags))
                })?;

        article.id = id;
        article.tags = tags;
        article.favorites_count = 0;
        article.created_at = now;
        article.updated_at = now;
        info!(
            "event=article_create module=repo status=ok article_id={id} author_id={} tag_count={}",
            article.author_id,
            article.tags.len()
        );
        Ok(())
    }

    fn get_by_id(&self, ctx: &CallContext, id: ArticleId) -> RepoResult<Article> {
        self.conn.run(ctx, |conn| -> RepoResult<Article> {
            let mut stmt = conn.prepare(&format!("{} WHERE a.id = ?1;", *ARTICLE_SELECT_SQL))?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => parse_article_row(row),
                None => Err(RepoError::not_found("article", id)),
            }
        })
    }

    fn update(&self, ctx: &CallContext, article: &mut Article) -> RepoResult<()> {
        let tag_names = normalize_tags(article.tags.iter().map(|tag| tag.name.as_str()));
        let now = now_millis();

        let tags = self
            .conn
            .run_in_transaction(ctx, |tx| -> RepoResult<Vec<Tag>> {
                let changed = tx.execute(
                    "UPDATE articles
                     SET
                        title = ?1,
                        description = ?2,
                        body = ?3,
                        updated_at = ?4
                     WHERE id = ?5;",
                    params![
                        article.title.as_str(),
                        article.description.as_str(),
                        article.body.as_str(),
                        now,
                        article.id,
                    ],
                )?;
                if changed == 0 {
                    return Err(RepoError::not_found("article", article.id));
                }

                tx.execute("DELETE FROM article_tags WHERE article_id = ?1;", [article.id])?;
                link_tags(tx, article.id, &tag_names, now)
            })?;

        article.tags = tags;
        article.updated_at = now;
        debug!(
            "event=article_update module=repo status=ok article_id={} tag_count={}",
            article.id,
            article.tags.len()
        );
        Ok(())
    }

    fn delete(&self, ctx: &CallContext, id: ArticleId) -> RepoResult<()> {
        self.conn.run_in_transaction(ctx, |tx| -> RepoResult<()> {
            if purge_articles(tx, ArticleScope::ById(id))? == 0 {
                return Err(RepoError::not_found("article", id));
            }
            Ok(())
        })?;

        info!("event=article_delete module=repo status=ok article_id={id}");
        Ok(())
    }

    fn get_comments(&self, ctx: &CallContext, article_id: ArticleId) -> RepoResult<Vec<Comment>> {
        self.conn.run(ctx, |conn| -> RepoResult<Vec<Comment>> {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE c.article_id = ?1 ORDER BY c.created_at ASC, c.id ASC;",
                *COMMENT_SELECT_SQL
            ))?;
            let comments = stmt
                .query_map([article_id], parse_comment_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(comments)
        })
    }

    fn create_comment(&self, ctx: &CallContext, comment: &mut Comment) -> RepoResult<()> {
        let now = now_millis();
        let created = self.conn.run_in_transaction(ctx, |tx| -> RepoResult<Comment> {
            ensure_article_exists(tx, comment.article_id)?;
            ensure_user_exists(tx, comment.author_id)?;
            tx.execute(
                "INSERT INTO comments (body, author_id, article_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4);",
                params![
                    comment.body.as_str(),
                    comment.author_id,
                    comment.article_id,
                    now,
                ],
            )?;
            load_comment(tx, tx.last_insert_rowid())
        })?;

        *comment = created;
        debug!(
            "event=comment_create module=repo status=ok comment_id={} article_id={}",
            comment.id, comment.article_id
        );
        Ok(())
    }

    fn get_comment_by_id(&self, ctx: &CallContext, id: CommentId) -> RepoResult<Comment> {
        self.conn.run(ctx, |conn| load_comment(conn, id))
    }

    fn delete_comment(&self, ctx: &CallContext, id: CommentId) -> RepoResult<()> {
        let removed = self.conn.run(ctx, |conn| -> RepoResult<usize> {
            Ok(conn.execute("DELETE FROM comments WHERE id = ?1;", [id])?)
        })?;

        if removed == 0 {
            return Err(RepoError::not_found("comment", id));
        }
        debug!("event=comment_delete module=repo status=ok comment_id={id}");
        Ok(())
    }

    fn add_favorite(
        &self,
        ctx: &CallContext,
        article_id: ArticleId,
        user_id: UserId,
    ) -> RepoResult<()> {
        let inserted = self.conn.run_in_transaction(ctx, |tx| -> RepoResult<bool> {
            ensure_article_exists(tx, article_id)?;
            ensure_user_exists(tx, user_id)?;
            let inserted = tx.execute(
                "INSERT INTO favorite_articles (article_id, user_id, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (article_id, user_id) DO NOTHING;",
                params![article_id, user_id, now_millis()],
            )? == 1;
            // The join row decides; an existing pair must not count twice.
            if inserted {
                tx.execute(
                    "UPDATE articles SET favorites_count = favorites_count + 1 WHERE id = ?1;",
                    [article_id],
                )?;
            }
            Ok(inserted)
        })?;

        debug!(
            "event=favorite_add module=repo status=ok article_id={article_id} user_id={user_id} inserted={inserted}"
        );
        Ok(())
    }

    fn delete_favorite(
        &self,
        ctx: &CallContext,
        article_id: ArticleId,
        user_id: UserId,
    ) -> RepoResult<()> {
        let removed = self.conn.run_in_transaction(ctx, |tx| -> RepoResult<bool> {
            let removed = tx.execute(
                "DELETE FROM favorite_articles WHERE article_id = ?1 AND user_id = ?2;",
                [article_id, user_id],
            )? == 1;
            if removed {
                tx.execute(
                    "UPDATE articles
                     SET favorites_count = favorites_count - 1
                     WHERE id = ?1 AND favorites_count > 0;",
                    [article_id],
                )?;
            }
            Ok(removed)
        })?;

        debug!(
            "event=favorite_delete module=repo status=ok article_id={article_id} user_id={user_id} removed={removed}"
        );
        Ok(())
    }

    fn is_favorited(
        &self,
        ctx: &CallContext,
        article_id: Option<ArticleId>,
        user_id: Option<UserId>,
    ) -> RepoResult<bool> {
        let (Some(article_id), Some(user_id)) = (
            article_id.filter(|id| *id != 0),
            user_id.filter(|id| *id != 0),
        ) else {
            return Ok(false);
        };

        self.conn.run(ctx, |conn| {
            row_exists(
                conn,
                "SELECT EXISTS(
                    SELECT 1
                    FROM favorite_articles
                    WHERE article_id = ?1 AND user_id = ?2
                );",
                [article_id, user_id],
            )
        })
    }

    fn get_articles(
        &self,
        ctx: &CallContext,
        filter: &ArticleFilter,
        page: Page,
    ) -> RepoResult<Vec<Article>> {
        let mut select = SelectBuilder::new(&ARTICLE_SELECT_SQL);
        apply_article_filter(&mut select, filter);
        select.order_newest_first("a").paginate(page);
        self.list(ctx, &select)
    }

    fn count_articles(&self, ctx: &CallContext, filter: &ArticleFilter) -> RepoResult<u64> {
        let mut select = SelectBuilder::new(ARTICLE_COUNT_SQL);
        apply_article_filter(&mut select, filter);
        self.count(ctx, &select)
    }

    fn get_feed_articles(
        &self,
        ctx: &CallContext,
        author_ids: &[UserId],
        page: Page,
    ) -> RepoResult<Vec<Article>> {
        if author_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut select = SelectBuilder::new(&ARTICLE_SELECT_SQL);
        select
            .and_in("a.author_id", author_ids)
            .order_newest_first("a")
            .paginate(page);
        self.list(ctx, &select)
    }

    fn count_feed_articles(&self, ctx: &CallContext, author_ids: &[UserId]) -> RepoResult<u64> {
        if author_ids.is_empty() {
            return Ok(0);
        }
        let mut select = SelectBuilder::new(ARTICLE_COUNT_SQL);
        select.and_in("a.author_id", author_ids);
        self.count(ctx, &select)
    }

    fn get_tags(&self, ctx: &CallContext) -> RepoResult<Vec<Tag>> {
        self.conn.run(ctx, |conn| -> RepoResult<Vec<Tag>> {
            let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name ASC;")?;
            let tags = stmt
                .query_map([], |row| {
                    Ok(Tag {
                        id: row.get("id")?,
                        name: row.get("name")?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tags)
        })
    }
}

/// Resolves each (already normalized) name to a tag row and links it.
fn link_tags(
    conn: &Connection,
    article_id: ArticleId,
    names: &[String],
    now: i64,
) -> RepoResult<Vec<Tag>> {
    let mut tags = Vec::with_capacity(names.len());
    for name in names {
        conn.execute(
            "INSERT INTO tags (name, created_at) VALUES (?1, ?2)
             ON CONFLICT (name) DO NOTHING;",
            params![name.as_str(), now],
        )?;
        let tag_id: TagId = conn.query_row(
            "SELECT id FROM tags WHERE name = ?1;",
            [name.as_str()],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO article_tags (article_id, tag_id) VALUES (?1, ?2)
             ON CONFLICT (article_id, tag_id) DO NOTHING;",
            [article_id, tag_id],
        )?;
        tags.push(Tag {
            id: tag_id,
            name: name.clone(),
        });
    }
    Ok(tags)
}

fn load_comment(conn: &Connection, id: CommentId) -> RepoResult<Comment> {
    let mut stmt = conn.prepare(&format!("{} WHERE c.id = ?1;", *COMMENT_SELECT_SQL))?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => Ok(parse_comment_row(row)?),
        None => Err(RepoError::not_found("comment", id)),
    }
}

fn parse_article_row(row: &Row<'_>) -> RepoResult<Article> {
    let author_id: UserId = row.get("author_id")?;
    let tags_json: String = row.get("tags_json")?;
    Ok(Article {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        body: row.get("body")?,
        author_id,
        author: Some(author_from_row(row, author_id)?),
        tags: tags_from_json(&tags_json)?,
        favorites_count: row.get("favorites_count")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_comment_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let author_id: UserId = row.get("author_id")?;
    Ok(Comment {
        id: row.get("id")?,
        body: row.get("body")?,
        author_id,
        article_id: row.get("article_id")?,
        author: Some(author_from_row(row, author_id)?),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
