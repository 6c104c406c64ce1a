//! Query helpers shared by the user and article repositories.
//!
//! # Responsibility
//! - Pagination and filter types for list queries.
//! - Incremental SQL builder with positional binds.
//! - Eager-load fragments: author join columns and aggregated tag lists.
//! - Ordered cascade removal of articles and their child rows.
//!
//! # Invariants
//! - List ordering is always `created_at DESC, id DESC`.
//! - Page limits default to 20 and clamp to 100.
//! - Tag names are trimmed, lowercased and deduplicated before storage.

use super::error::{RepoError, RepoResult};
use crate::model::article::Tag;
use crate::model::user::Author;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Params, Row};
use std::collections::BTreeSet;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Author projection columns; expects `users` joined as `u`.
pub(crate) const AUTHOR_COLUMNS: &str =
    "u.username AS author_username, u.bio AS author_bio, u.image AS author_image";

/// Tag list of article alias `a`, aggregated as a JSON array in the same row.
pub(crate) const TAGS_JSON_COLUMN: &str = "COALESCE((
        SELECT json_group_array(json_object('id', t.id, 'name', t.name))
        FROM article_tags at
        INNER JOIN tags t ON t.id = at.tag_id
        WHERE at.article_id = a.id
    ), '[]') AS tags_json";

/// Limit/offset window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    /// Missing or zero limits fall back to the default; large ones clamp.
    pub fn new(limit: Option<u32>, offset: u32) -> Self {
        let limit = match limit {
            None | Some(0) => DEFAULT_PAGE_LIMIT,
            Some(value) if value > MAX_PAGE_LIMIT => MAX_PAGE_LIMIT,
            Some(value) => value,
        };
        Self { limit, offset }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, 0)
    }
}

/// Optional article list filters; every present filter must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    /// Tag name the article must carry.
    pub tag: Option<String>,
    /// Username of the author.
    pub author: Option<String>,
    /// Username of a user who favorited the article.
    pub favorited_by: Option<String>,
}

impl ArticleFilter {
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn by_author(mut self, username: impl Into<String>) -> Self {
        self.author = Some(username.into());
        self
    }

    pub fn favorited_by(mut self, username: impl Into<String>) -> Self {
        self.favorited_by = Some(username.into());
        self
    }
}

/// Normalizes one tag name; blank names yield `None`.
pub fn normalize_tag(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes, deduplicates and sorts tag names.
pub fn normalize_tags<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names
        .into_iter()
        .filter_map(normalize_tag)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `SELECT` text plus positional bind values, extended clause by clause.
#[derive(Debug)]
pub(crate) struct SelectBuilder {
    sql: String,
    binds: Vec<Value>,
}

impl SelectBuilder {
    pub(crate) fn new(base: &str) -> Self {
        Self {
            sql: format!("{base} WHERE 1 = 1"),
            binds: Vec::new(),
        }
    }

    /// Appends `AND <clause>`; `clause` must use one `?` per value.
    pub(crate) fn and_where(
        &mut self,
        clause: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> &mut Self {
        self.sql.push_str(" AND ");
        self.sql.push_str(clause);
        self.binds.extend(values);
        self
    }

    /// Appends `AND <column> IN (...)` with the ids bound as one JSON array,
    /// so the id count never runs into SQLite's bound-variable limit.
    pub(crate) fn and_in(&mut self, column: &str, ids: &[i64]) -> &mut Self {
        let ids_json = serde_json::Value::from(ids.to_vec()).to_string();
        self.and_where(
            &format!("{column} IN (SELECT value FROM json_each(?))"),
            [Value::Text(ids_json)],
        )
    }

    pub(crate) fn order_newest_first(&mut self, alias: &str) -> &mut Self {
        self.sql
            .push_str(&format!(" ORDER BY {alias}.created_at DESC, {alias}.id DESC"));
        self
    }

    pub(crate) fn paginate(&mut self, page: Page) -> &mut Self {
        self.sql.push_str(" LIMIT ? OFFSET ?");
        self.binds.push(Value::Integer(i64::from(page.limit)));
        self.binds.push(Value::Integer(i64::from(page.offset)));
        self
    }

    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn params(&self) -> impl Params + '_ {
        params_from_iter(self.binds.iter())
    }
}

/// Adds the `ArticleFilter` clauses for article alias `a` joined with author `u`.
pub(crate) fn apply_article_filter(select: &mut SelectBuilder, filter: &ArticleFilter) {
    if let Some(tag) = filter.tag.as_deref() {
        // A blank tag can never match a stored (normalized) name.
        let name = normalize_tag(tag).unwrap_or_default();
        select.and_where(
            "EXISTS (
                SELECT 1
                FROM article_tags at
                INNER JOIN tags t ON t.id = at.tag_id
                WHERE at.article_id = a.id
                  AND t.name = ?
            )",
            [Value::Text(name)],
        );
    }

    if let Some(author) = filter.author.as_deref() {
        select.and_where("u.username = ?", [Value::Text(author.to_string())]);
    }

    if let Some(username) = filter.favorited_by.as_deref() {
        select.and_where(
            "EXISTS (
                SELECT 1
                FROM favorite_articles fa
                INNER JOIN users fu ON fu.id = fa.user_id
                WHERE fa.article_id = a.id
                  AND fu.username = ?
            )",
            [Value::Text(username.to_string())],
        );
    }
}

/// Reads the [`AUTHOR_COLUMNS`] projection.
pub(crate) fn author_from_row(row: &Row<'_>, author_id: i64) -> rusqlite::Result<Author> {
    Ok(Author {
        id: author_id,
        username: row.get("author_username")?,
        bio: row.get("author_bio")?,
        image: row.get("author_image")?,
    })
}

/// Decodes the [`TAGS_JSON_COLUMN`] value, sorted by name.
pub(crate) fn tags_from_json(raw: &str) -> RepoResult<Vec<Tag>> {
    let mut tags: Vec<Tag> = serde_json::from_str(raw)
        .map_err(|err| RepoError::InvalidData(format!("invalid tag list `{raw}`: {err}")))?;
    tags.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(tags)
}

/// Returns the first-column integers produced by `sql`.
pub(crate) fn query_ids(conn: &Connection, sql: &str, params: impl Params) -> RepoResult<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map(params, |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Evaluates `SELECT EXISTS(...)`-shaped SQL.
pub(crate) fn row_exists(conn: &Connection, sql: &str, params: impl Params) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(exists == 1)
}

/// Fails with `NotFound` unless the user row exists.
pub(crate) fn ensure_user_exists(conn: &Connection, user_id: i64) -> RepoResult<()> {
    if row_exists(
        conn,
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1);",
        [user_id],
    )? {
        Ok(())
    } else {
        Err(RepoError::not_found("user", user_id))
    }
}

/// Fails with `NotFound` unless the article row exists.
pub(crate) fn ensure_article_exists(conn: &Connection, article_id: i64) -> RepoResult<()> {
    if row_exists(
        conn,
        "SELECT EXISTS(SELECT 1 FROM articles WHERE id = ?1);",
        [article_id],
    )? {
        Ok(())
    } else {
        Err(RepoError::not_found("article", article_id))
    }
}

/// Which articles a cascade removes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ArticleScope {
    ById(i64),
    ByAuthor(i64),
}

impl ArticleScope {
    fn clause(self) -> (&'static str, i64) {
        match self {
            Self::ById(id) => ("id = ?1", id),
            Self::ByAuthor(author_id) => ("author_id = ?1", author_id),
        }
    }
}

/// Deletes articles in `scope` after their favorites, tag links and comments.
///
/// Must run inside a transaction. Returns the number of article rows removed.
pub(crate) fn purge_articles(conn: &Connection, scope: ArticleScope) -> RepoResult<usize> {
    let (clause, key) = scope.clause();
    for child in ["favorite_articles", "article_tags", "comments"] {
        conn.execute(
            &format!(
                "DELETE FROM {child}
                 WHERE article_id IN (SELECT id FROM articles WHERE {clause});"
            ),
            [key],
        )?;
    }
    let removed = conn.execute(&format!("DELETE FROM articles WHERE {clause};"), [key])?;
    Ok(removed)
}
