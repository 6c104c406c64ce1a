//! Article aggregate with its owned comments and shared tags.

use super::user::{Author, UserId};
use serde::{Deserialize, Serialize};

pub type ArticleId = i64;
pub type CommentId = i64;
pub type TagId = i64;

/// Tag row shared by every article carrying its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

impl Tag {
    /// Unsaved tag; the store resolves it to an existing row by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

/// Published article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub description: String,
    pub body: String,
    pub author_id: UserId,
    /// Filled by reads; ignored by writes.
    pub author: Option<Author>,
    /// Sorted by name on reads. On writes only `name` is consulted.
    pub tags: Vec<Tag>,
    /// Mirrors the number of favorite rows; maintained by the store only.
    pub favorites_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Article {
    /// Creates an unsaved article for `author_id`.
    pub fn new(
        author_id: UserId,
        title: impl Into<String>,
        description: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            title: title.into(),
            description: description.into(),
            body: body.into(),
            author_id,
            author: None,
            tags: Vec::new(),
            favorites_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Builder-style helper attaching tags by name.
    pub fn with_tags<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = names.into_iter().map(Tag::named).collect();
        self
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|tag| tag.name.as_str()).collect()
    }
}

/// Comment owned by exactly one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub body: String,
    pub author_id: UserId,
    pub article_id: ArticleId,
    /// Filled by reads; ignored by writes.
    pub author: Option<Author>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Comment {
    pub fn new(article_id: ArticleId, author_id: UserId, body: impl Into<String>) -> Self {
        Self {
            id: 0,
            body: body.into(),
            author_id,
            article_id,
            author: None,
            created_at: 0,
            updated_at: 0,
        }
    }
}
