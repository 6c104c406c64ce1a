//! User aggregate.
//!
//! The follow graph and the favorite set are not embedded here; they are
//! read through `UserRepository` so loading a user never drags its
//! relationships along.

use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// Registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Globally unique.
    pub username: String,
    /// Globally unique.
    pub email: String,
    /// Opaque credential bytes; never interpreted nor serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: Vec<u8>,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    /// Creates an unsaved user.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: 0,
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            bio: None,
            image: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }
}

/// Public projection of a user, eager-loaded next to articles and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub username: String,
    pub bio: Option<String>,
    pub image: Option<String>,
}

impl From<&User> for Author {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            bio: user.bio.clone(),
            image: user.image.clone(),
        }
    }
}
