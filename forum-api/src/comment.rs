use chrono::Utc;
use uuid::Uuid;

use crate::{CurrentUser, Error, PostId, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

/// A comment as stored, flat: the tree shape only exists client-side
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,

    /// None for top-level comments. May reference a comment that no longer exists.
    #[serde(default)]
    pub parent_id: Option<CommentId>,

    pub author_id: UserId,
    pub author_name: String,
    pub created_at: Time,
    pub content: String,

    /// Cached aggregate, recomputed from the votes table after each vote
    #[serde(default)]
    pub vote_score: i64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub content: String,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_content("comment", &self.content)
    }

    pub fn into_comment(self, author: &CurrentUser) -> Comment {
        Comment {
            id: CommentId(Uuid::new_v4()),
            post_id: self.post_id,
            parent_id: self.parent_id,
            author_id: author.id,
            author_name: author.name.clone(),
            created_at: Utc::now(),
            content: self.content.trim().to_string(),
            vote_score: 0,
        }
    }
}
