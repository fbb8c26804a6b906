use chrono::Utc;
use uuid::Uuid;

use crate::{CurrentUser, Error, Time, UserId, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct PostId(pub Uuid);

impl PostId {
    pub fn stub() -> PostId {
        PostId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub author_name: String,
    pub created_at: Time,

    pub title: String,
    pub content: String,

    /// Community the post was submitted to, if any
    #[serde(default)]
    pub community: Option<String>,

    /// Cached aggregate, recomputed from the votes table after each vote
    #[serde(default)]
    pub vote_score: i64,

    /// Cached aggregate, recomputed from the comments table after each comment
    #[serde(default)]
    pub comment_count: i64,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub community: Option<String>,
}

impl NewPost {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_content("post title", &self.title)?;
        crate::validate_string(&self.content)?;
        if let Some(c) = &self.community {
            crate::validate_string(c)?;
        }
        Ok(())
    }

    pub fn into_post(self, author: &CurrentUser) -> Post {
        Post {
            id: PostId(Uuid::new_v4()),
            author_id: author.id,
            author_name: author.name.clone(),
            created_at: Utc::now(),
            title: self.title.trim().to_string(),
            content: self.content,
            community: self.community,
            vote_score: 0,
            comment_count: 0,
        }
    }
}
