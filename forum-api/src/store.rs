use async_trait::async_trait;

use crate::{
    Comment, Community, NotificationId, NotificationRecord, Post, PostId, PostQuery, Profile, SubjectId,
    Tally, UserId, Vote, VoteDirection,
};

/// Failure classification every `Store` implementation must map its backend errors into
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient failure (network, timeout, 5xx), the request may be retried
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A conditional write found the row in another state than expected
    #[error("conflicting write")]
    Conflict,

    #[error("{0} not found")]
    NotFound(SubjectId),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The hosted backend, as seen by the client core.
///
/// Vote writes are conditional: `insert_vote` must fail with `Conflict` if a vote
/// already exists for the pair, and `update_vote` / `delete_vote` must fail with
/// `Conflict` if the current direction is not `expected`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the cached score of the subject, or None if it does not exist
    async fn fetch_subject_score(&self, s: SubjectId) -> Result<Option<i64>, StoreError>;
    async fn fetch_vote(
        &self,
        s: SubjectId,
        voter: UserId,
    ) -> Result<Option<VoteDirection>, StoreError>;
    async fn insert_vote(&self, v: Vote) -> Result<(), StoreError>;
    async fn update_vote(&self, v: Vote, expected: VoteDirection) -> Result<(), StoreError>;
    async fn delete_vote(
        &self,
        s: SubjectId,
        voter: UserId,
        expected: VoteDirection,
    ) -> Result<(), StoreError>;
    async fn tally_votes(&self, s: SubjectId) -> Result<Tally, StoreError>;
    async fn set_vote_score(&self, s: SubjectId, score: i64) -> Result<(), StoreError>;

    async fn fetch_post(&self, p: PostId) -> Result<Option<Post>, StoreError>;
    async fn fetch_posts(&self, q: &PostQuery) -> Result<Vec<Post>, StoreError>;
    async fn insert_post(&self, p: Post) -> Result<(), StoreError>;

    /// Comments of a post, flat, in any order
    async fn fetch_comments(&self, p: PostId) -> Result<Vec<Comment>, StoreError>;
    async fn insert_comment(&self, c: Comment) -> Result<(), StoreError>;
    async fn count_comments(&self, p: PostId) -> Result<i64, StoreError>;
    async fn set_comment_count(&self, p: PostId, count: i64) -> Result<(), StoreError>;

    /// Newest first
    async fn fetch_notifications(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError>;
    async fn mark_notification_read(
        &self,
        user: UserId,
        id: NotificationId,
    ) -> Result<(), StoreError>;
    async fn mark_all_notifications_read(&self, user: UserId) -> Result<(), StoreError>;

    /// Newest first
    async fn fetch_communities(&self) -> Result<Vec<Community>, StoreError>;
    async fn fetch_community(&self, name: &str) -> Result<Option<Community>, StoreError>;

    /// Fails with `Conflict` if a community with the same id or name exists
    async fn insert_community(&self, c: Community) -> Result<(), StoreError>;

    async fn fetch_profile(&self, username: &str) -> Result<Option<Profile>, StoreError>;

    /// Creates the profile row, or replaces the existing one with the same id
    async fn upsert_profile(&self, p: Profile) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: ?Sized + Store> Store for std::sync::Arc<S> {
    async fn fetch_subject_score(&self, s: SubjectId) -> Result<Option<i64>, StoreError> {
        (**self).fetch_subject_score(s).await
    }

    async fn fetch_vote(
        &self,
        s: SubjectId,
        voter: UserId,
    ) -> Result<Option<VoteDirection>, StoreError> {
        (**self).fetch_vote(s, voter).await
    }

    async fn insert_vote(&self, v: Vote) -> Result<(), StoreError> {
        (**self).insert_vote(v).await
    }

    async fn update_vote(&self, v: Vote, expected: VoteDirection) -> Result<(), StoreError> {
        (**self).update_vote(v, expected).await
    }

    async fn delete_vote(
        &self,
        s: SubjectId,
        voter: UserId,
        expected: VoteDirection,
    ) -> Result<(), StoreError> {
        (**self).delete_vote(s, voter, expected).await
    }

    async fn tally_votes(&self, s: SubjectId) -> Result<Tally, StoreError> {
        (**self).tally_votes(s).await
    }

    async fn set_vote_score(&self, s: SubjectId, score: i64) -> Result<(), StoreError> {
        (**self).set_vote_score(s, score).await
    }

    async fn fetch_post(&self, p: PostId) -> Result<Option<Post>, StoreError> {
        (**self).fetch_post(p).await
    }

    async fn fetch_posts(&self, q: &PostQuery) -> Result<Vec<Post>, StoreError> {
        (**self).fetch_posts(q).await
    }

    async fn insert_post(&self, p: Post) -> Result<(), StoreError> {
        (**self).insert_post(p).await
    }

    async fn fetch_comments(&self, p: PostId) -> Result<Vec<Comment>, StoreError> {
        (**self).fetch_comments(p).await
    }

    async fn insert_comment(&self, c: Comment) -> Result<(), StoreError> {
        (**self).insert_comment(c).await
    }

    async fn count_comments(&self, p: PostId) -> Result<i64, StoreError> {
        (**self).count_comments(p).await
    }

    async fn set_comment_count(&self, p: PostId, count: i64) -> Result<(), StoreError> {
        (**self).set_comment_count(p, count).await
    }

    async fn fetch_notifications(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        (**self).fetch_notifications(user, limit).await
    }

    async fn mark_notification_read(
        &self,
        user: UserId,
        id: NotificationId,
    ) -> Result<(), StoreError> {
        (**self).mark_notification_read(user, id).await
    }

    async fn mark_all_notifications_read(&self, user: UserId) -> Result<(), StoreError> {
        (**self).mark_all_notifications_read(user).await
    }

    async fn fetch_communities(&self) -> Result<Vec<Community>, StoreError> {
        (**self).fetch_communities().await
    }

    async fn fetch_community(&self, name: &str) -> Result<Option<Community>, StoreError> {
        (**self).fetch_community(name).await
    }

    async fn insert_community(&self, c: Community) -> Result<(), StoreError> {
        (**self).insert_community(c).await
    }

    async fn fetch_profile(&self, username: &str) -> Result<Option<Profile>, StoreError> {
        (**self).fetch_profile(username).await
    }

    async fn upsert_profile(&self, p: Profile) -> Result<(), StoreError> {
        (**self).upsert_profile(p).await
    }
}
