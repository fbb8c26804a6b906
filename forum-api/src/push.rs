use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{Comment, NotificationRecord, PostId, StoreError, UserId};

pub type PushStream<T> = Pin<Box<dyn Send + Stream<Item = T>>>;

/// Realtime change feed of the backend.
///
/// Streams are unbounded and may deliver duplicates. Dropping a stream unsubscribes.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn subscribe_notifications(
        &self,
        user: UserId,
    ) -> Result<PushStream<NotificationRecord>, StoreError>;

    async fn subscribe_comments(&self, post: PostId) -> Result<PushStream<Comment>, StoreError>;
}
