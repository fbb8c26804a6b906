use std::collections::HashSet;

use crate::{
    api::{Error, NotificationId, NotificationRecord, PushChannel, PushStream, Store, UserId},
    retry::{retrying, Budget},
    ClientConfig,
};

/// A user's notifications, newest first, with the number of unread ones.
///
/// Fed both by batch loads and by the push channel, which may deliver
/// duplicates and may race with loads.
#[derive(Clone, Debug, Default)]
pub struct NotificationFeed {
    notifications: Vec<NotificationRecord>,
    unread: usize,

    /// Pushes received since the last load, merged into the next one
    pushed_since_load: Vec<NotificationRecord>,

    /// Notifications marked read here, which a batch fetched earlier may still show unread
    read_locally: HashSet<NotificationId>,
}

impl NotificationFeed {
    pub fn new() -> NotificationFeed {
        NotificationFeed::default()
    }

    pub fn notifications(&self) -> &[NotificationRecord] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    /// Replaces the held notifications with `batch`.
    ///
    /// Pushes received since the previous load that are missing from `batch` are
    /// kept, as the batch may have been fetched before they were created.
    pub fn load(&mut self, batch: Vec<NotificationRecord>) {
        let mut notifications = batch;
        notifications.extend(self.pushed_since_load.drain(..));
        let mut ids = HashSet::new();
        notifications.retain(|n| ids.insert(n.id));
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        for n in notifications.iter_mut() {
            if n.read {
                // the server caught up, no need to remember it any longer
                self.read_locally.remove(&n.id);
            } else if self.read_locally.contains(&n.id) {
                n.read = true;
            }
        }
        // ids that left the fetched window would never be reported read again
        self.read_locally.retain(|id| ids.contains(id));

        self.unread = notifications.iter().filter(|n| !n.read).count();
        self.notifications = notifications;
    }

    /// Does nothing if `id` is not held
    pub fn mark_read(&mut self, id: NotificationId) {
        if let Some(n) = self.notifications.iter_mut().find(|n| n.id == id) {
            self.read_locally.insert(id);
            if !n.read {
                n.read = true;
                self.unread = self.unread.saturating_sub(1);
            }
        }
    }

    pub fn mark_all_read(&mut self) {
        for n in self.notifications.iter_mut() {
            n.read = true;
            self.read_locally.insert(n.id);
        }
        self.unread = 0;
    }

    /// Returns whether the record was new
    pub fn receive_push(&mut self, mut record: NotificationRecord) -> bool {
        if self.notifications.iter().any(|n| n.id == record.id) {
            tracing::trace!(id = ?record.id, "ignoring duplicate notification push");
            return false;
        }
        if self.read_locally.contains(&record.id) {
            record.read = true;
        }
        if !record.read {
            self.unread += 1;
        }
        self.pushed_since_load.push(record.clone());
        self.notifications.insert(0, record);
        true
    }
}

/// Keeps a `NotificationFeed` in sync with the store for one user
pub struct NotificationCenter<S> {
    store: S,
    user: UserId,
    config: ClientConfig,
    feed: NotificationFeed,
}

impl<S: Store> NotificationCenter<S> {
    pub fn new(store: S, user: UserId, config: ClientConfig) -> NotificationCenter<S> {
        NotificationCenter {
            store,
            user,
            config,
            feed: NotificationFeed::new(),
        }
    }

    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    pub async fn subscribe<P: PushChannel>(
        &self,
        push: &P,
    ) -> Result<PushStream<NotificationRecord>, Error> {
        Ok(push.subscribe_notifications(self.user).await?)
    }

    pub async fn refresh(&mut self) -> Result<(), Error> {
        let store = &self.store;
        let (user, limit) = (self.user, self.config.notification_limit);
        let batch = retrying(
            "fetching notifications",
            Budget::unavailable(&self.config),
            || async move { Ok::<_, Error>(store.fetch_notifications(user, limit).await?) },
        )
        .await?;
        tracing::debug!(count = batch.len(), "loaded notifications");
        self.feed.load(batch);
        Ok(())
    }

    /// Persists the read flag, then updates the feed
    pub async fn mark_read(&mut self, id: NotificationId) -> Result<(), Error> {
        let store = &self.store;
        let user = self.user;
        retrying(
            "marking notification read",
            Budget::unavailable(&self.config),
            || async move { Ok::<_, Error>(store.mark_notification_read(user, id).await?) },
        )
        .await?;
        self.feed.mark_read(id);
        Ok(())
    }

    pub async fn mark_all_read(&mut self) -> Result<(), Error> {
        let store = &self.store;
        let user = self.user;
        retrying(
            "marking all notifications read",
            Budget::unavailable(&self.config),
            || async move { Ok::<_, Error>(store.mark_all_notifications_read(user).await?) },
        )
        .await?;
        self.feed.mark_all_read();
        Ok(())
    }

    /// Returns whether the record was new to the feed
    pub fn receive_push(&mut self, record: NotificationRecord) -> bool {
        if record.user_id != self.user {
            tracing::warn!(id = ?record.id, "ignoring notification pushed for another user");
            return false;
        }
        self.feed.receive_push(record)
    }
}
