use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use forum_api::{
    Comment, CommentId, Community, CommunityId, CurrentUser, NotificationId, NotificationKind, NotificationRecord,
    Post, PostId, PostQuery, Profile, PushChannel, PushStream, Store, StoreError, SubjectId,
    Tally, UserId, Uuid, Vote, VoteDirection,
};
use futures::channel::mpsc;
use tokio::sync::Mutex;

/// Something going wrong with the next store call
#[derive(Clone, Debug)]
pub enum Fault {
    /// The call fails without being applied
    Unavailable,

    /// The next write is applied, but its response never makes it back.
    /// Reads leave this fault queued.
    LostResponse,

    /// Right before the next vote write, another request sets this vote
    /// (None deletes it). Non-write calls leave this fault queued.
    RacingVote {
        subject: SubjectId,
        voter: UserId,
        direction: Option<VoteDirection>,
    },

    /// The next vote tally fails. Other calls leave this fault queued.
    TallyUnavailable,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CallKind {
    Read,
    Tally,
    Write,
    VoteWrite,
}

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, Profile>,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
    communities: BTreeMap<CommunityId, Community>,
    votes: HashMap<(SubjectId, UserId), VoteDirection>,
    notifications: BTreeMap<NotificationId, NotificationRecord>,
    notification_feeds: HashMap<UserId, Vec<mpsc::UnboundedSender<NotificationRecord>>>,
    comment_feeds: HashMap<PostId, Vec<mpsc::UnboundedSender<Comment>>>,
    faults: VecDeque<Fault>,
    calls: usize,
}

impl State {
    fn set_vote(&mut self, subject: SubjectId, voter: UserId, dir: Option<VoteDirection>) {
        match dir {
            Some(d) => self.votes.insert((subject, voter), d),
            None => self.votes.remove(&(subject, voter)),
        };
    }

    fn subject_score(&mut self, s: SubjectId) -> Option<&mut i64> {
        match s {
            SubjectId::Post(p) => self.posts.get_mut(&p).map(|p| &mut p.vote_score),
            SubjectId::Comment(c) => self.comments.get_mut(&c).map(|c| &mut c.vote_score),
        }
    }

    fn notify(&mut self, user: UserId, kind: NotificationKind, message: String, link: Option<String>) {
        let rec = NotificationRecord {
            id: NotificationId(Uuid::new_v4()),
            user_id: user,
            kind,
            message,
            read: false,
            created_at: Utc::now(),
            link,
        };
        self.notifications.insert(rec.id, rec.clone());
        self.relay_notification(rec);
    }

    fn relay_notification(&mut self, rec: NotificationRecord) {
        if let Some(feeds) = self.notification_feeds.get_mut(&rec.user_id) {
            feeds.retain(|f| f.unbounded_send(rec.clone()).is_ok());
        }
    }

    fn relay_comment(&mut self, c: &Comment) {
        if let Some(feeds) = self.comment_feeds.get_mut(&c.post_id) {
            feeds.retain(|f| f.unbounded_send(c.clone()).is_ok());
        }
    }
}

/// In-memory stand-in for the hosted backend, with fault injection for tests
pub struct MockServer(Mutex<State>);

impl MockServer {
    pub fn new() -> MockServer {
        MockServer(Mutex::new(State::default()))
    }

    pub async fn admin_create_user(&self, name: &str) -> CurrentUser {
        let id = UserId(Uuid::new_v4());
        self.0.lock().await.users.insert(
            id,
            Profile {
                id,
                username: String::from(name),
                bio: None,
                avatar_url: None,
            },
        );
        CurrentUser {
            id,
            name: String::from(name),
        }
    }

    /// Queues a fault, applied to the next matching store call
    pub async fn inject(&self, f: Fault) {
        self.0.lock().await.faults.push_back(f);
    }

    /// Number of store calls served (or failed) so far
    pub async fn test_num_calls(&self) -> usize {
        self.0.lock().await.calls
    }

    pub async fn test_votes_on(&self, s: SubjectId) -> Vec<(UserId, VoteDirection)> {
        let mut res = self
            .0
            .lock()
            .await
            .votes
            .iter()
            .filter(|((subj, _), _)| *subj == s)
            .map(|((_, voter), d)| (*voter, *d))
            .collect::<Vec<_>>();
        res.sort_unstable_by_key(|(voter, _)| *voter);
        res
    }

    pub async fn test_notification(&self, id: NotificationId) -> Option<NotificationRecord> {
        self.0.lock().await.notifications.get(&id).cloned()
    }

    /// Creates a notification server-side, as a database trigger would
    pub async fn notify(&self, user: UserId, kind: NotificationKind, message: &str) {
        self.0
            .lock()
            .await
            .notify(user, kind, String::from(message), None);
    }

    /// Sends an already-existing notification down the feeds again
    pub async fn redeliver(&self, id: NotificationId) {
        let mut state = self.0.lock().await;
        if let Some(rec) = state.notifications.get(&id).cloned() {
            state.relay_notification(rec);
        }
    }

    async fn call<T>(
        &self,
        kind: CallKind,
        f: impl FnOnce(&mut State) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        // Give concurrent requests a chance to interleave, as over the network
        tokio::task::yield_now().await;
        let mut state = self.0.lock().await;
        state.calls += 1;
        let fault = match state.faults.front() {
            Some(Fault::RacingVote { .. }) if kind != CallKind::VoteWrite => None,
            Some(Fault::LostResponse) if matches!(kind, CallKind::Read | CallKind::Tally) => None,
            Some(Fault::TallyUnavailable) if kind != CallKind::Tally => None,
            Some(_) => state.faults.pop_front(),
            None => None,
        };
        match fault {
            None => f(&mut state),
            Some(Fault::Unavailable | Fault::TallyUnavailable) => {
                tracing::debug!(?kind, "injecting unavailability");
                Err(StoreError::Unavailable(String::from("injected fault")))
            }
            Some(Fault::LostResponse) => {
                tracing::debug!(?kind, "injecting lost response");
                f(&mut state)?;
                Err(StoreError::Unavailable(String::from("injected lost response")))
            }
            Some(Fault::RacingVote {
                subject,
                voter,
                direction,
            }) => {
                tracing::debug!(?subject, ?direction, "injecting racing vote");
                state.set_vote(subject, voter, direction);
                f(&mut state)
            }
        }
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

#[async_trait]
impl Store for MockServer {
    async fn fetch_subject_score(&self, s: SubjectId) -> Result<Option<i64>, StoreError> {
        self.call(CallKind::Read, |st| Ok(st.subject_score(s).map(|s| *s)))
            .await
    }

    async fn fetch_vote(
        &self,
        s: SubjectId,
        voter: UserId,
    ) -> Result<Option<VoteDirection>, StoreError> {
        self.call(CallKind::Read, |st| Ok(st.votes.get(&(s, voter)).copied()))
            .await
    }

    async fn insert_vote(&self, v: Vote) -> Result<(), StoreError> {
        self.call(CallKind::VoteWrite, |st| {
            if st.subject_score(v.subject).is_none() {
                return Err(StoreError::NotFound(v.subject));
            }
            if st.votes.contains_key(&(v.subject, v.voter)) {
                return Err(StoreError::Conflict);
            }
            st.set_vote(v.subject, v.voter, Some(v.direction));
            Ok(())
        })
        .await
    }

    async fn update_vote(&self, v: Vote, expected: VoteDirection) -> Result<(), StoreError> {
        self.call(CallKind::VoteWrite, |st| {
            match st.votes.get_mut(&(v.subject, v.voter)) {
                Some(d) if *d == expected => {
                    *d = v.direction;
                    Ok(())
                }
                _ => Err(StoreError::Conflict),
            }
        })
        .await
    }

    async fn delete_vote(
        &self,
        s: SubjectId,
        voter: UserId,
        expected: VoteDirection,
    ) -> Result<(), StoreError> {
        self.call(CallKind::VoteWrite, |st| match st.votes.get(&(s, voter)) {
            Some(d) if *d == expected => {
                st.votes.remove(&(s, voter));
                Ok(())
            }
            _ => Err(StoreError::Conflict),
        })
        .await
    }

    async fn tally_votes(&self, s: SubjectId) -> Result<Tally, StoreError> {
        self.call(CallKind::Tally, |st| {
            Ok(st
                .votes
                .iter()
                .filter(|((subj, _), _)| *subj == s)
                .map(|(_, d)| *d)
                .collect())
        })
        .await
    }

    async fn set_vote_score(&self, s: SubjectId, score: i64) -> Result<(), StoreError> {
        self.call(CallKind::Write, |st| match st.subject_score(s) {
            Some(cached) => {
                *cached = score;
                Ok(())
            }
            None => Err(StoreError::NotFound(s)),
        })
        .await
    }

    async fn fetch_post(&self, p: PostId) -> Result<Option<Post>, StoreError> {
        self.call(CallKind::Read, |st| Ok(st.posts.get(&p).cloned()))
            .await
    }

    async fn fetch_posts(&self, q: &PostQuery) -> Result<Vec<Post>, StoreError> {
        self.call(CallKind::Read, |st| Ok(q.apply(st.posts.values().cloned())))
            .await
    }

    async fn insert_post(&self, p: Post) -> Result<(), StoreError> {
        self.call(CallKind::Write, |st| {
            if st.posts.contains_key(&p.id) {
                return Err(StoreError::Conflict);
            }
            st.posts.insert(p.id, p);
            Ok(())
        })
        .await
    }

    async fn fetch_comments(&self, p: PostId) -> Result<Vec<Comment>, StoreError> {
        self.call(CallKind::Read, |st| {
            Ok(st
                .comments
                .values()
                .filter(|c| c.post_id == p)
                .cloned()
                .collect())
        })
        .await
    }

    async fn insert_comment(&self, c: Comment) -> Result<(), StoreError> {
        self.call(CallKind::Write, |st| {
            let post_author = match st.posts.get(&c.post_id) {
                Some(post) => post.author_id,
                None => return Err(StoreError::NotFound(SubjectId::Post(c.post_id))),
            };
            if st.comments.contains_key(&c.id) {
                return Err(StoreError::Conflict);
            }
            let link = Some(format!("/post/{}", c.post_id.0));
            let parent_author = c
                .parent_id
                .and_then(|p| st.comments.get(&p))
                .map(|p| p.author_id);
            match parent_author {
                Some(a) if a != c.author_id => st.notify(
                    a,
                    NotificationKind::Comment,
                    format!("u/{} replied to your comment", c.author_name),
                    link,
                ),
                None if post_author != c.author_id => st.notify(
                    post_author,
                    NotificationKind::Comment,
                    format!("u/{} commented on your post", c.author_name),
                    link,
                ),
                _ => (),
            }
            st.relay_comment(&c);
            st.comments.insert(c.id, c);
            Ok(())
        })
        .await
    }

    async fn count_comments(&self, p: PostId) -> Result<i64, StoreError> {
        self.call(CallKind::Read, |st| {
            Ok(st.comments.values().filter(|c| c.post_id == p).count() as i64)
        })
        .await
    }

    async fn set_comment_count(&self, p: PostId, count: i64) -> Result<(), StoreError> {
        self.call(CallKind::Write, |st| match st.posts.get_mut(&p) {
            Some(post) => {
                post.comment_count = count;
                Ok(())
            }
            None => Err(StoreError::NotFound(SubjectId::Post(p))),
        })
        .await
    }

    async fn fetch_notifications(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        self.call(CallKind::Read, |st| {
            let mut res = st
                .notifications
                .values()
                .filter(|n| n.user_id == user)
                .cloned()
                .collect::<Vec<_>>();
            res.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            res.truncate(limit);
            Ok(res)
        })
        .await
    }

    async fn mark_notification_read(
        &self,
        user: UserId,
        id: NotificationId,
    ) -> Result<(), StoreError> {
        self.call(CallKind::Write, |st| {
            if let Some(n) = st.notifications.get_mut(&id) {
                if n.user_id == user {
                    n.read = true;
                }
            }
            Ok(())
        })
        .await
    }

    async fn mark_all_notifications_read(&self, user: UserId) -> Result<(), StoreError> {
        self.call(CallKind::Write, |st| {
            for n in st.notifications.values_mut() {
                if n.user_id == user {
                    n.read = true;
                }
            }
            Ok(())
        })
        .await
    }

    async fn fetch_communities(&self) -> Result<Vec<Community>, StoreError> {
        self.call(CallKind::Read, |st| {
            let mut res = st.communities.values().cloned().collect::<Vec<_>>();
            res.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(res)
        })
        .await
    }

    async fn fetch_community(&self, name: &str) -> Result<Option<Community>, StoreError> {
        self.call(CallKind::Read, |st| {
            Ok(st.communities.values().find(|c| c.name == name).cloned())
        })
        .await
    }

    async fn insert_community(&self, c: Community) -> Result<(), StoreError> {
        self.call(CallKind::Write, |st| {
            if st
                .communities
                .values()
                .any(|o| o.id == c.id || o.name == c.name)
            {
                return Err(StoreError::Conflict);
            }
            st.communities.insert(c.id, c);
            Ok(())
        })
        .await
    }

    async fn fetch_profile(&self, username: &str) -> Result<Option<Profile>, StoreError> {
        self.call(CallKind::Read, |st| {
            Ok(st.users.values().find(|u| u.username == username).cloned())
        })
        .await
    }

    async fn upsert_profile(&self, p: Profile) -> Result<(), StoreError> {
        self.call(CallKind::Write, |st| {
            st.users.insert(p.id, p);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PushChannel for MockServer {
    async fn subscribe_notifications(
        &self,
        user: UserId,
    ) -> Result<PushStream<NotificationRecord>, StoreError> {
        let (sender, receiver) = mpsc::unbounded();
        self.0
            .lock()
            .await
            .notification_feeds
            .entry(user)
            .or_insert_with(Vec::new)
            .push(sender);
        Ok(Box::pin(receiver))
    }

    async fn subscribe_comments(&self, post: PostId) -> Result<PushStream<Comment>, StoreError> {
        let (sender, receiver) = mpsc::unbounded();
        self.0
            .lock()
            .await
            .comment_feeds
            .entry(post)
            .or_insert_with(Vec::new)
            .push(sender);
        Ok(Box::pin(receiver))
    }
}
