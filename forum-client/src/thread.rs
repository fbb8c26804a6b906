use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    api::{
        Auth, Comment, Community, Error, NewComment, NewCommunity, NewPost, Post, PostId,
        PostQuery, Profile, ProfileUpdate, PushChannel, PushStream, Store, SubjectId,
        VoteDirection,
    },
    comment,
    retry::{retrying, Budget},
    ClientConfig, CommentNode, Generation, GenerationCounter, ThreadOrder, Transition,
    VoteOutcome,
};

/// A vote shown optimistically while the ledger works on it
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PendingVote {
    generation: Generation,
    pub subject: SubjectId,
    pub transition: Transition,
    previous_score: i64,
}

/// View-model of a post page: the post, its comment forest, and the user's votes.
///
/// Responses are matched against generation tokens, so that results of requests
/// issued before a refetch, or before the page was left, are dropped.
#[derive(Debug)]
pub struct PostThread {
    post: Post,
    comments: Vec<Comment>,
    forest: Vec<CommentNode>,
    order: ThreadOrder,
    user_votes: HashMap<SubjectId, VoteDirection>,

    /// Comments pushed since the current fetch began
    pushed_during_fetch: Vec<Comment>,

    fetches: GenerationCounter,
    view: GenerationCounter,
}

impl PostThread {
    pub fn new(post: Post, order: ThreadOrder) -> PostThread {
        PostThread {
            post,
            comments: Vec::new(),
            forest: Vec::new(),
            order,
            user_votes: HashMap::new(),
            pushed_during_fetch: Vec::new(),
            fetches: GenerationCounter::new(),
            view: GenerationCounter::new(),
        }
    }

    pub fn post(&self) -> &Post {
        &self.post
    }

    pub fn forest(&self) -> &[CommentNode] {
        &self.forest
    }

    pub fn order(&self) -> ThreadOrder {
        self.order
    }

    pub fn set_order(&mut self, order: ThreadOrder) {
        if self.order != order {
            self.order = order;
            self.rebuild();
        }
    }

    pub fn user_vote(&self, subject: SubjectId) -> Option<VoteDirection> {
        self.user_votes.get(&subject).copied()
    }

    pub fn set_user_votes(&mut self, votes: impl IntoIterator<Item = (SubjectId, VoteDirection)>) {
        self.user_votes = votes.into_iter().collect();
    }

    pub fn begin_fetch(&mut self) -> Generation {
        self.pushed_during_fetch.clear();
        self.fetches.begin()
    }

    /// Replaces the comments if `generation` is still current, returning whether it was
    pub fn finish_fetch(&mut self, generation: Generation, comments: Vec<Comment>) -> bool {
        if !self.fetches.is_current(generation) {
            tracing::debug!(post = ?self.post.id, "dropping stale comment fetch");
            return false;
        }
        let fetched = comments.iter().map(|c| c.id).collect::<HashSet<_>>();
        let mut comments = comments;
        comments.extend(
            self.pushed_during_fetch
                .drain(..)
                .filter(|c| !fetched.contains(&c.id)),
        );
        self.comments = comments;
        self.rebuild();
        true
    }

    /// Merges a live comment, returning whether it was new
    pub fn receive_comment(&mut self, c: Comment) -> bool {
        if c.post_id != self.post.id || self.comments.iter().any(|o| o.id == c.id) {
            return false;
        }
        self.pushed_during_fetch.push(c.clone());
        self.comments.push(c);
        self.rebuild();
        true
    }

    /// Makes every in-flight fetch and vote stale, eg. when the page is left
    pub fn invalidate(&mut self) {
        self.fetches.invalidate();
        self.view.invalidate();
    }

    /// Shows the effect of a vote before the store confirms it
    pub fn preview_vote(&mut self, subject: SubjectId, direction: VoteDirection) -> PendingVote {
        let transition = Transition::decide(self.user_vote(subject), direction);
        let previous_score = self.score(subject).unwrap_or(0);
        self.set_vote(subject, transition.resulting_vote(), transition.preview(previous_score));
        PendingVote {
            generation: self.view.current(),
            subject,
            transition,
            previous_score,
        }
    }

    /// Replaces the preview by the authoritative result, or rolls it back on error.
    /// Returns whether the view was still current.
    pub fn confirm_vote(
        &mut self,
        pending: PendingVote,
        result: &Result<VoteOutcome, Error>,
    ) -> bool {
        if !self.view.is_current(pending.generation) {
            tracing::debug!(subject = ?pending.subject, "dropping stale vote result");
            return false;
        }
        match result {
            Ok(outcome) => self.set_vote(
                outcome.subject,
                outcome.transition.resulting_vote(),
                outcome.new_score,
            ),
            Err(_) => self.set_vote(
                pending.subject,
                pending.transition.previous_vote(),
                pending.previous_score,
            ),
        }
        true
    }

    fn score(&self, subject: SubjectId) -> Option<i64> {
        match subject {
            SubjectId::Post(p) if p == self.post.id => Some(self.post.vote_score),
            SubjectId::Post(_) => None,
            SubjectId::Comment(c) => self
                .comments
                .iter()
                .find(|o| o.id == c)
                .map(|o| o.vote_score),
        }
    }

    fn set_vote(&mut self, subject: SubjectId, vote: Option<VoteDirection>, score: i64) {
        match vote {
            Some(d) => self.user_votes.insert(subject, d),
            None => self.user_votes.remove(&subject),
        };
        match subject {
            SubjectId::Post(p) if p == self.post.id => self.post.vote_score = score,
            SubjectId::Post(_) => (),
            SubjectId::Comment(c) => {
                for o in self.comments.iter_mut().filter(|o| o.id == c) {
                    o.vote_score = score;
                }
                self.rebuild();
            }
        }
    }

    fn rebuild(&mut self) {
        self.post.comment_count = self.post.comment_count.max(self.comments.len() as i64);
        self.forest = comment::build(self.comments.iter().cloned(), self.order);
    }
}

/// Post and comment operations against the store, on behalf of the signed-in user
pub struct Threads<S, A> {
    store: S,
    auth: A,
    config: ClientConfig,
}

impl<S: Store, A: Auth> Threads<S, A> {
    pub fn new(store: S, auth: A, config: ClientConfig) -> Threads<S, A> {
        Threads {
            store,
            auth,
            config,
        }
    }

    pub async fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<Post>, Error> {
        query.validate()?;
        let store = &self.store;
        retrying("fetching posts", self.reads(), || async move {
            Ok::<_, Error>(store.fetch_posts(query).await?)
        })
        .await
    }

    pub async fn fetch_post(&self, post: PostId) -> Result<Post, Error> {
        let store = &self.store;
        retrying("fetching post", self.reads(), || async move {
            Ok::<_, Error>(store.fetch_post(post).await?)
        })
        .await?
        .ok_or(Error::PostNotFound(post))
    }

    pub async fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error> {
        let store = &self.store;
        retrying("fetching comments", self.reads(), || async move {
            Ok::<_, Error>(store.fetch_comments(post).await?)
        })
        .await
    }

    /// Loads a post page, with the signed-in user's votes if any
    pub async fn load_thread(&self, post: PostId, order: ThreadOrder) -> Result<PostThread, Error> {
        let mut thread = PostThread::new(self.fetch_post(post).await?, order);
        let generation = thread.begin_fetch();
        let comments = self.fetch_comments(post).await?;
        if let Some(user) = self.auth.current_user() {
            let voter = user.id;
            let mut votes = Vec::new();
            let subjects = std::iter::once(SubjectId::Post(post))
                .chain(comments.iter().map(|c| SubjectId::Comment(c.id)));
            for s in subjects {
                let store = &self.store;
                let vote = retrying("fetching vote", self.reads(), || async move {
                    Ok::<_, Error>(store.fetch_vote(s, voter).await?)
                })
                .await?;
                votes.extend(vote.map(|d| (s, d)));
            }
            thread.set_user_votes(votes);
        }
        thread.finish_fetch(generation, comments);
        Ok(thread)
    }

    pub async fn subscribe_comments<P: PushChannel>(
        &self,
        push: &P,
        post: PostId,
    ) -> Result<PushStream<Comment>, Error> {
        Ok(push.subscribe_comments(post).await?)
    }

    /// Adds a comment to `new.post_id`, then recomputes the post's comment count
    pub async fn submit_comment(&self, new: NewComment) -> Result<Comment, Error> {
        let user = self.auth.current_user().ok_or(Error::Unauthenticated)?;
        new.validate()?;
        let post = new.post_id;
        self.fetch_post(post).await?;

        let comment = new.into_comment(&user);
        let store = &self.store;
        let c = &comment;
        idempotent_insert("inserting comment", self.reads(), || async move {
            Ok::<_, Error>(store.insert_comment(c.clone()).await?)
        })
        .await
        .map_err(|e| match e {
            Error::SubjectNotFound(SubjectId::Post(p)) => Error::PostNotFound(p),
            e => e,
        })?;
        tracing::debug!(comment = ?comment.id, ?post, "submitted comment");

        retrying("recounting comments", self.reads(), || async move {
            let count = store.count_comments(post).await?;
            store.set_comment_count(post, count).await?;
            Ok::<_, Error>(())
        })
        .await?;
        Ok(comment)
    }

    /// Submits a post, to an existing community if one is named
    pub async fn submit_post(&self, new: NewPost) -> Result<Post, Error> {
        let user = self.auth.current_user().ok_or(Error::Unauthenticated)?;
        new.validate()?;
        if let Some(name) = &new.community {
            self.fetch_community(name).await?;
        }
        let post = new.into_post(&user);
        let store = &self.store;
        let p = &post;
        idempotent_insert("inserting post", self.reads(), || async move {
            Ok::<_, Error>(store.insert_post(p.clone()).await?)
        })
        .await?;
        tracing::debug!(post = ?post.id, "submitted post");
        Ok(post)
    }

    pub async fn fetch_profile(&self, username: &str) -> Result<Profile, Error> {
        crate::api::validate_string(username)?;
        let store = &self.store;
        retrying("fetching profile", self.reads(), || async move {
            Ok::<_, Error>(store.fetch_profile(username).await?)
        })
        .await?
        .ok_or_else(|| Error::ProfileNotFound(String::from(username)))
    }

    /// Profile of the signed-in user, as it is after the update
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, Error> {
        let user = self.auth.current_user().ok_or(Error::Unauthenticated)?;
        update.validate()?;
        let profile = update.into_profile(&user);
        let store = &self.store;
        let p = &profile;
        retrying("updating profile", self.reads(), || async move {
            Ok::<_, Error>(store.upsert_profile(p.clone()).await?)
        })
        .await?;
        tracing::debug!(user = ?user.id, "updated profile");
        Ok(profile)
    }

    /// Newest first
    pub async fn fetch_communities(&self) -> Result<Vec<Community>, Error> {
        let store = &self.store;
        retrying("fetching communities", self.reads(), || async move {
            Ok::<_, Error>(store.fetch_communities().await?)
        })
        .await
    }

    pub async fn fetch_community(&self, name: &str) -> Result<Community, Error> {
        crate::api::validate_string(name)?;
        let store = &self.store;
        retrying("fetching community", self.reads(), || async move {
            Ok::<_, Error>(store.fetch_community(name).await?)
        })
        .await?
        .ok_or_else(|| Error::CommunityNotFound(String::from(name)))
    }

    pub async fn create_community(&self, new: NewCommunity) -> Result<Community, Error> {
        let user = self.auth.current_user().ok_or(Error::Unauthenticated)?;
        new.validate()?;
        let community = new.into_community(&user);
        let store = &self.store;
        let c = &community;
        idempotent_insert("inserting community", self.reads(), || async move {
            Ok::<_, Error>(store.insert_community(c.clone()).await?)
        })
        .await
        .map_err(|e| match e {
            Error::ConflictingWrite => Error::CommunityExists(community.name.clone()),
            e => e,
        })?;
        tracing::debug!(community = ?community.id, name = %community.name, "created community");
        Ok(community)
    }

    fn reads(&self) -> Budget {
        Budget::unavailable(&self.config)
    }
}

/// Retries an insert of a row with a client-chosen id. A conflict on a retry means
/// the previous attempt went through and only its response got lost.
async fn idempotent_insert<F, Fut>(what: &str, budget: Budget, op: F) -> Result<(), Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), Error>>,
{
    let first = &AtomicBool::new(true);
    let op = &op;
    retrying(what, budget, || async move {
        let is_first = first.swap(false, Ordering::Relaxed);
        match op().await {
            Err(Error::ConflictingWrite) if !is_first => Ok(()),
            res => res,
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use forum_mock_server::{Fault, MockServer};
    use futures::StreamExt;

    use super::*;
    use crate::{
        api::{CommentId, CurrentUser, PostSort, Uuid},
        test_util::{create_post, fixture, run},
        VoteLedger,
    };

    type Th = Threads<Arc<MockServer>, Option<CurrentUser>>;

    fn threads(server: &Arc<MockServer>, user: Option<&CurrentUser>) -> Th {
        Threads::new(server.clone(), user.cloned(), ClientConfig::default())
    }

    fn reply(post: PostId, parent: Option<CommentId>, content: &str) -> NewComment {
        NewComment {
            post_id: post,
            parent_id: parent,
            content: String::from(content),
        }
    }

    #[test]
    fn comments_build_into_a_thread() {
        run(async {
            let f = fixture().await;
            let t = threads(&f.server, Some(&f.bob));
            let top = t.submit_comment(reply(f.post.id, None, "first!")).await.unwrap();
            let answer = t
                .submit_comment(reply(f.post.id, Some(top.id), "  second  "))
                .await
                .unwrap();
            assert_eq!(answer.content, "second");
            assert_eq!(answer.author_name, "bob");

            let thread = t.load_thread(f.post.id, ThreadOrder::Oldest).await.unwrap();
            assert_eq!(thread.post().comment_count, 2);
            assert_eq!(thread.forest().len(), 1);
            assert_eq!(thread.forest()[0].comment.id, top.id);
            assert_eq!(thread.forest()[0].children[0].comment.id, answer.id);
        })
    }

    #[test]
    fn submitting_comments_checks_its_inputs() {
        run(async {
            let f = fixture().await;
            let anonymous = threads(&f.server, None);
            assert_eq!(
                anonymous.submit_comment(reply(f.post.id, None, "hi")).await,
                Err(Error::Unauthenticated)
            );

            let t = threads(&f.server, Some(&f.bob));
            assert!(matches!(
                t.submit_comment(reply(f.post.id, None, " \n ")).await,
                Err(Error::InvalidContent(_))
            ));
            let gone = PostId(Uuid::new_v4());
            assert_eq!(
                t.submit_comment(reply(gone, None, "hi")).await,
                Err(Error::PostNotFound(gone))
            );
            assert!(t.fetch_comments(f.post.id).await.unwrap().is_empty());
        })
    }

    #[test]
    fn lost_insert_response_is_not_an_error() {
        run(async {
            let f = fixture().await;
            let t = threads(&f.server, Some(&f.bob));
            f.server.inject(Fault::LostResponse).await;
            t.submit_comment(reply(f.post.id, None, "hi")).await.unwrap();
            assert_eq!(t.fetch_comments(f.post.id).await.unwrap().len(), 1);
            assert_eq!(t.fetch_post(f.post.id).await.unwrap().comment_count, 1);
        })
    }

    #[test]
    fn stale_fetches_are_dropped() {
        run(async {
            let f = fixture().await;
            let t = threads(&f.server, Some(&f.bob));
            let c = t.submit_comment(reply(f.post.id, None, "hi")).await.unwrap();

            let mut thread = PostThread::new(f.post.clone(), ThreadOrder::Oldest);
            let old = thread.begin_fetch();
            let new = thread.begin_fetch();
            assert!(!thread.finish_fetch(old, vec![c.clone()]));
            assert!(thread.forest().is_empty());
            assert!(thread.finish_fetch(new, vec![c.clone()]));
            assert_eq!(comment::count(thread.forest()), 1);

            let left = thread.begin_fetch();
            thread.invalidate();
            assert!(!thread.finish_fetch(left, Vec::new()));
            assert_eq!(comment::count(thread.forest()), 1);
        })
    }

    #[test]
    fn live_comments_are_merged() {
        run(async {
            let f = fixture().await;
            let t = threads(&f.server, Some(&f.bob));
            let mut thread = t.load_thread(f.post.id, ThreadOrder::Newest).await.unwrap();
            let mut live = t.subscribe_comments(&*f.server, f.post.id).await.unwrap();

            let generation = thread.begin_fetch();
            let c = t.submit_comment(reply(f.post.id, None, "hi")).await.unwrap();
            let pushed = live.next().await.unwrap();
            assert_eq!(pushed.id, c.id);
            assert!(thread.receive_comment(pushed.clone()));
            assert!(!thread.receive_comment(pushed));
            // the fetch was answered before the comment got created
            assert!(thread.finish_fetch(generation, Vec::new()));
            assert_eq!(comment::count(thread.forest()), 1);
            assert_eq!(thread.post().comment_count, 1);
        })
    }

    #[test]
    fn votes_show_up_before_being_confirmed() {
        run(async {
            let f = fixture().await;
            let t = threads(&f.server, Some(&f.bob));
            let ledger = VoteLedger::new(f.server.clone(), Some(f.bob.clone()), ClientConfig::default());
            let c = t.submit_comment(reply(f.post.id, None, "hi")).await.unwrap();
            let mut thread = t.load_thread(f.post.id, ThreadOrder::Oldest).await.unwrap();
            let subject = SubjectId::Comment(c.id);

            let pending = thread.preview_vote(subject, VoteDirection::Down);
            assert_eq!(thread.forest()[0].comment.vote_score, -1);
            let res = ledger.apply_vote(f.bob.id, subject, VoteDirection::Down).await;
            assert!(thread.confirm_vote(pending, &res));
            assert_eq!(thread.forest()[0].comment.vote_score, -1);
            assert_eq!(thread.user_vote(subject), Some(VoteDirection::Down));

            // failures roll the preview back
            let pending = thread.preview_vote(subject, VoteDirection::Up);
            assert_eq!(thread.forest()[0].comment.vote_score, 1);
            assert!(thread.confirm_vote(pending, &Err(Error::ConflictingWrite)));
            assert_eq!(thread.forest()[0].comment.vote_score, -1);
            assert_eq!(thread.user_vote(subject), Some(VoteDirection::Down));

            // reloading shows the vote as recorded
            let thread = t.load_thread(f.post.id, ThreadOrder::Oldest).await.unwrap();
            assert_eq!(thread.user_vote(subject), Some(VoteDirection::Down));
            assert_eq!(thread.user_vote(SubjectId::Post(f.post.id)), None);
        })
    }

    #[test]
    fn vote_results_after_leaving_are_dropped() {
        run(async {
            let f = fixture().await;
            let ledger = VoteLedger::new(f.server.clone(), Some(f.bob.clone()), ClientConfig::default());
            let subject = SubjectId::Post(f.post.id);
            let mut thread = PostThread::new(f.post.clone(), ThreadOrder::Oldest);
            let pending = thread.preview_vote(subject, VoteDirection::Up);
            thread.invalidate();
            let res = ledger.apply_vote(f.bob.id, subject, VoteDirection::Up).await;
            assert!(!thread.confirm_vote(pending, &res));
            // the write itself still went through
            assert_eq!(res.unwrap().new_score, 1);
        })
    }

    #[test]
    fn posts_and_profiles() {
        run(async {
            let f = fixture().await;
            let t = threads(&f.server, Some(&f.bob));
            let second = create_post(&f.server, &f.bob, "second post").await;
            t.create_community(NewCommunity {
                name: String::from("rust"),
                description: None,
                is_public: true,
            })
            .await
            .unwrap();
            let third = t
                .submit_post(NewPost {
                    title: String::from("Rust question"),
                    content: String::new(),
                    community: Some(String::from("rust")),
                })
                .await
                .unwrap();
            assert!(matches!(
                t.submit_post(NewPost {
                    title: String::from("  "),
                    content: String::from("no title"),
                    community: None,
                })
                .await,
                Err(Error::InvalidContent(_))
            ));

            let new = t
                .fetch_posts(&PostQuery::new(PostSort::New, 10))
                .await
                .unwrap();
            assert_eq!(new.len(), 3);
            assert!(new.windows(2).all(|w| w[0].created_at >= w[1].created_at));
            assert!(new.iter().any(|p| p.id == second.id));
            let mut q = PostQuery::new(PostSort::Hot, 10);
            q.phrase = Some(String::from("question"));
            assert_eq!(t.fetch_posts(&q).await.unwrap(), vec![third]);

            assert_eq!(t.fetch_profile("alice").await.unwrap().id, f.alice.id);
            assert_eq!(
                t.fetch_profile("carol").await,
                Err(Error::ProfileNotFound(String::from("carol")))
            );
        })
    }

    #[test]
    fn posts_go_to_existing_communities() {
        run(async {
            let f = fixture().await;
            let t = threads(&f.server, Some(&f.bob));
            let new = |name: &str| NewCommunity {
                name: String::from(name),
                description: Some(String::from("all things ") + name),
                is_public: true,
            };
            let anonymous = threads(&f.server, None);
            assert_eq!(
                anonymous.create_community(new("rust")).await,
                Err(Error::Unauthenticated)
            );

            let rust = t.create_community(new("rust")).await.unwrap();
            assert_eq!(rust.created_by, f.bob.id);
            assert_eq!(
                t.create_community(new(" rust ")).await,
                Err(Error::CommunityExists(String::from("rust")))
            );
            f.server.inject(Fault::LostResponse).await;
            let meta = t.create_community(new("meta")).await.unwrap();
            let names = t
                .fetch_communities()
                .await
                .unwrap()
                .into_iter()
                .map(|c| c.name)
                .collect::<Vec<_>>();
            assert_eq!(names.len(), 2);
            assert!(names.contains(&meta.name) && names.contains(&rust.name));

            let post = |community: &str| NewPost {
                title: String::from("hello"),
                content: String::new(),
                community: Some(String::from(community)),
            };
            assert_eq!(
                t.submit_post(post("golang")).await,
                Err(Error::CommunityNotFound(String::from("golang")))
            );
            let p = t.submit_post(post("rust")).await.unwrap();
            let mut q = PostQuery::new(PostSort::New, 10);
            q.community = Some(String::from("rust"));
            assert_eq!(t.fetch_posts(&q).await.unwrap(), vec![p]);
        })
    }

    #[test]
    fn users_edit_their_own_profile() {
        run(async {
            let f = fixture().await;
            let update = ProfileUpdate {
                bio: Some(String::from("rustacean")),
                avatar_url: Some(String::from("https://example.org/bob.png")),
            };
            assert_eq!(
                threads(&f.server, None).update_profile(update.clone()).await,
                Err(Error::Unauthenticated)
            );

            let t = threads(&f.server, Some(&f.bob));
            f.server.inject(Fault::Unavailable).await;
            let profile = t.update_profile(update).await.unwrap();
            assert_eq!(profile.id, f.bob.id);
            assert_eq!(t.fetch_profile("bob").await.unwrap(), profile);

            t.update_profile(ProfileUpdate::default()).await.unwrap();
            let cleared = t.fetch_profile("bob").await.unwrap();
            assert_eq!((cleared.bio, cleared.avatar_url), (None, None));
            assert!(matches!(
                t.update_profile(ProfileUpdate {
                    bio: None,
                    avatar_url: Some(String::from("ftp://example.org/bob.png")),
                })
                .await,
                Err(Error::InvalidContent(_))
            ));
        })
    }

    #[test]
    fn unconfirmed_scores_keep_the_vote() {
        run(async {
            let f = fixture().await;
            let ledger = VoteLedger::new(f.server.clone(), Some(f.bob.clone()), ClientConfig::default());
            let subject = SubjectId::Post(f.post.id);
            let mut thread = PostThread::new(f.post.clone(), ThreadOrder::Oldest);
            let pending = thread.preview_vote(subject, VoteDirection::Up);

            f.server.inject(Fault::TallyUnavailable).await;
            f.server.inject(Fault::TallyUnavailable).await;
            let res = ledger.apply_vote(f.bob.id, subject, VoteDirection::Up).await;
            assert!(thread.confirm_vote(pending, &res));
            assert_eq!(thread.user_vote(subject), Some(VoteDirection::Up));
            assert_eq!(thread.post().vote_score, 1);
            assert_eq!(f.server.test_votes_on(subject).await, vec![(f.bob.id, VoteDirection::Up)]);
        })
    }
}
