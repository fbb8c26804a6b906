use std::sync::Arc;

use forum_client::{
    api::{
        CommentId, CurrentUser, Error, NewComment, NewPost, NotificationKind, Post, Store,
        SubjectId, Uuid,
        VoteDirection::{Down, Up},
    },
    comment, ClientConfig, NotificationCenter, ThreadOrder, Threads, Transition, VoteLedger,
};
use forum_mock_server::MockServer;
use futures::StreamExt;

type Ledger = VoteLedger<Arc<MockServer>, Option<CurrentUser>>;
type Client = Threads<Arc<MockServer>, Option<CurrentUser>>;

fn run<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed initializing tokio runtime")
        .block_on(f)
}

fn ledger(server: &Arc<MockServer>, user: &CurrentUser) -> Ledger {
    VoteLedger::new(server.clone(), Some(user.clone()), ClientConfig::default())
}

fn client(server: &Arc<MockServer>, user: &CurrentUser) -> Client {
    Threads::new(server.clone(), Some(user.clone()), ClientConfig::default())
}

async fn post(c: &Client, title: &str) -> Post {
    c.submit_post(NewPost {
        title: String::from(title),
        content: String::new(),
        community: None,
    })
    .await
    .expect("submitting post")
}

#[test]
fn two_users_vote_on_a_post() {
    run(async {
        let server = Arc::new(MockServer::new());
        let a = server.admin_create_user("a").await;
        let b = server.admin_create_user("b").await;
        let pid = post(&client(&server, &a), "P").await.id;
        let p = SubjectId::Post(pid);
        let (la, lb) = (ledger(&server, &a), ledger(&server, &b));

        let steps = [
            (&la, a.id, Up, Transition::Insert(Up), 0, 1),
            (&la, a.id, Up, Transition::Retract(Up), 1, 0),
            (&la, a.id, Down, Transition::Insert(Down), 0, -1),
            (&lb, b.id, Down, Transition::Insert(Down), -1, -2),
        ];
        for (l, voter, dir, transition, before, after) in steps {
            let o = l.apply_vote(voter, p, dir).await.unwrap();
            assert_eq!(o.transition, transition);
            assert_eq!((o.previous_score, o.new_score), (before, after));
        }
        let thread = client(&server, &a)
            .load_thread(pid, ThreadOrder::Oldest)
            .await
            .unwrap();
        assert_eq!(thread.post().vote_score, -2);
        assert_eq!(thread.user_vote(p), Some(Down));
    })
}

#[test]
fn replies_and_orphans_form_a_forest() {
    run(async {
        let server = Arc::new(MockServer::new());
        let a = server.admin_create_user("a").await;
        let ca = client(&server, &a);
        let p = post(&ca, "P").await;

        let first = ca
            .submit_comment(NewComment {
                post_id: p.id,
                parent_id: None,
                content: String::from("first"),
            })
            .await
            .unwrap();
        let reply = ca
            .submit_comment(NewComment {
                post_id: p.id,
                parent_id: Some(first.id),
                content: String::from("reply"),
            })
            .await
            .unwrap();
        // replying to a comment that got deleted in the meantime
        let mut orphan = NewComment {
            post_id: p.id,
            parent_id: None,
            content: String::from("orphan"),
        }
        .into_comment(&a);
        orphan.parent_id = Some(CommentId(Uuid::new_v4()));
        server.insert_comment(orphan.clone()).await.unwrap();

        let thread = ca.load_thread(p.id, ThreadOrder::Oldest).await.unwrap();
        let forest = thread.forest();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].comment.id, first.id);
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(forest[0].children[0].comment.id, reply.id);
        assert_eq!(forest[1].comment.id, orphan.id);
        assert_eq!(comment::count(forest), 3);
    })
}

#[test]
fn replies_notify_the_author_once() {
    run(async {
        let server = Arc::new(MockServer::new());
        let a = server.admin_create_user("a").await;
        let b = server.admin_create_user("b").await;
        let p = post(&client(&server, &a), "P").await;

        let mut center = NotificationCenter::new(server.clone(), a.id, ClientConfig::default());
        let mut pushes = center.subscribe(&*server).await.unwrap();
        // the push arrives before the first load completes
        client(&server, &b)
            .submit_comment(NewComment {
                post_id: p.id,
                parent_id: None,
                content: String::from("hello"),
            })
            .await
            .unwrap();
        let pushed = pushes.next().await.unwrap();
        assert_eq!(pushed.kind, NotificationKind::Comment);
        assert!(center.receive_push(pushed.clone()));
        assert!(!center.receive_push(pushed.clone()));
        center.refresh().await.unwrap();
        assert_eq!(center.feed().notifications().len(), 1);
        assert_eq!(center.feed().unread_count(), 1);

        // own comments do not notify
        client(&server, &a)
            .submit_comment(NewComment {
                post_id: p.id,
                parent_id: None,
                content: String::from("thanks"),
            })
            .await
            .unwrap();
        center.refresh().await.unwrap();
        assert_eq!(center.feed().notifications().len(), 1);

        center.mark_read(pushed.id).await.unwrap();
        center.mark_read(pushed.id).await.unwrap();
        assert_eq!(center.feed().unread_count(), 0);
    })
}

#[test]
fn separate_tabs_never_leave_two_votes() {
    bolero::check!()
        .with_type::<Vec<(bool, bool)>>()
        .cloned()
        .for_each(|clicks| {
            run(async {
                let server = Arc::new(MockServer::new());
                let a = server.admin_create_user("a").await;
                let p = SubjectId::Post(post(&client(&server, &a), "P").await.id);
                // each tab has its own ledger, so nothing serializes them client-side
                let tabs = [ledger(&server, &a), ledger(&server, &a)];
                let votes = clicks.iter().map(|(tab, up)| {
                    tabs[*tab as usize].apply_vote(a.id, p, if *up { Up } else { Down })
                });
                for res in futures::future::join_all(votes).await {
                    match res {
                        Ok(_) | Err(Error::ConflictingWrite) => (),
                        Err(e) => panic!("unexpected error {e:?}"),
                    }
                }
                let votes = server.test_votes_on(p).await;
                assert!(votes.len() <= 1);
                assert_eq!(
                    server.tally_votes(p).await.unwrap().score(),
                    votes.iter().map(|(_, d)| d.weight()).sum::<i64>()
                );
            })
        })
}
