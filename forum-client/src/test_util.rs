use std::{future::Future, sync::Arc};

use forum_mock_server::MockServer;

use crate::api::{CurrentUser, NewPost, Post, Store};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = std::panic::AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}
pub(crate) use do_tokio_test;

pub fn run<F: Future>(f: F) -> F::Output {
    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt::try_init();
    }
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed initializing tokio runtime")
        .block_on(f)
}

pub struct Fixture {
    pub server: Arc<MockServer>,
    pub alice: CurrentUser,
    pub bob: CurrentUser,
    pub post: Post,
}

pub async fn fixture() -> Fixture {
    let server = Arc::new(MockServer::new());
    let alice = server.admin_create_user("alice").await;
    let bob = server.admin_create_user("bob").await;
    let post = create_post(&server, &alice, "first post").await;
    Fixture {
        server,
        alice,
        bob,
        post,
    }
}

pub async fn create_post(server: &MockServer, author: &CurrentUser, title: &str) -> Post {
    let post = NewPost {
        title: String::from(title),
        content: String::from("some content"),
        community: None,
    }
    .into_post(author);
    server
        .insert_post(post.clone())
        .await
        .expect("inserting post");
    post
}
