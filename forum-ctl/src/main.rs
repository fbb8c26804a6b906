use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use forum_client::{
    api::{
        CommentId, CurrentUser, Error, NewComment, NewCommunity, NewPost, NotificationId, PostId,
        PostQuery, PostSort, ProfileUpdate, SubjectId, UserId, Uuid, VoteDirection,
    },
    comment, ClientConfig, NotificationCenter, ThreadOrder, Threads, VoteLedger,
};
use tracing_subscriber::EnvFilter;

mod rest;
use rest::{RestConfig, RestStore};

#[derive(structopt::StructOpt)]
struct Opt {
    /// JSON file overriding the client defaults (retries, timeouts, listing sizes)
    #[structopt(short, long)]
    config: Option<PathBuf>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// List posts
    Posts {
        /// hot, new or top
        #[structopt(short, long, default_value = "hot", parse(try_from_str = parse_sort))]
        sort: PostSort,

        #[structopt(long)]
        community: Option<String>,

        /// Only posts by this username
        #[structopt(long)]
        author: Option<String>,

        /// Search titles and contents
        #[structopt(long)]
        search: Option<String>,
    },

    /// Show a post and its comments
    Thread {
        post: Uuid,

        /// Newest comments first
        #[structopt(long)]
        newest: bool,

        /// Do not show replies nested deeper than this
        #[structopt(long)]
        max_depth: Option<usize>,
    },

    /// Vote on a post or comment, voting the same way twice retracts the vote
    Vote {
        /// post or comment
        #[structopt(parse(try_from_str = parse_subject_kind))]
        kind: SubjectKind,

        id: Uuid,

        /// up or down
        #[structopt(parse(try_from_str = parse_direction))]
        direction: VoteDirection,
    },

    /// Submit a post
    Submit {
        title: String,

        #[structopt(long, default_value = "")]
        content: String,

        #[structopt(long)]
        community: Option<String>,
    },

    /// Comment on a post
    Comment {
        post: Uuid,
        content: String,

        /// Comment to reply to
        #[structopt(long)]
        parent: Option<Uuid>,
    },

    /// List notifications
    Notifications {
        /// Mark this notification read
        #[structopt(long)]
        mark_read: Option<Uuid>,

        #[structopt(long)]
        mark_all_read: bool,
    },

    /// Show a user profile
    Profile { username: String },

    /// Set the bio and avatar of the signed-in user, omitted ones get cleared
    EditProfile {
        #[structopt(long)]
        bio: Option<String>,

        #[structopt(long)]
        avatar_url: Option<String>,
    },

    /// List communities, newest first
    Communities,

    /// Create a community
    CreateCommunity {
        name: String,

        #[structopt(long)]
        description: Option<String>,

        /// Hide the community from listings
        #[structopt(long)]
        private: bool,
    },
}

#[derive(Clone, Copy)]
enum SubjectKind {
    Post,
    Comment,
}

fn parse_sort(s: &str) -> anyhow::Result<PostSort> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .with_context(|| format!("unknown sort {s:?}, expected hot, new or top"))
}

fn parse_direction(s: &str) -> anyhow::Result<VoteDirection> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .with_context(|| format!("unknown vote direction {s:?}, expected up or down"))
}

fn parse_subject_kind(s: &str) -> anyhow::Result<SubjectKind> {
    match s {
        "post" => Ok(SubjectKind::Post),
        "comment" => Ok(SubjectKind::Comment),
        _ => Err(anyhow::anyhow!("unknown subject {s:?}, expected post or comment")),
    }
}

fn env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("retrieving {name} environment variable"))
}

/// The session, if FORUM_USER_ID is set
fn session() -> anyhow::Result<Option<CurrentUser>> {
    let id = match std::env::var("FORUM_USER_ID") {
        Ok(id) => id,
        Err(_) => return Ok(None),
    };
    let id = Uuid::try_parse(&id).context("parsing FORUM_USER_ID as a user id")?;
    Ok(Some(CurrentUser {
        id: UserId(id),
        name: env("FORUM_USER_NAME")?,
    }))
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ClientConfig> {
    match path {
        None => Ok(ClientConfig::default()),
        Some(path) => {
            let data = std::fs::read(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_slice(&data)
                .with_context(|| format!("parsing config file {}", path.display()))
        }
    }
}

/// Points out failures that may go away when running the command again
fn hint_retry(e: anyhow::Error) -> anyhow::Error {
    let retryable = e.downcast_ref::<Error>().map_or(false, Error::is_retryable);
    match retryable {
        true => e.context("temporary failure, the command may succeed if run again"),
        false => e,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let config = load_config(opt.config)?;
    let user = session()?;

    let store = Arc::new(RestStore::new(RestConfig {
        url: env("FORUM_URL")?,
        anon_key: env("FORUM_ANON_KEY")?,
        access_token: std::env::var("FORUM_ACCESS_TOKEN").ok(),
        table_prefix: std::env::var("FORUM_TABLE_PREFIX").unwrap_or_default(),
        timeout: config.request_timeout(),
    })?);
    run(opt.cmd, store, user, config).await.map_err(hint_retry)
}

async fn run(
    cmd: Command,
    store: Arc<RestStore>,
    user: Option<CurrentUser>,
    config: ClientConfig,
) -> anyhow::Result<()> {
    let threads = Threads::new(store.clone(), user.clone(), config.clone());

    match cmd {
        Command::Posts {
            sort,
            community,
            author,
            search,
        } => {
            let query = PostQuery {
                sort,
                community,
                author,
                phrase: search,
                limit: config.post_limit,
            };
            for p in threads.fetch_posts(&query).await? {
                println!(
                    "{:>5} {} [{} comments] {} (u/{})",
                    p.vote_score, p.id.0, p.comment_count, p.title, p.author_name
                );
            }
        }
        Command::Thread {
            post,
            newest,
            max_depth,
        } => {
            let order = match newest {
                true => ThreadOrder::Newest,
                false => ThreadOrder::Oldest,
            };
            let thread = threads.load_thread(PostId(post), order).await?;
            let p = thread.post();
            println!("{} (u/{}, {} points)", p.title, p.author_name, p.vote_score);
            if !p.content.is_empty() {
                println!("{}", p.content);
            }
            println!();
            let walk = match max_depth {
                Some(d) => comment::walk_visible(thread.forest(), d),
                None => comment::walk(thread.forest()),
            };
            for (depth, node) in walk {
                let c = &node.comment;
                println!(
                    "{:indent$}[{}] u/{} ({} points): {}",
                    "",
                    c.id.0,
                    c.author_name,
                    c.vote_score,
                    c.content,
                    indent = depth * 2
                );
            }
        }
        Command::Vote {
            kind,
            id,
            direction,
        } => {
            let user = user.clone().context("voting requires FORUM_USER_ID to be set")?;
            let subject = match kind {
                SubjectKind::Post => SubjectId::Post(PostId(id)),
                SubjectKind::Comment => SubjectId::Comment(CommentId(id)),
            };
            let ledger = VoteLedger::new(store.clone(), Some(user.clone()), config.clone());
            let outcome = ledger.apply_vote(user.id, subject, direction).await?;
            println!(
                "{:?}: score {} -> {}{}",
                outcome.transition,
                outcome.previous_score,
                outcome.new_score,
                match outcome.score_confirmed {
                    true => "",
                    false => " (not yet recounted)",
                }
            );
        }
        Command::Submit {
            title,
            content,
            community,
        } => {
            let post = threads
                .submit_post(NewPost {
                    title,
                    content,
                    community,
                })
                .await?;
            println!("{}", post.id.0);
        }
        Command::Comment {
            post,
            content,
            parent,
        } => {
            let comment = threads
                .submit_comment(NewComment {
                    post_id: PostId(post),
                    parent_id: parent.map(CommentId),
                    content,
                })
                .await?;
            println!("{}", comment.id.0);
        }
        Command::Notifications {
            mark_read,
            mark_all_read,
        } => {
            let user = user.context("notifications require FORUM_USER_ID to be set")?;
            let mut center = NotificationCenter::new(store.clone(), user.id, config.clone());
            center.refresh().await?;
            if let Some(id) = mark_read {
                center.mark_read(NotificationId(id)).await?;
            }
            if mark_all_read {
                center.mark_all_read().await?;
            }
            let feed = center.feed();
            println!("{} unread", feed.unread_count());
            for n in feed.notifications() {
                println!(
                    "{} {} {:?} {}{}",
                    if n.read { " " } else { "*" },
                    n.created_at.format("%Y-%m-%d %H:%M"),
                    n.kind,
                    n.message,
                    n.link
                        .as_ref()
                        .map(|l| format!(" ({l})"))
                        .unwrap_or_default(),
                );
            }
        }
        Command::Profile { username } => {
            let profile = threads.fetch_profile(&username).await?;
            println!("u/{} ({})", profile.username, profile.id.0);
            if let Some(bio) = profile.bio {
                println!("{bio}");
            }
            let mut query = PostQuery::new(PostSort::New, config.post_limit);
            query.author = Some(profile.username);
            for p in threads.fetch_posts(&query).await? {
                println!("{:>5} {} {}", p.vote_score, p.id.0, p.title);
            }
        }
        Command::EditProfile { bio, avatar_url } => {
            let profile = threads
                .update_profile(ProfileUpdate { bio, avatar_url })
                .await?;
            println!("u/{} updated", profile.username);
        }
        Command::Communities => {
            for c in threads.fetch_communities().await? {
                println!(
                    "{}{}{}",
                    c.name,
                    if c.is_public { "" } else { " (private)" },
                    c.description
                        .as_ref()
                        .map(|d| format!(": {d}"))
                        .unwrap_or_default(),
                );
            }
        }
        Command::CreateCommunity {
            name,
            description,
            private,
        } => {
            let community = threads
                .create_community(NewCommunity {
                    name,
                    description,
                    is_public: !private,
                })
                .await?;
            println!("{}", community.id.0);
        }
    }

    Ok(())
}
