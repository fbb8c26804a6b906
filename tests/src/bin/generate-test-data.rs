use std::collections::HashMap;

use chrono::{Duration, Utc};
use forum_api::{Tally, Time, VoteDirection};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const NUM_USERS: usize = 5;
const NUM_POSTS: usize = 40;
const NUM_COMMENTS: usize = 300;

const TITLE_WORD_COUNT: usize = 8;
const POST_WORD_COUNT: usize = 60;
const COMMENT_WORD_COUNT: usize = 25;

const COMMUNITIES: &[&str] = &["rust", "databases", "networking", "meta"];

// Spread over the last month
const MAX_AGE_MINUTES: i64 = 30 * 24 * 60;

struct User {
    id: Uuid,
    name: String,
}

struct Post {
    id: Uuid,
    author: usize,
    created_at: Time,
}

struct Comment {
    id: Uuid,
    post: usize,
    author: usize,
    created_at: Time,
}

fn gen_n_items(table: &str, columns: &str, n: usize, mut f: impl FnMut(usize) -> String) {
    if n == 0 {
        return;
    }
    println!("INSERT INTO {} ({}) VALUES", table, columns);
    for i in 0..n {
        if i != 0 {
            println!(",");
        }
        print!("    {}", f(i));
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn gen_vote(rng: &mut impl Rng) -> Option<VoteDirection> {
    match rng.gen_range(0..4) {
        0 | 1 => Some(VoteDirection::Up),
        2 => Some(VoteDirection::Down),
        _ => None,
    }
}

fn vote_type(d: VoteDirection) -> String {
    quote(d.as_str())
}

fn main() {
    let mut rng = rand::thread_rng();
    let now = Utc::now();

    // Generate users
    let users = (0..NUM_USERS)
        .map(|i| User {
            id: Uuid::new_v4(),
            name: format!(
                "{}{}",
                lipsum::lipsum_words_with_rng(&mut rng, 1)
                    .to_lowercase()
                    .trim_matches(|c: char| !c.is_alphanumeric()),
                i
            ),
        })
        .collect::<Vec<_>>();
    gen_n_items("profiles", "id, username, bio", users.len(), |i| {
        format!(
            "('{}', {}, {})",
            users[i].id,
            quote(&users[i].name),
            quote(&lipsum::lipsum_words_with_rng(&mut rng, 12)),
        )
    });

    // Communities are older than every post
    gen_n_items(
        "communities",
        "id, name, description, is_public, created_by, created_at",
        COMMUNITIES.len(),
        |i| {
            format!(
                "('{}', {}, {}, {}, '{}', '{}')",
                Uuid::new_v4(),
                quote(COMMUNITIES[i]),
                quote(&lipsum::lipsum_words_with_rng(&mut rng, 10)),
                i != COMMUNITIES.len() - 1,
                users[i % users.len()].id,
                (now - Duration::minutes(MAX_AGE_MINUTES + i as i64)).to_rfc3339(),
            )
        },
    );

    // Generate posts, votes first so that the cached scores match them
    let posts = (0..NUM_POSTS)
        .map(|_| Post {
            id: Uuid::new_v4(),
            author: rng.gen_range(0..users.len()),
            created_at: now - Duration::minutes(rng.gen_range(0..MAX_AGE_MINUTES)),
        })
        .collect::<Vec<_>>();
    let post_votes = posts
        .iter()
        .map(|_| {
            (0..users.len())
                .filter_map(|u| gen_vote(&mut rng).map(|d| (u, d)))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    // Comments reply to older comments of the same post half of the time
    let mut comments: Vec<Comment> = Vec::new();
    let mut parents = Vec::new();
    let mut by_post: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..NUM_COMMENTS {
        let post = rng.gen_range(0..posts.len());
        let siblings = by_post.entry(post).or_default();
        let parent = match rng.gen_bool(0.5) {
            true => siblings.choose(&mut rng).copied(),
            false => None,
        };
        let after = parent.map_or(posts[post].created_at, |p| comments[p].created_at);
        let age = (now - after).num_minutes().max(1);
        comments.push(Comment {
            id: Uuid::new_v4(),
            post,
            author: rng.gen_range(0..users.len()),
            created_at: after + Duration::minutes(rng.gen_range(1..=age)),
        });
        parents.push(parent);
        siblings.push(i);
    }
    let comment_votes = comments
        .iter()
        .map(|_| {
            (0..users.len())
                .filter_map(|u| gen_vote(&mut rng).map(|d| (u, d)))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let score = |votes: &[(usize, VoteDirection)]| -> i64 {
        votes.iter().map(|(_, d)| *d).collect::<Tally>().score()
    };

    gen_n_items(
        "posts",
        "id, author_id, author_username, created_at, title, content, category, vote_score, comment_count",
        posts.len(),
        |i| {
            let p = &posts[i];
            format!(
                "('{}', '{}', {}, '{}', {}, {}, {}, {}, {})",
                p.id,
                users[p.author].id,
                quote(&users[p.author].name),
                p.created_at.to_rfc3339(),
                quote(&lipsum::lipsum_words_with_rng(&mut rng, TITLE_WORD_COUNT)),
                quote(&lipsum::lipsum_words_with_rng(&mut rng, POST_WORD_COUNT)),
                match rng.gen_bool(0.8) {
                    true => quote(COMMUNITIES[i % COMMUNITIES.len()]),
                    false => String::from("NULL"),
                },
                score(&post_votes[i]),
                by_post.get(&i).map_or(0, |c| c.len()),
            )
        },
    );

    gen_n_items(
        "comments",
        "id, post_id, parent_id, author_id, author_username, created_at, content, vote_score",
        comments.len(),
        |i| {
            let c = &comments[i];
            format!(
                "('{}', '{}', {}, '{}', {}, '{}', {}, {})",
                c.id,
                posts[c.post].id,
                parents[i].map_or(String::from("NULL"), |p| format!("'{}'", comments[p].id)),
                users[c.author].id,
                quote(&users[c.author].name),
                c.created_at.to_rfc3339(),
                quote(&lipsum::lipsum_words_with_rng(&mut rng, COMMENT_WORD_COUNT)),
                score(&comment_votes[i]),
            )
        },
    );

    let post_vote_rows = post_votes
        .iter()
        .enumerate()
        .flat_map(|(p, votes)| votes.iter().map(move |(u, d)| (p, *u, *d)))
        .collect::<Vec<_>>();
    gen_n_items(
        "post_votes",
        "post_id, user_id, vote_type",
        post_vote_rows.len(),
        |i| {
            let (p, u, d) = post_vote_rows[i];
            format!("('{}', '{}', {})", posts[p].id, users[u].id, vote_type(d))
        },
    );

    let comment_vote_rows = comment_votes
        .iter()
        .enumerate()
        .flat_map(|(c, votes)| votes.iter().map(move |(u, d)| (c, *u, *d)))
        .collect::<Vec<_>>();
    gen_n_items(
        "comment_votes",
        "comment_id, user_id, vote_type",
        comment_vote_rows.len(),
        |i| {
            let (c, u, d) = comment_vote_rows[i];
            format!("('{}', '{}', {})", comments[c].id, users[u].id, vote_type(d))
        },
    );

    // Notify whoever got replied to, as the backend trigger would
    let notifications = comments
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            let (target, what) = match parents[i] {
                Some(p) => (comments[p].author, "replied to your comment"),
                None => (posts[c.post].author, "commented on your post"),
            };
            (target != c.author).then(|| (i, target, what))
        })
        .collect::<Vec<_>>();
    gen_n_items(
        "notifications",
        "id, user_id, type, message, read, created_at, link",
        notifications.len(),
        |i| {
            let (c, target, what) = notifications[i];
            let comment = &comments[c];
            format!(
                "('{}', '{}', 'comment', {}, {}, '{}', {})",
                Uuid::new_v4(),
                users[target].id,
                quote(&format!("u/{} {}", users[comment.author].name, what)),
                rng.gen_bool(0.5),
                comment.created_at.to_rfc3339(),
                quote(&format!("/post/{}", posts[comment.post].id)),
            )
        },
    );
}
