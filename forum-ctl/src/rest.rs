use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use forum_client::api::{
    Comment, CommentId, Community, NotificationId, NotificationRecord, Post, PostId, PostQuery, PostSort,
    Profile, Store, StoreError, SubjectId, Tally, Time, UserId, Vote, VoteDirection,
};
use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Connection parameters of a PostgREST-style backend
#[derive(Clone, Debug)]
pub struct RestConfig {
    /// Project URL, without the `/rest/v1` suffix
    pub url: String,
    pub anon_key: String,

    /// Session token of the signed-in user, the anonymous key is used otherwise
    pub access_token: Option<String>,

    /// Prepended to every table name
    pub table_prefix: String,

    pub timeout: Duration,
}

pub struct RestStore {
    client: reqwest::Client,
    config: RestConfig,
}

#[derive(Deserialize, Serialize)]
struct PostRow {
    id: PostId,
    author_id: UserId,
    author_username: String,
    created_at: Time,
    title: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    vote_score: i64,
    #[serde(default)]
    comment_count: i64,
}

impl From<PostRow> for Post {
    fn from(r: PostRow) -> Post {
        Post {
            id: r.id,
            author_id: r.author_id,
            author_name: r.author_username,
            created_at: r.created_at,
            title: r.title,
            content: r.content.unwrap_or_default(),
            community: r.category,
            vote_score: r.vote_score,
            comment_count: r.comment_count,
        }
    }
}

impl From<Post> for PostRow {
    fn from(p: Post) -> PostRow {
        PostRow {
            id: p.id,
            author_id: p.author_id,
            author_username: p.author_name,
            created_at: p.created_at,
            title: p.title,
            content: Some(p.content),
            category: p.community,
            vote_score: p.vote_score,
            comment_count: p.comment_count,
        }
    }
}

#[derive(Deserialize, Serialize)]
struct CommentRow {
    id: CommentId,
    post_id: PostId,
    #[serde(default)]
    parent_id: Option<CommentId>,
    author_id: UserId,
    author_username: String,
    created_at: Time,
    content: String,
    #[serde(default)]
    vote_score: i64,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Comment {
        Comment {
            id: r.id,
            post_id: r.post_id,
            parent_id: r.parent_id,
            author_id: r.author_id,
            author_name: r.author_username,
            created_at: r.created_at,
            content: r.content,
            vote_score: r.vote_score,
        }
    }
}

impl From<Comment> for CommentRow {
    fn from(c: Comment) -> CommentRow {
        CommentRow {
            id: c.id,
            post_id: c.post_id,
            parent_id: c.parent_id,
            author_id: c.author_id,
            author_username: c.author_name,
            created_at: c.created_at,
            content: c.content,
            vote_score: c.vote_score,
        }
    }
}

#[derive(Deserialize)]
struct VoteTypeRow {
    vote_type: VoteDirection,
}

#[derive(Deserialize)]
struct ScoreRow {
    vote_score: i64,
}

#[derive(Deserialize)]
struct IdRow {}

/// Maps a non-success status to the error kinds the client core knows how to handle
fn classify_status(status: StatusCode, body: &str) -> StoreError {
    match status {
        StatusCode::CONFLICT => StoreError::Conflict,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Unavailable(status.to_string())
        }
        s if s.is_server_error() => StoreError::Unavailable(s.to_string()),
        s => StoreError::Other(anyhow!("backend answered {s}: {body}")),
    }
}

fn classify_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Other(anyhow::Error::new(e).context("talking to the backend"))
    }
}

fn eq(v: impl ToString) -> String {
    format!("eq.{}", v.to_string())
}

/// Column and value identifying the votes of a subject, along with the subject's table
fn subject_filter(s: SubjectId) -> (&'static str, &'static str, String) {
    match s {
        SubjectId::Post(p) => ("posts", "post_id", eq(p.0)),
        SubjectId::Comment(c) => ("comments", "comment_id", eq(c.0)),
    }
}

fn votes_table(s: SubjectId) -> &'static str {
    match s {
        SubjectId::Post(_) => "post_votes",
        SubjectId::Comment(_) => "comment_votes",
    }
}

/// PostgREST query parameters for a post listing
fn post_query_params(q: &PostQuery) -> Vec<(&'static str, String)> {
    let order = match q.sort {
        PostSort::New => "created_at.desc,id.asc",
        PostSort::Top => "vote_score.desc,id.asc",
        PostSort::Hot => "vote_score.desc,created_at.desc,id.asc",
    };
    let mut params = vec![
        ("select", String::from("*")),
        ("order", String::from(order)),
        ("limit", q.limit.to_string()),
    ];
    if let Some(c) = &q.community {
        params.push(("category", eq(c)));
    }
    if let Some(a) = &q.author {
        params.push(("author_username", eq(a)));
    }
    if let Some(phrase) = &q.phrase {
        // reserved characters would break out of the pattern
        let phrase = phrase.replace(|c: char| ",.()*\"\\".contains(c), " ");
        params.push((
            "or",
            format!("(title.ilike.*{phrase}*,content.ilike.*{phrase}*)"),
        ));
    }
    params
}

impl RestStore {
    pub fn new(config: RestConfig) -> anyhow::Result<RestStore> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building http client")?;
        Ok(RestStore { client, config })
    }

    fn request(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        let url = format!(
            "{}/rest/v1/{}{}",
            self.config.url.trim_end_matches('/'),
            self.config.table_prefix,
            table
        );
        let token = self
            .config
            .access_token
            .as_ref()
            .unwrap_or(&self.config.anon_key);
        self.client
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let resp = req.send().await.map_err(classify_error)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(%status, %body, "backend returned an error");
        Err(classify_status(status, &body))
    }

    async fn rows<R: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Vec<R>, StoreError> {
        self.send(req)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Other(anyhow::Error::new(e).context("parsing backend rows")))
    }

    async fn select<R: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<R>, StoreError> {
        self.rows(self.request(reqwest::Method::GET, table).query(params))
            .await
    }

    async fn insert<B: Serialize>(&self, table: &str, body: &B) -> Result<(), StoreError> {
        self.send(
            self.request(reqwest::Method::POST, table)
                .header("Prefer", "return=minimal")
                .json(body),
        )
        .await?;
        Ok(())
    }

    /// Inserts, or overwrites the row with the same primary key
    async fn upsert<B: Serialize>(&self, table: &str, body: &B) -> Result<(), StoreError> {
        self.send(
            self.request(reqwest::Method::POST, table)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(body),
        )
        .await?;
        Ok(())
    }

    /// Returns the number of rows the update matched
    async fn update<B: Serialize>(
        &self,
        table: &str,
        params: &[(&str, String)],
        body: &B,
    ) -> Result<usize, StoreError> {
        let rows: Vec<IdRow> = self
            .rows(
                self.request(reqwest::Method::PATCH, table)
                    .query(params)
                    .header("Prefer", "return=representation")
                    .json(body),
            )
            .await?;
        Ok(rows.len())
    }

    /// Returns the number of rows deleted
    async fn delete(&self, table: &str, params: &[(&str, String)]) -> Result<usize, StoreError> {
        let rows: Vec<IdRow> = self
            .rows(
                self.request(reqwest::Method::DELETE, table)
                    .query(params)
                    .header("Prefer", "return=representation"),
            )
            .await?;
        Ok(rows.len())
    }
}

#[async_trait]
impl Store for RestStore {
    async fn fetch_subject_score(&self, s: SubjectId) -> Result<Option<i64>, StoreError> {
        let (table, _, id) = subject_filter(s);
        let rows: Vec<ScoreRow> = self
            .select(table, &[("select", String::from("vote_score")), ("id", id)])
            .await?;
        Ok(rows.first().map(|r| r.vote_score))
    }

    async fn fetch_vote(
        &self,
        s: SubjectId,
        voter: UserId,
    ) -> Result<Option<VoteDirection>, StoreError> {
        let (_, col, id) = subject_filter(s);
        let rows: Vec<VoteTypeRow> = self
            .select(
                votes_table(s),
                &[
                    ("select", String::from("vote_type")),
                    (col, id),
                    ("user_id", eq(voter.0)),
                ],
            )
            .await?;
        Ok(rows.first().map(|r| r.vote_type))
    }

    async fn insert_vote(&self, v: Vote) -> Result<(), StoreError> {
        let (_, col, _) = subject_filter(v.subject);
        let subject = match v.subject {
            SubjectId::Post(p) => p.0,
            SubjectId::Comment(c) => c.0,
        };
        self.insert(
            votes_table(v.subject),
            &serde_json::json!({
                (col): subject,
                "user_id": v.voter,
                "vote_type": v.direction,
            }),
        )
        .await
    }

    async fn update_vote(&self, v: Vote, expected: VoteDirection) -> Result<(), StoreError> {
        let (_, col, id) = subject_filter(v.subject);
        let matched = self
            .update(
                votes_table(v.subject),
                &[
                    (col, id),
                    ("user_id", eq(v.voter.0)),
                    ("vote_type", eq(expected.as_str())),
                ],
                &serde_json::json!({ "vote_type": v.direction }),
            )
            .await?;
        match matched {
            0 => Err(StoreError::Conflict),
            _ => Ok(()),
        }
    }

    async fn delete_vote(
        &self,
        s: SubjectId,
        voter: UserId,
        expected: VoteDirection,
    ) -> Result<(), StoreError> {
        let (_, col, id) = subject_filter(s);
        let deleted = self
            .delete(
                votes_table(s),
                &[
                    (col, id),
                    ("user_id", eq(voter.0)),
                    ("vote_type", eq(expected.as_str())),
                ],
            )
            .await?;
        match deleted {
            0 => Err(StoreError::Conflict),
            _ => Ok(()),
        }
    }

    async fn tally_votes(&self, s: SubjectId) -> Result<Tally, StoreError> {
        let (_, col, id) = subject_filter(s);
        let rows: Vec<VoteTypeRow> = self
            .select(
                votes_table(s),
                &[("select", String::from("vote_type")), (col, id)],
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.vote_type).collect())
    }

    async fn set_vote_score(&self, s: SubjectId, score: i64) -> Result<(), StoreError> {
        let (table, _, id) = subject_filter(s);
        let matched = self
            .update(
                table,
                &[("id", id)],
                &serde_json::json!({ "vote_score": score }),
            )
            .await?;
        match matched {
            0 => Err(StoreError::NotFound(s)),
            _ => Ok(()),
        }
    }

    async fn fetch_post(&self, p: PostId) -> Result<Option<Post>, StoreError> {
        let rows: Vec<PostRow> = self
            .select("posts", &[("select", String::from("*")), ("id", eq(p.0))])
            .await?;
        Ok(rows.into_iter().next().map(Post::from))
    }

    async fn fetch_posts(&self, q: &PostQuery) -> Result<Vec<Post>, StoreError> {
        let rows: Vec<PostRow> = self.select("posts", &post_query_params(q)).await?;
        let mut posts = rows.into_iter().map(Post::from).collect::<Vec<_>>();
        q.sort.sort(&mut posts);
        Ok(posts)
    }

    async fn insert_post(&self, p: Post) -> Result<(), StoreError> {
        self.insert("posts", &PostRow::from(p)).await
    }

    async fn fetch_comments(&self, p: PostId) -> Result<Vec<Comment>, StoreError> {
        let rows: Vec<CommentRow> = self
            .select(
                "comments",
                &[("select", String::from("*")), ("post_id", eq(p.0))],
            )
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn insert_comment(&self, c: Comment) -> Result<(), StoreError> {
        self.insert("comments", &CommentRow::from(c)).await
    }

    async fn count_comments(&self, p: PostId) -> Result<i64, StoreError> {
        let rows: Vec<IdRow> = self
            .select(
                "comments",
                &[("select", String::from("id")), ("post_id", eq(p.0))],
            )
            .await?;
        Ok(rows.len() as i64)
    }

    async fn set_comment_count(&self, p: PostId, count: i64) -> Result<(), StoreError> {
        let matched = self
            .update(
                "posts",
                &[("id", eq(p.0))],
                &serde_json::json!({ "comment_count": count }),
            )
            .await?;
        match matched {
            0 => Err(StoreError::NotFound(SubjectId::Post(p))),
            _ => Ok(()),
        }
    }

    async fn fetch_notifications(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        self.select(
            "notifications",
            &[
                ("select", String::from("*")),
                ("user_id", eq(user.0)),
                ("order", String::from("created_at.desc")),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn mark_notification_read(
        &self,
        user: UserId,
        id: NotificationId,
    ) -> Result<(), StoreError> {
        self.update(
            "notifications",
            &[("id", eq(id.0)), ("user_id", eq(user.0))],
            &serde_json::json!({ "read": true }),
        )
        .await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user: UserId) -> Result<(), StoreError> {
        self.update(
            "notifications",
            &[("user_id", eq(user.0)), ("read", String::from("eq.false"))],
            &serde_json::json!({ "read": true }),
        )
        .await?;
        Ok(())
    }

    async fn fetch_communities(&self) -> Result<Vec<Community>, StoreError> {
        self.select(
            "communities",
            &[
                ("select", String::from("*")),
                ("order", String::from("created_at.desc")),
            ],
        )
        .await
    }

    async fn fetch_community(&self, name: &str) -> Result<Option<Community>, StoreError> {
        let rows: Vec<Community> = self
            .select(
                "communities",
                &[("select", String::from("*")), ("name", eq(name))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_community(&self, c: Community) -> Result<(), StoreError> {
        self.insert("communities", &c).await
    }

    async fn fetch_profile(&self, username: &str) -> Result<Option<Profile>, StoreError> {
        let rows: Vec<Profile> = self
            .select(
                "profiles",
                &[("select", String::from("*")), ("username", eq(username))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_profile(&self, p: Profile) -> Result<(), StoreError> {
        self.upsert("profiles", &p).await
    }
}
