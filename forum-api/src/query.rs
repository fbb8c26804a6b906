use std::cmp::Reverse;

use crate::{Error, Post};

/// How post listings are sorted.
///
/// `Hot` is not a time-decayed ranking: it is score-descending, with recency
/// only breaking ties.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    #[default]
    Hot,
    New,
    Top,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PostQuery {
    pub sort: PostSort,
    pub community: Option<String>,

    /// Only posts by this username
    pub author: Option<String>,

    /// Case-insensitive substring search on title and content
    pub phrase: Option<String>,

    pub limit: usize,
}

impl PostSort {
    /// Ties are broken by id, so listings are stable across refreshes
    pub fn sort(&self, posts: &mut [Post]) {
        match self {
            PostSort::New => posts.sort_unstable_by_key(|p| (Reverse(p.created_at), p.id)),
            PostSort::Top => posts.sort_unstable_by_key(|p| (Reverse(p.vote_score), p.id)),
            PostSort::Hot => posts.sort_unstable_by_key(|p| {
                (Reverse(p.vote_score), Reverse(p.created_at), p.id)
            }),
        }
    }
}

impl PostQuery {
    pub fn new(sort: PostSort, limit: usize) -> PostQuery {
        PostQuery {
            sort,
            community: None,
            author: None,
            phrase: None,
            limit,
        }
    }

    pub fn matches(&self, p: &Post) -> bool {
        if let Some(c) = &self.community {
            if p.community.as_ref() != Some(c) {
                return false;
            }
        }
        if let Some(a) = &self.author {
            if p.author_name != *a {
                return false;
            }
        }
        if let Some(phrase) = &self.phrase {
            let phrase = phrase.to_lowercase();
            if !p.title.to_lowercase().contains(&phrase)
                && !p.content.to_lowercase().contains(&phrase)
            {
                return false;
            }
        }
        true
    }

    /// Filters, sorts and truncates an unordered set of posts
    pub fn apply(&self, posts: impl IntoIterator<Item = Post>) -> Vec<Post> {
        let mut res = posts
            .into_iter()
            .filter(|p| self.matches(p))
            .collect::<Vec<_>>();
        self.sort.sort(&mut res);
        res.truncate(self.limit);
        res
    }

    pub fn validate(&self) -> Result<(), Error> {
        for s in [&self.community, &self.author, &self.phrase]
            .into_iter()
            .flatten()
        {
            crate::validate_string(s)?;
        }
        Ok(())
    }
}
