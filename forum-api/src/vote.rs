use std::fmt;

use crate::{CommentId, PostId, UserId};

/// Anything that can receive votes
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(tag = "type", content = "id", rename_all = "kebab-case")]
pub enum SubjectId {
    Post(PostId),
    Comment(CommentId),
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::Post(p) => write!(f, "post {}", p.0),
            SubjectId::Comment(c) => write!(f, "comment {}", c.0),
        }
    }
}

impl From<PostId> for SubjectId {
    fn from(p: PostId) -> SubjectId {
        SubjectId::Post(p)
    }
}

impl From<CommentId> for SubjectId {
    fn from(c: CommentId) -> SubjectId {
        SubjectId::Comment(c)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    /// Contribution of one vote in this direction to a subject's score
    pub fn weight(self) -> i64 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }

    /// Same as the serialized form, for use in query filters
    pub fn as_str(self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

/// A voter's standing vote on a subject. There is at most one per (subject, voter).
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Vote {
    pub subject: SubjectId,
    pub voter: UserId,
    pub direction: VoteDirection,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Tally {
    pub up: i64,
    pub down: i64,
}

impl Tally {
    pub fn count(&mut self, d: VoteDirection) {
        match d {
            VoteDirection::Up => self.up += 1,
            VoteDirection::Down => self.down += 1,
        }
    }

    pub fn score(&self) -> i64 {
        self.up - self.down
    }
}

impl FromIterator<VoteDirection> for Tally {
    fn from_iter<I: IntoIterator<Item = VoteDirection>>(iter: I) -> Tally {
        let mut res = Tally::default();
        for d in iter {
            res.count(d);
        }
        res
    }
}
