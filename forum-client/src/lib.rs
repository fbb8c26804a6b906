pub mod comment;
pub use comment::{CommentNode, ThreadOrder};

mod config;
pub use config::ClientConfig;

mod generation;
pub use generation::{Generation, GenerationCounter};

mod lock;
pub use lock::KeyedMutex;

mod notification;
pub use notification::{NotificationCenter, NotificationFeed};

mod retry;

mod thread;
pub use thread::{PendingVote, PostThread, Threads};

mod vote;
pub use vote::{Transition, VoteLedger, VoteOutcome};

pub mod api {
    pub use forum_api::*;
}

#[cfg(test)]
mod test_util;
