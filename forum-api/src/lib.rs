use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod auth;
pub use auth::{Auth, CurrentUser};

mod comment;
pub use comment::{Comment, CommentId, NewComment};

mod community;
pub use community::{Community, CommunityId, NewCommunity};

mod error;
pub use error::Error;

mod notification;
pub use notification::{NotificationId, NotificationKind, NotificationRecord};

mod post;
pub use post::{NewPost, Post, PostId};

mod push;
pub use push::{PushChannel, PushStream};

mod query;
pub use query::{PostQuery, PostSort};

mod store;
pub use store::{Store, StoreError};

mod user;
pub use user::{Profile, ProfileUpdate, UserId};

mod vote;
pub use vote::{SubjectId, Tally, Vote, VoteDirection};

// Strings typed by users end up in postgres text columns, which reject NUL bytes
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Like `validate_string`, but also rejects text that is blank once trimmed
pub fn validate_content(what: &str, s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.trim().is_empty() {
        return Err(Error::InvalidContent(format!("{what} must not be empty")));
    }
    Ok(())
}
