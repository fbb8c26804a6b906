use uuid::Uuid;

use crate::{Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct NotificationId(pub Uuid);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Comment,
    Vote,
    Follow,
    Mention,
    #[serde(other)]
    Other,
}

/// Created server-side on a triggering event. Clients only ever flip `read`.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: Time,

    /// Deep-link into the app, eg. the post that got commented on
    #[serde(default)]
    pub link: Option<String>,
}
