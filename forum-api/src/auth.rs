use crate::UserId;

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CurrentUser {
    pub id: UserId,

    /// Display name, copied onto the posts and comments this user writes
    pub name: String,
}

/// Yields the signed-in user, if any
pub trait Auth: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;
}

/// A fixed session, eg. restored from local storage or passed on the command line
impl Auth for Option<CurrentUser> {
    fn current_user(&self) -> Option<CurrentUser> {
        self.clone()
    }
}

impl<A: ?Sized + Auth> Auth for std::sync::Arc<A> {
    fn current_user(&self) -> Option<CurrentUser> {
        (**self).current_user()
    }
}
