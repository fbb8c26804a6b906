use uuid::Uuid;

use crate::{CurrentUser, Error, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Editable part of a profile. `None` clears the field.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(bio) = &self.bio {
            crate::validate_string(bio)?;
        }
        if let Some(url) = &self.avatar_url {
            crate::validate_string(url)?;
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(Error::InvalidContent(String::from(
                    "avatar url must be an http(s) link",
                )));
            }
        }
        Ok(())
    }

    /// The full profile row of `user` once this update is applied
    pub fn into_profile(self, user: &CurrentUser) -> Profile {
        Profile {
            id: user.id,
            username: user.name.clone(),
            bio: self.bio.filter(|b| !b.trim().is_empty()),
            avatar_url: self.avatar_url,
        }
    }
}
