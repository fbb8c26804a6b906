use chrono::Utc;
use uuid::Uuid;

use crate::{CurrentUser, Error, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommunityId(pub Uuid);

/// A place posts get submitted to. Posts refer to it by name.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_public: bool,
    pub created_by: UserId,
    pub created_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewCommunity {
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
}

impl NewCommunity {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_content("community name", &self.name)?;
        if let Some(d) = &self.description {
            crate::validate_string(d)?;
        }
        Ok(())
    }

    pub fn into_community(self, creator: &CurrentUser) -> Community {
        Community {
            id: CommunityId(Uuid::new_v4()),
            name: self.name.trim().to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            is_public: self.is_public,
            created_by: creator.id,
            created_at: Utc::now(),
        }
    }
}
