use crate::{PostId, StoreError, SubjectId};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("You need to log in to do this")]
    Unauthenticated,

    #[error("{0} no longer exists")]
    SubjectNotFound(SubjectId),

    #[error("Post {0:?} no longer exists")]
    PostNotFound(PostId),

    #[error("No user named {0:?}")]
    ProfileNotFound(String),

    #[error("No community named {0:?}")]
    CommunityNotFound(String),

    #[error("A community named {0:?} already exists")]
    CommunityExists(String),

    #[error("Backend unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Another change happened at the same time, please try again")]
    ConflictingWrite,

    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),
}

impl Error {
    /// Transient errors, for which retrying the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::ConflictingWrite)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Error {
        match e {
            StoreError::Unavailable(msg) => Error::StoreUnavailable(msg),
            StoreError::Conflict => Error::ConflictingWrite,
            StoreError::NotFound(s) => Error::SubjectNotFound(s),
            StoreError::Other(err) => {
                tracing::error!(?err, "unexpected store error");
                Error::Unknown(String::from("Internal error, see logs for details"))
            }
        }
    }
}
