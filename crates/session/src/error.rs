//! Error types for session operations

/// Errors from the authentication backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to reach the server: {0}")]
    Http(String),

    #[error("{0}")]
    Rejected(String),

    #[error("session expired")]
    SessionExpired,

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Login or registration failure, with a reason suitable for inline form
/// feedback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct AuthFailure {
    pub reason: String,
}

impl From<Error> for AuthFailure {
    fn from(err: Error) -> Self {
        Self {
            reason: err.to_string(),
        }
    }
}
