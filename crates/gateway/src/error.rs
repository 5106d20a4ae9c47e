//! Error types for gateway requests

use reqwest::StatusCode;

/// Errors surfaced to gateway callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure (connection refused, timeout, TLS).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success status. 401s only surface
    /// here when a queued request gave up waiting for a refresh.
    #[error("server returned {status}: {reason}")]
    Status { status: u16, reason: String },

    /// The session could not be recovered; the user must sign in again.
    #[error("session expired, sign in again")]
    SessionExpired,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired)
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Consume a non-success response into a `Status` error.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Error::Status {
            status: status.as_u16(),
            reason: problem_reason(status, &body),
        }
    }
}

impl From<Error> for session::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Http(msg) => session::Error::Http(msg),
            Error::Status { reason, .. } => session::Error::Rejected(reason),
            Error::SessionExpired => session::Error::SessionExpired,
            Error::InvalidResponse(msg) | Error::InvalidRequest(msg) => {
                session::Error::InvalidResponse(msg)
            }
        }
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Longest raw body echoed back as a failure reason.
const MAX_RAW_REASON_LEN: usize = 200;

/// Extract a human-readable reason from an error body.
///
/// The API answers with RFC 7807 problem details (`detail`, `title`); other
/// services use `message` or a nested `error.message`.
pub(crate) fn problem_reason(status: StatusCode, body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "message", "error", "title"] {
            let text = match map.get(key) {
                Some(serde_json::Value::String(s)) => Some(s.as_str()),
                Some(serde_json::Value::Object(inner)) => {
                    inner.get("message").and_then(serde_json::Value::as_str)
                }
                _ => None,
            };
            if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
                return text.trim().to_string();
            }
        }
    }

    let raw = body.trim();
    if !raw.is_empty() && raw.len() <= MAX_RAW_REASON_LEN && !raw.starts_with('{') {
        return raw.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}
