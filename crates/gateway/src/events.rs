//! Host notification for unrecoverable session loss
//!
//! The gateway never navigates anywhere itself. When a session cannot be
//! recovered it clears `AuthState` and tells the registered listener, which
//! decides what "send the user to login" means for the host.

use tracing::warn;

/// Why the session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The refresh call itself failed.
    RefreshFailed,
    /// A request replayed with a fresh token was still rejected with 401.
    RejectedAfterRefresh,
}

impl ExpiryReason {
    pub fn label(&self) -> &'static str {
        match self {
            ExpiryReason::RefreshFailed => "refresh_failed",
            ExpiryReason::RejectedAfterRefresh => "rejected_after_refresh",
        }
    }
}

/// Emitted once per unrecoverable session loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExpired {
    /// Path of the request that observed the failure.
    pub path: String,
    pub reason: ExpiryReason,
}

/// Receives session-expired notifications from the gateway.
pub trait SessionListener: Send + Sync {
    fn session_expired(&self, event: &SessionExpired);
}

/// Listener that only logs. Used when the host registers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl SessionListener for LogListener {
    fn session_expired(&self, event: &SessionExpired) {
        warn!(
            path = %event.path,
            reason = event.reason.label(),
            "session expired, sign-in required"
        );
    }
}
