//! Request gateway for the developer-site API
//!
//! Every outbound API call goes through `Gateway`, which attaches the
//! in-memory access token and hides token expiry from callers:
//!
//! 1. Request dispatched with `Authorization: Bearer <token>` (omitted when anonymous)
//! 2. Any status other than 401 is returned to the caller unchanged
//! 3. On 401, exactly one refresh call is made no matter how many requests
//!    fail at once; the others queue behind it
//! 4. On refresh success every queued request and the triggering request are
//!    replayed once with the new token
//! 5. On refresh failure, or a second 401 after replay, the session is
//!    cleared, the host is notified through `SessionListener`, and callers
//!    receive `Error::SessionExpired`
//!
//! `Gateway` also implements `session::AuthBackend`, so login, logout and the
//! startup restore share its HTTP client (and its refresh cookie jar).

pub mod backend;
pub mod client;
pub mod constants;
pub mod error;
pub mod events;
pub mod refresh;
pub mod request;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use client::{Gateway, GatewayConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use events::{ExpiryReason, LogListener, SessionExpired, SessionListener};
pub use refresh::RefreshCoordinator;
pub use request::ApiRequest;
