//! Transport seam for session lifecycle actions
//!
//! `Session` never talks HTTP directly. The gateway implements this trait so
//! that the silent restore on startup goes through the same single-flight
//! refresh protocol as request-time recovery.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::identity::{AuthGrant, Credentials, Identity, Registration};

/// Authentication endpoints the session lifecycle depends on.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn AuthBackend>`).
pub trait AuthBackend: Send + Sync {
    /// POST /auth/login. A rejection must come back as `Error::Rejected`
    /// carrying the server's reason.
    fn login<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<AuthGrant>> + Send + 'a>>;

    /// POST /auth/register. Same contract as `login`.
    fn register<'a>(
        &'a self,
        registration: &'a Registration,
    ) -> Pin<Box<dyn Future<Output = Result<AuthGrant>> + Send + 'a>>;

    /// Obtain a new access token from the refresh credential and install it
    /// into the shared `AuthState`. Joins an in-flight refresh if one exists.
    fn restore(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// GET /auth/me with the current access token.
    fn current_user(&self) -> Pin<Box<dyn Future<Output = Result<Identity>> + Send + '_>>;

    /// POST /auth/logout. Callers treat failure as non-fatal.
    fn logout(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
