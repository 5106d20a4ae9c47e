//! Session lifecycle: login, register, logout, startup restore, route guard
//!
//! Phases:
//! - `Uninitialized` → (`initialize_once`) → `Anonymous` | `Authenticated`
//! - `Anonymous` → (`login`/`register` success) → `Authenticated`
//! - `Authenticated` → (`logout`, unrecoverable refresh) → `Anonymous`
//!
//! Lifecycle actions never return transport errors to the host as panics or
//! unhandled failures: login/register report an `AuthFailure` with a reason,
//! logout always clears local state, and a failed startup restore simply
//! leaves the session anonymous.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::backend::AuthBackend;
use crate::error::{AuthFailure, Result};
use crate::guard::{self, NavigationDecision, RouteAccess};
use crate::identity::{AuthGrant, Credentials, Identity, Registration};
use crate::state::AuthState;

/// Coarse session phase for hosts that render differently before startup
/// restore has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Anonymous,
    Authenticated,
}

impl SessionPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::Anonymous => "anonymous",
            SessionPhase::Authenticated => "authenticated",
        }
    }
}

/// Session lifecycle bound to a shared `AuthState` and an auth backend.
pub struct Session {
    state: Arc<AuthState>,
    backend: Arc<dyn AuthBackend>,
    initialized: OnceCell<()>,
}

impl Session {
    pub fn new(state: Arc<AuthState>, backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            state,
            backend,
            initialized: OnceCell::new(),
        }
    }

    pub fn state(&self) -> &Arc<AuthState> {
        &self.state
    }

    /// Sign in with email and password.
    ///
    /// On rejection the stored token and identity are left untouched.
    pub async fn login(&self, credentials: &Credentials) -> std::result::Result<Identity, AuthFailure> {
        let grant = self.backend.login(credentials).await.map_err(|e| {
            warn!(email = %credentials.email, error = %e, "login failed");
            AuthFailure::from(e)
        })?;
        Ok(self.accept(grant, "login succeeded").await)
    }

    /// Create an account and sign in with it.
    pub async fn register(
        &self,
        registration: &Registration,
    ) -> std::result::Result<Identity, AuthFailure> {
        let grant = self.backend.register(registration).await.map_err(|e| {
            warn!(email = %registration.email, error = %e, "registration failed");
            AuthFailure::from(e)
        })?;
        Ok(self.accept(grant, "registration succeeded").await)
    }

    async fn accept(&self, grant: AuthGrant, message: &'static str) -> Identity {
        let identity = grant.user;
        self.state
            .install(grant.access_token, identity.clone())
            .await;
        info!(user_id = identity.id, admin = identity.is_admin(), "{message}");
        identity
    }

    /// Sign out. The server call is best effort; local state is always cleared.
    pub async fn logout(&self) {
        if let Err(e) = self.backend.logout().await {
            warn!(error = %e, "logout request failed, clearing local session anyway");
        }
        self.state.clear().await;
        info!("logged out");
    }

    /// Recover a session from the refresh credential, once per process.
    ///
    /// Concurrent callers wait on the same attempt. Failure is the normal
    /// outcome for a visitor without a session and is not reported.
    pub async fn initialize_once(&self) {
        self.initialized
            .get_or_init(|| async {
                if self.state.is_authenticated().await {
                    debug!("session already authenticated, skipping restore");
                    return;
                }
                match self.restore().await {
                    Ok(identity) => {
                        info!(user_id = identity.id, "session restored");
                    }
                    Err(e) => {
                        debug!(error = %e, "no session to restore");
                    }
                }
            })
            .await;
    }

    /// A failed identity fetch drops the restored token, unless a login
    /// replaced it in the meantime.
    async fn restore(&self) -> Result<Identity> {
        self.backend.restore().await?;
        let restored = self.state.token().await;
        match self.fetch_identity().await {
            Ok(identity) => Ok(identity),
            Err(e) => {
                if restored.is_some() {
                    self.state.revoke(restored.as_ref()).await;
                }
                Err(e)
            }
        }
    }

    /// Reload the identity from `/auth/me`, replacing the stored one.
    pub async fn fetch_identity(&self) -> Result<Identity> {
        let identity = self.backend.current_user().await?;
        self.state.set_identity(Some(identity.clone())).await;
        Ok(identity)
    }

    pub async fn phase(&self) -> SessionPhase {
        if self.state.is_authenticated().await {
            SessionPhase::Authenticated
        } else if self.initialized.initialized() {
            SessionPhase::Anonymous
        } else {
            SessionPhase::Uninitialized
        }
    }

    /// Gate navigation to `target` on the restored session.
    pub async fn authorize(&self, access: &RouteAccess, target: &str) -> NavigationDecision {
        self.initialize_once().await;
        let snapshot = self.state.snapshot().await;
        let decision = guard::decide(access, snapshot.authenticated, snapshot.admin, target);
        debug!(target, ?decision, "navigation guard");
        decision
    }
}
