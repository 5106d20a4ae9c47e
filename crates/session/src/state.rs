//! In-memory session state
//!
//! `AuthState` is the single source of truth for the access token and the
//! authenticated identity. Nothing here is ever persisted: a process restart
//! (or a page reload on the web) starts from an empty state, and the session
//! is recovered from the refresh cookie instead.
//!
//! `is_authenticated` and `is_admin` are computed on every read from the
//! stored token/identity; they have no storage of their own.

use common::Secret;
use tokio::sync::RwLock;
use tracing::debug;

use crate::identity::Identity;

#[derive(Default)]
struct SessionData {
    token: Option<Secret<String>>,
    identity: Option<Identity>,
}

impl SessionData {
    fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn is_admin(&self) -> bool {
        self.identity.as_ref().is_some_and(Identity::is_admin)
    }
}

/// Consistent view of the session read under a single lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub admin: bool,
    pub identity: Option<Identity>,
}

/// Access token and identity holder shared by the session and the gateway.
#[derive(Default)]
pub struct AuthState {
    data: RwLock<SessionData>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the access token. Identity is left as is.
    pub async fn set_token(&self, token: Option<Secret<String>>) {
        self.data.write().await.token = token;
    }

    /// Replace the identity. The token is left as is.
    pub async fn set_identity(&self, identity: Option<Identity>) {
        self.data.write().await.identity = identity;
    }

    /// Install a token and identity together (login/register).
    pub async fn install(&self, token: Secret<String>, identity: Identity) {
        let mut data = self.data.write().await;
        data.token = Some(token);
        data.identity = Some(identity);
    }

    /// Drop both the token and the identity.
    ///
    /// Returns whether a session was present, so concurrent teardowns can
    /// tell which one actually ended it.
    pub async fn clear(&self) -> bool {
        let mut data = self.data.write().await;
        let was_authenticated = data.is_authenticated();
        data.token = None;
        data.identity = None;
        debug!(was_authenticated, "session state cleared");
        was_authenticated
    }

    /// Clear the session only while the stored access token is still `token`.
    ///
    /// A rejection of a token that has since been replaced must not end the
    /// newer session. Returns false, leaving the state untouched, when the
    /// token was replaced.
    pub async fn revoke(&self, token: Option<&Secret<String>>) -> bool {
        let mut data = self.data.write().await;
        if data.token.as_ref() != token {
            debug!("revoked token already replaced, keeping session");
            return false;
        }
        data.token = None;
        data.identity = None;
        debug!("session state revoked");
        true
    }

    pub async fn token(&self) -> Option<Secret<String>> {
        self.data.read().await.token.clone()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.data.read().await.identity.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.data.read().await.is_authenticated()
    }

    pub async fn is_admin(&self) -> bool {
        self.data.read().await.is_admin()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let data = self.data.read().await;
        SessionSnapshot {
            authenticated: data.is_authenticated(),
            admin: data.is_admin(),
            identity: data.identity.clone(),
        }
    }
}
