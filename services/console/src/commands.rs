//! Console commands over a restored session

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use gateway::{Gateway, SessionExpired, SessionListener};
use serde_json::{Value, json};
use session::{AuthState, NavigationDecision, Session};
use tracing::{info, warn};

use crate::cli::Command;
use crate::config::Config;

/// Exit code for an unrecoverable session loss.
pub const EXIT_SESSION_EXPIRED: u8 = 2;

/// Maps the gateway's session-expired event onto the process exit code.
#[derive(Default)]
pub struct ExitListener {
    expired: AtomicBool,
}

impl ExitListener {
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

impl SessionListener for ExitListener {
    fn session_expired(&self, event: &SessionExpired) {
        self.expired.store(true, Ordering::SeqCst);
        warn!(
            path = %event.path,
            reason = event.reason.label(),
            "session expired, run `devsite-console login` to sign in again"
        );
    }
}

/// Session, gateway and config wired together for one invocation.
pub struct Console {
    config: Config,
    gateway: Arc<Gateway>,
    session: Session,
}

impl Console {
    pub fn new(config: Config, listener: Arc<dyn SessionListener>) -> Result<Self> {
        let state = Arc::new(AuthState::new());
        let gateway = Gateway::new(config.gateway_config(), state.clone())
            .context("failed to build API gateway")?
            .with_listener(listener);
        let gateway = Arc::new(gateway);
        let session = Session::new(state, gateway.clone());
        Ok(Self {
            config,
            gateway,
            session,
        })
    }

    /// Restore the session, run `command`, and return what to print.
    pub async fn run(&self, command: &Command) -> Result<Value> {
        self.session.initialize_once().await;
        info!(phase = self.session.phase().await.label(), "session initialized");

        match command {
            Command::Status => self.status().await,
            Command::Whoami => {
                self.sign_in_if_needed().await?;
                let identity = self.session.fetch_identity().await?;
                Ok(serde_json::to_value(identity)?)
            }
            Command::Login => {
                let identity = self.login().await?;
                Ok(serde_json::to_value(identity)?)
            }
            Command::Logout => {
                self.session.logout().await;
                Ok(json!({"phase": self.session.phase().await.label()}))
            }
            Command::Get(path) => {
                self.sign_in_if_needed().await?;
                Ok(self.gateway.get::<Value>(path).await?)
            }
            Command::Open(route) => {
                let access = self.config.route_access(route);
                let decision = self.session.authorize(&access, route).await;
                Ok(match decision {
                    NavigationDecision::Proceed => json!({"route": route, "decision": "proceed"}),
                    other => json!({
                        "route": route,
                        "decision": "redirect",
                        "location": other.location(),
                    }),
                })
            }
        }
    }

    async fn status(&self) -> Result<Value> {
        let snapshot = self.session.state().snapshot().await;
        Ok(json!({
            "phase": self.session.phase().await.label(),
            "admin": snapshot.admin,
            "identity": snapshot.identity,
        }))
    }

    async fn login(&self) -> Result<session::Identity> {
        let credentials = self
            .config
            .credentials()
            .ok_or_else(|| anyhow!("no [account] with a password configured"))?;
        self.session
            .login(&credentials)
            .await
            .map_err(|failure| anyhow!("login failed: {}", failure.reason))
    }

    /// Log in with the configured account when the restore left us anonymous.
    /// Without an account the request goes out anonymously.
    async fn sign_in_if_needed(&self) -> Result<()> {
        if self.session.state().is_authenticated().await || self.config.credentials().is_none() {
            return Ok(());
        }
        self.login().await.map(|_| ())
    }
}

/// Exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let expired = err.chain().any(|cause| {
        cause
            .downcast_ref::<gateway::Error>()
            .is_some_and(gateway::Error::is_session_expired)
            || matches!(
                cause.downcast_ref::<session::Error>(),
                Some(session::Error::SessionExpired)
            )
    });
    if expired { EXIT_SESSION_EXPIRED } else { 1 }
}
