//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The account password is loaded from CONSOLE_PASSWORD or password_file,
//! never stored in the TOML directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use gateway::GatewayConfig;
use serde::Deserialize;
use session::{Credentials, RouteAccess};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub account: Option<AccountConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// API connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// How long a request queued behind a token refresh waits.
    #[serde(default = "default_timeout")]
    pub queue_timeout_secs: u64,
    /// Origin presented to the API, which checks it on refresh and logout.
    #[serde(default)]
    pub origin: Option<String>,
}

/// Account used when a command needs a session and none can be restored
#[derive(Debug, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to CONSOLE_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

/// Access flags for one console route
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub path: String,
    #[serde(flatten)]
    pub access: RouteAccess,
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. CONSOLE_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| common::Error::read(path, e))?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.api.base_url = url;
        }

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.api.queue_timeout_secs == 0 {
            return Err(common::Error::Config(
                "queue_timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(origin) = &config.api.origin {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "origin must start with http:// or https://, got: {origin}"
                )));
            }
        }

        for route in &config.routes {
            if !route.path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "route path must start with '/', got: {}",
                    route.path
                )));
            }
        }

        if let Some(account) = config.account.as_mut() {
            if let Ok(password) = std::env::var("CONSOLE_PASSWORD") {
                account.password = Some(Secret::new(password));
            } else if let Some(ref password_file) = account.password_file {
                let password = std::fs::read_to_string(password_file)
                    .map_err(|e| common::Error::read(password_file, e))?;
                let password = password.trim_end_matches(['\r', '\n']).to_owned();
                if !password.is_empty() {
                    account.password = Some(Secret::new(password));
                }
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("devsite-console.toml")
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        let mut gateway = GatewayConfig::new(self.api.base_url.clone());
        gateway.timeout = Duration::from_secs(self.api.timeout_secs);
        gateway.queue_timeout = Duration::from_secs(self.api.queue_timeout_secs);
        gateway.origin = self.api.origin.clone();
        gateway
    }

    /// Login credentials, if an account with a password is configured.
    pub fn credentials(&self) -> Option<Credentials> {
        let account = self.account.as_ref()?;
        let password = account.password.as_ref()?;
        Some(Credentials {
            email: account.email.clone(),
            password: password.clone(),
        })
    }

    /// Access flags for `path`. Unlisted routes are public.
    pub fn route_access(&self, path: &str) -> RouteAccess {
        let route_path = path.split(['?', '#']).next().unwrap_or(path);
        self.routes
            .iter()
            .find(|r| r.path == route_path)
            .map(|r| r.access)
            .unwrap_or(RouteAccess::PUBLIC)
    }
}
