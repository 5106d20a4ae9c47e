//! Navigation guard
//!
//! Pure decision function over route access flags and the current session.
//! `Session::authorize` wraps it so the guard always sees a restored session.

use serde::Deserialize;

use crate::constants::{HOME_ROUTE, LOGIN_ROUTE, REDIRECT_PARAM};

/// Access flags attached to a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouteAccess {
    /// Only signed-in users may enter.
    pub requires_auth: bool,
    /// Only users holding the admin role may enter.
    pub requires_admin: bool,
    /// Only anonymous users may enter (login, register).
    pub guest: bool,
}

impl RouteAccess {
    pub const PUBLIC: Self = Self {
        requires_auth: false,
        requires_admin: false,
        guest: false,
    };

    pub const AUTHENTICATED: Self = Self {
        requires_auth: true,
        requires_admin: false,
        guest: false,
    };

    pub const ADMIN: Self = Self {
        requires_auth: true,
        requires_admin: true,
        guest: false,
    };

    pub const GUEST: Self = Self {
        requires_auth: false,
        requires_admin: false,
        guest: true,
    };
}

/// Outcome of a navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Proceed,
    /// Send the user to the login entry point, then back to `return_to`.
    Login { return_to: String },
    /// Send the user to the landing page.
    Home,
}

impl NavigationDecision {
    /// Location the host should navigate to, or `None` to stay on target.
    pub fn location(&self) -> Option<String> {
        match self {
            NavigationDecision::Proceed => None,
            NavigationDecision::Login { return_to } => Some(login_location(Some(return_to))),
            NavigationDecision::Home => Some(HOME_ROUTE.to_string()),
        }
    }
}

/// Decide whether navigation to `target` may proceed.
pub fn decide(
    access: &RouteAccess,
    authenticated: bool,
    admin: bool,
    target: &str,
) -> NavigationDecision {
    if (access.requires_auth || access.requires_admin) && !authenticated {
        return NavigationDecision::Login {
            return_to: target.to_string(),
        };
    }
    if access.requires_admin && !admin {
        return NavigationDecision::Home;
    }
    if access.guest && authenticated {
        return NavigationDecision::Home;
    }
    NavigationDecision::Proceed
}

/// Build the login entry point URL, optionally carrying the original target.
pub fn login_location(return_to: Option<&str>) -> String {
    match return_to {
        Some(target) if !target.is_empty() && target != LOGIN_ROUTE => {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair(REDIRECT_PARAM, target)
                .finish();
            format!("{LOGIN_ROUTE}?{query}")
        }
        _ => LOGIN_ROUTE.to_string(),
    }
}
