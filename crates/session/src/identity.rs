//! Identity and credential types exchanged with the auth endpoints
//!
//! The backend reports the display name as `nickname` and a single `role`
//! string, while other endpoints use `name` and a `roles` array. Both shapes
//! deserialize into the same `Identity`.

use std::collections::BTreeSet;

use common::Secret;
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::ADMIN_ROLE;

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    pub email: String,
    #[serde(alias = "nickname")]
    pub name: String,
    #[serde(default, alias = "role", deserialize_with = "one_or_many")]
    pub roles: BTreeSet<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Roles {
        One(String),
        Many(Vec<String>),
        Missing(()),
    }

    Ok(match Roles::deserialize(deserializer)? {
        Roles::One(role) => BTreeSet::from([role]),
        Roles::Many(roles) => roles.into_iter().collect(),
        Roles::Missing(()) => BTreeSet::new(),
    })
}

/// Email/password pair submitted by the login form.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: Secret<String>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password.into()),
        }
    }
}

/// Fields submitted by the registration form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: Secret<String>,
}

/// Successful login/register response: a fresh access token plus the user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthGrant {
    pub access_token: Secret<String>,
    pub user: Identity,
}
