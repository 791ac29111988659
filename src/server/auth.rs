//! Authentication gate for connecting clients.
//!
//! # Responsibilities
//! - Resolve the configured policy once (none, token, or user/password)
//! - Decide whether presented credentials satisfy it
//!
//! # Design Decisions
//! - Pure function of immutable config: safe to call from every connection
//!   task without locking
//! - A configured token takes precedence over username/password
//! - Failure is a boolean outcome; the connection task turns it into a
//!   protocol rejection and close

use serde::Deserialize;

use crate::config::AuthConfig;

/// Credentials a client presents in its `CONNECT`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub user: Option<String>,
    pub pass: Option<String>,
    pub auth_token: Option<String>,
}

/// Resolved authentication policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    None,
    Token(String),
    UserPassword { username: String, password: String },
}

/// Decides whether a client may proceed.
#[derive(Debug, Clone)]
pub struct AuthGate {
    policy: AuthPolicy,
}

impl AuthGate {
    pub fn new(policy: AuthPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        let policy = if let Some(token) = non_empty(&config.token) {
            AuthPolicy::Token(token)
        } else if let Some(username) = non_empty(&config.username) {
            AuthPolicy::UserPassword {
                username,
                password: config.password.clone().unwrap_or_default(),
            }
        } else {
            AuthPolicy::None
        };

        Self { policy }
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn is_required(&self) -> bool {
        self.policy != AuthPolicy::None
    }

    /// Check presented credentials against the policy.
    pub fn check(&self, presented: &Credentials) -> bool {
        match &self.policy {
            AuthPolicy::None => true,
            AuthPolicy::Token(token) => presented.auth_token.as_deref() == Some(token.as_str()),
            AuthPolicy::UserPassword { username, password } => {
                presented.user.as_deref().unwrap_or_default() == username
                    && presented.pass.as_deref().unwrap_or_default() == password
            }
        }
    }
}
