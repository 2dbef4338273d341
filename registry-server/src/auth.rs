//! Caller classification for destructive registry operations.
//!
//! Credentials come from the `Authorization` header, either as
//! `Bearer <token>` or as npm-style `Basic base64(user:token)`. Tokens are
//! resolved to users through `security.tokens` in the config; users listed in
//! `security.admins` are administrators. Unpublish requires an administrator:
//! owning a package is not enough to remove one of its versions.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose, Engine as _};
use std::collections::{HashMap, HashSet};

use crate::config::SecurityConfig;

/// Raw credentials presented with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

impl Credentials {
    /// Extract credentials from the Authorization header.
    ///
    /// A header that is present but unparseable counts as no credentials.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
        else {
            return Credentials::None;
        };

        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if token.is_empty() {
                return Credentials::None;
            }
            return Credentials::Bearer(token.to_string());
        }

        if let Some(encoded) = value.strip_prefix("Basic ") {
            let decoded = general_purpose::STANDARD
                .decode(encoded.trim())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok());
            if let Some((username, password)) = decoded.as_deref().and_then(|d| d.split_once(':'))
            {
                return Credentials::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                };
            }
        }

        Credentials::None
    }
}

/// Privilege level of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    /// No usable credentials
    Anonymous,
    /// Authenticated, but not an administrator
    Owner,
    /// Registry administrator
    Admin,
}

/// Why an unpublish was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthDenied {
    #[error("authentication required")]
    Unauthenticated,
    #[error("admin privileges required")]
    Forbidden,
}

/// Resolves credentials to a [`CallerRole`].
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    tokens: HashMap<String, String>,
    admins: HashSet<String>,
}

impl AuthGate {
    pub fn new(tokens: HashMap<String, String>, admins: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens,
            admins: admins.into_iter().collect(),
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        Self::new(security.tokens.clone(), security.admins.iter().cloned())
    }

    pub fn classify(&self, credentials: &Credentials) -> CallerRole {
        let user = match credentials {
            Credentials::None => None,
            Credentials::Bearer(token) => self.tokens.get(token),
            Credentials::Basic { username, password } => self
                .tokens
                .get(password)
                .filter(|owner| *owner == username),
        };

        match user {
            None => CallerRole::Anonymous,
            Some(user) if self.admins.contains(user) => CallerRole::Admin,
            Some(_) => CallerRole::Owner,
        }
    }

    /// Unpublish is reserved for administrators.
    pub fn authorize_unpublish(role: CallerRole) -> Result<(), AuthDenied> {
        match role {
            CallerRole::Admin => Ok(()),
            CallerRole::Owner => Err(AuthDenied::Forbidden),
            CallerRole::Anonymous => Err(AuthDenied::Unauthenticated),
        }
    }
}
