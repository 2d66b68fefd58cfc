//! Caller identity.
//!
//! The auth provider is outside the billing core. It hands over a stable
//! user id and an email address; nothing else about the caller is used.

use thiserror::Error;

use super::UserId;

/// Identity of the user making a billing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
}

impl AuthenticatedUser {
    pub fn new(id: UserId, email: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            id,
            email: email.into(),
            display_name,
        }
    }

    /// Returns the user's display name, or email as fallback.
    pub fn display_name_or_email(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No identity was supplied with the request.
    #[error("Missing identity")]
    MissingIdentity,

    /// An identity was supplied but is malformed.
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),
}
