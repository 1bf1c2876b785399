//! Session-related types.
//!
//! Identity state published by the session manager and the bearer credential
//! derived from it.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use camstore_core::{Email, UserId};

/// The signed-in identity.
///
/// Minimal data reported by the identity provider to identify the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable identifier assigned by the identity provider.
    pub id: UserId,
    /// Contact address.
    pub email: Email,
}

/// A short-lived bearer token proving a [`Session`] to backend services.
///
/// `Debug` output is redacted; the token is only reachable through
/// [`Credential::expose`] when building a request header.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    /// Wrap a raw bearer token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token, for the `Authorization` header only.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Email/password pair handed to the identity provider on sign-in.
#[derive(Clone)]
pub struct SignInCredentials {
    pub email: String,
    pub password: SecretString,
}

impl SignInCredentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl std::fmt::Debug for SignInCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInCredentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Contact details collected when an account is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub phone: String,
    pub address: String,
}

impl RegistrationForm {
    /// Required fields that are blank, in form order.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [("phone", &self.phone), ("address", &self.address)]
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field)
            .collect()
    }
}

/// User record stored for a new account. New accounts are never privileged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub phone: String,
    pub address: String,
    pub is_admin: bool,
}

impl UserProfile {
    #[must_use]
    pub fn new(session: &Session, form: &RegistrationForm) -> Self {
        Self {
            email: session.email.as_str().to_string(),
            phone: form.phone.trim().to_string(),
            address: form.address.trim().to_string(),
            is_admin: false,
        }
    }
}

/// Privilege flag resolved from the role store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Role {
    #[serde(rename = "isPrivileged", alias = "isAdmin", default)]
    pub is_privileged: bool,
}

/// One published identity change.
///
/// `generation` increases by one for every change the session manager
/// publishes, so consumers can tell which of two events is newer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub generation: u64,
    pub session: Option<Session>,
}
