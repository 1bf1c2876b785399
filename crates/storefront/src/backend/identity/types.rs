//! Wire types for the password identity provider.

use chrono::Utc;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::models::Session;

/// Seconds before expiry at which a cached token is refreshed.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Tokens held for the signed-in session.
pub(super) struct TokenState {
    pub session: Session,
    pub id_token: SecretString,
    pub refresh_token: SecretString,
    /// Unix timestamp after which `id_token` is no longer accepted.
    pub expires_at: i64,
}

impl TokenState {
    /// Whether the id token is expired or about to be.
    pub fn needs_refresh(&self) -> bool {
        Utc::now().timestamp() >= self.expires_at - EXPIRY_MARGIN_SECS
    }
}

/// Body of the password sign-in call.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SignInRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

/// Successful password sign-in.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SignInResponse {
    pub local_id: String,
    pub email: String,
    pub id_token: String,
    pub refresh_token: String,
    #[serde(deserialize_with = "lifetime_secs")]
    pub expires_in: i64,
}

/// Successful refresh-token exchange.
#[derive(Deserialize)]
pub(super) struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    #[serde(deserialize_with = "lifetime_secs")]
    pub expires_in: i64,
    pub user_id: String,
}

/// `{"error": {"message": "INVALID_PASSWORD", ...}}`
#[derive(Deserialize)]
pub(super) struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Deserialize)]
pub(super) struct ErrorBody {
    pub message: String,
}

/// Token lifetimes arrive as decimal strings (`"3600"`), sometimes as numbers.
fn lifetime_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lifetime {
        Text(String),
        Number(i64),
    }

    match Lifetime::deserialize(deserializer)? {
        Lifetime::Number(secs) => Ok(secs),
        Lifetime::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_as_string_or_number() {
        let json = r#"{"id_token": "a", "refresh_token": "b", "expires_in": "3600", "user_id": "u"}"#;
        let response: RefreshResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.expires_in, 3600);

        let json = r#"{"id_token": "a", "refresh_token": "b", "expires_in": 90, "user_id": "u"}"#;
        let response: RefreshResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.expires_in, 90);
    }

    #[test]
    fn test_sign_in_request_shape() {
        let body = SignInRequest {
            email: "a@b.in",
            password: "pw",
            return_secure_token: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["returnSecureToken"], true);
    }
}
