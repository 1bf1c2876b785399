//! Email/password identity provider.
//!
//! Signs in against a hosted identity service and keeps the resulting id
//! token and refresh token in memory. [`IdentityProvider::issue_token`]
//! hands out the cached id token until it is within a minute of expiry,
//! then exchanges the refresh token for a new one.

mod types;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument, warn};
use url::Url;

use camstore_core::{Email, UserId};

use super::{IdentityProvider, RemoteError, transport_error};
use crate::config::{IdentityConfig, StorefrontConfig};
use crate::models::{Credential, Session, SignInCredentials};

use types::{ErrorResponse, RefreshResponse, SignInRequest, SignInResponse, TokenState};

/// Identity provider backed by password sign-in and refresh tokens.
#[derive(Clone)]
pub struct PasswordIdentityProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    client: reqwest::Client,
    config: IdentityConfig,
    tokens: Mutex<Option<TokenState>>,
}

impl PasswordIdentityProvider {
    /// Create a provider with no signed-in session.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Http` if the HTTP client cannot be built.
    pub fn new(config: &StorefrontConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ProviderInner {
                client,
                config: config.identity.clone(),
                tokens: Mutex::new(None),
            }),
        })
    }

    fn tokens(&self) -> MutexGuard<'_, Option<TokenState>> {
        self.inner
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// `url` with the web API key appended.
    fn keyed(&self, url: &Url) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("key", self.inner.config.api_key.expose_secret());
        url
    }

    /// Post an email/password pair to `url` and keep the returned tokens.
    ///
    /// Sign-in and account creation answer with the same body.
    async fn password_call(
        &self,
        url: &Url,
        credentials: &SignInCredentials,
    ) -> Result<Session, RemoteError> {
        let request = SignInRequest {
            email: credentials.email.trim(),
            password: credentials.password.expose_secret(),
            return_secure_token: true,
        };

        let response = self
            .inner
            .client
            .post(self.keyed(url))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(provider_error(status, &body));
        }

        let signed_in: SignInResponse = serde_json::from_str(&body)?;
        let session = Session {
            id: UserId::parse(&signed_in.local_id)
                .map_err(|e| RemoteError::Provider(format!("invalid user id: {e}")))?,
            email: Email::parse(&signed_in.email)
                .map_err(|e| RemoteError::Provider(format!("invalid email: {e}")))?,
        };

        *self.tokens() = Some(TokenState {
            session: session.clone(),
            id_token: SecretString::from(signed_in.id_token),
            refresh_token: SecretString::from(signed_in.refresh_token),
            expires_at: Utc::now().timestamp() + signed_in.expires_in,
        });

        Ok(session)
    }

    /// Exchange a refresh token for a new id token.
    ///
    /// The new tokens are stored only if `session` is still the signed-in
    /// identity when the exchange completes.
    async fn refresh(
        &self,
        session: &Session,
        refresh_token: SecretString,
    ) -> Result<Credential, RemoteError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret()),
        ];

        let response = self
            .inner
            .client
            .post(self.keyed(&self.inner.config.token_url))
            .form(&params)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(provider_error(status, &body));
        }

        let refreshed: RefreshResponse = serde_json::from_str(&body)?;
        if refreshed.user_id != session.id.as_str() {
            warn!(user_id = %session.id, "Token refresh returned a different identity");
            return Err(RemoteError::Provider(
                "token refresh returned a different identity".to_string(),
            ));
        }

        let mut tokens = self.tokens();
        match tokens.as_mut() {
            Some(state) if state.session.id == session.id => {
                state.id_token = SecretString::from(refreshed.id_token.clone());
                state.refresh_token = SecretString::from(refreshed.refresh_token);
                state.expires_at = Utc::now().timestamp() + refreshed.expires_in;
                Ok(Credential::new(refreshed.id_token))
            }
            _ => Err(RemoteError::Provider(
                "session ended during token refresh".to_string(),
            )),
        }
    }
}

/// Map a failed identity call to the provider's error code when present.
fn provider_error(status: StatusCode, body: &str) -> RemoteError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return RemoteError::RateLimited(1);
    }
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => RemoteError::Provider(parsed.error.message),
        Err(_) => {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Identity provider returned non-success status"
            );
            RemoteError::Status {
                service: "identity",
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            }
        }
    }
}

impl IdentityProvider for PasswordIdentityProvider {
    #[instrument(skip_all, fields(email = %credentials.email))]
    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<Session, RemoteError> {
        let session = self
            .password_call(&self.inner.config.sign_in_url, credentials)
            .await?;
        info!(user_id = %session.id, "Signed in");
        Ok(session)
    }

    #[instrument(skip_all, fields(email = %credentials.email))]
    async fn sign_up(&self, credentials: &SignInCredentials) -> Result<Session, RemoteError> {
        let session = self
            .password_call(&self.inner.config.sign_up_url, credentials)
            .await?;
        info!(user_id = %session.id, "Account created");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        if let Some(state) = self.tokens().take() {
            info!(user_id = %state.session.id, "Signed out");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(user_id = %session.id))]
    async fn issue_token(&self, session: &Session) -> Result<Credential, RemoteError> {
        let refresh_token = {
            let tokens = self.tokens();
            let Some(state) = tokens.as_ref() else {
                return Err(RemoteError::Provider("no signed-in session".to_string()));
            };
            if state.session.id != session.id {
                return Err(RemoteError::Provider(
                    "token requested for a session that is not signed in".to_string(),
                ));
            }
            if !state.needs_refresh() {
                return Ok(Credential::new(state.id_token.expose_secret()));
            }
            state.refresh_token.clone()
        };

        self.refresh(session, refresh_token).await
    }

    fn last_known_session(&self) -> Option<Session> {
        self.tokens().as_ref().map(|state| state.session.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::backend::mock_server::{Reply, serve};

    const KEY: &str = "AIzaSyB7q2kLm9Xc4Rt8Vw1Pz6Hn3Jd5Fg0Qe";

    fn provider_for(addr: SocketAddr) -> PasswordIdentityProvider {
        let config = StorefrontConfig::from_lookup(|key| match key {
            "CAMSTORE_IDENTITY_API_KEY" => Some(KEY.to_string()),
            "CAMSTORE_IDENTITY_URL" => Some(format!("http://{addr}/v1/accounts:signInWithPassword")),
            "CAMSTORE_SIGN_UP_URL" => Some(format!("http://{addr}/v1/accounts:signUp")),
            "CAMSTORE_TOKEN_URL" => Some(format!("http://{addr}/v1/token")),
            _ => None,
        })
        .unwrap();
        PasswordIdentityProvider::new(&config).unwrap()
    }

    fn signed_in(expires_in: &str) -> Reply {
        Reply::json(
            "200 OK",
            format!(
                r#"{{"localId": "uid-1", "email": "Buyer@Example.com", "idToken": "id-1", "refreshToken": "rt-1", "expiresIn": "{expires_in}"}}"#
            ),
        )
    }

    #[tokio::test]
    async fn test_sign_in_sends_key_and_records_session() {
        let (addr, mut requests) = serve(vec![signed_in("3600")]).await;
        let provider = provider_for(addr);

        let session = provider
            .sign_in(&SignInCredentials::new("buyer@example.com", "pw"))
            .await
            .unwrap();
        assert_eq!(session.id.as_str(), "uid-1");
        assert_eq!(session.email.as_str(), "buyer@example.com");
        assert_eq!(provider.last_known_session(), Some(session));

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with(&format!("POST /v1/accounts:signInWithPassword?key={KEY} ")));
        assert!(request.contains(r#""returnSecureToken":true"#));
    }

    #[tokio::test]
    async fn test_sign_in_error_code() {
        let (addr, _) = serve(vec![Reply::json(
            "400 Bad Request",
            r#"{"error": {"code": 400, "message": "INVALID_PASSWORD"}}"#,
        )])
        .await;
        let provider = provider_for(addr);

        let err = provider
            .sign_in(&SignInCredentials::new("buyer@example.com", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Provider(code) if code == "INVALID_PASSWORD"));
        assert!(provider.last_known_session().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_creates_and_signs_in() {
        let (addr, mut requests) = serve(vec![signed_in("3600")]).await;
        let provider = provider_for(addr);

        let session = provider
            .sign_up(&SignInCredentials::new(" buyer@example.com ", "s3cret-pw"))
            .await
            .unwrap();
        assert_eq!(session.id.as_str(), "uid-1");
        assert_eq!(provider.last_known_session(), Some(session.clone()));
        assert_eq!(provider.issue_token(&session).await.unwrap().expose(), "id-1");

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with(&format!("POST /v1/accounts:signUp?key={KEY} ")));
        assert!(request.contains(r#""email":"buyer@example.com""#));
    }

    #[tokio::test]
    async fn test_sign_up_existing_email() {
        let (addr, _) = serve(vec![Reply::json(
            "400 Bad Request",
            r#"{"error": {"code": 400, "message": "EMAIL_EXISTS"}}"#,
        )])
        .await;
        let provider = provider_for(addr);

        let err = provider
            .sign_up(&SignInCredentials::new("buyer@example.com", "s3cret-pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Provider(code) if code == "EMAIL_EXISTS"));
        assert!(provider.last_known_session().is_none());
    }

    #[tokio::test]
    async fn test_fresh_token_is_reused() {
        // Only one reply: a second network call would fail
        let (addr, _) = serve(vec![signed_in("3600")]).await;
        let provider = provider_for(addr);
        let session = provider
            .sign_in(&SignInCredentials::new("buyer@example.com", "pw"))
            .await
            .unwrap();

        assert_eq!(provider.issue_token(&session).await.unwrap().expose(), "id-1");
        assert_eq!(provider.issue_token(&session).await.unwrap().expose(), "id-1");
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed() {
        let (addr, mut requests) = serve(vec![
            signed_in("30"),
            Reply::json(
                "200 OK",
                r#"{"id_token": "id-2", "refresh_token": "rt-2", "expires_in": "3600", "user_id": "uid-1"}"#,
            ),
        ])
        .await;
        let provider = provider_for(addr);
        let session = provider
            .sign_in(&SignInCredentials::new("buyer@example.com", "pw"))
            .await
            .unwrap();

        let credential = provider.issue_token(&session).await.unwrap();
        assert_eq!(credential.expose(), "id-2");

        let _sign_in = requests.recv().await.unwrap();
        let refresh = requests.recv().await.unwrap();
        assert!(refresh.starts_with("POST /v1/token?key="));
        assert!(refresh.contains("grant_type=refresh_token&refresh_token=rt-1"));
    }

    #[tokio::test]
    async fn test_no_token_after_sign_out() {
        let (addr, _) = serve(vec![signed_in("3600")]).await;
        let provider = provider_for(addr);
        let session = provider
            .sign_in(&SignInCredentials::new("buyer@example.com", "pw"))
            .await
            .unwrap();

        provider.sign_out().await.unwrap();
        assert!(provider.last_known_session().is_none());
        assert!(matches!(
            provider.issue_token(&session).await,
            Err(RemoteError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn test_no_token_for_other_identity() {
        let (addr, _) = serve(vec![signed_in("3600")]).await;
        let provider = provider_for(addr);
        provider
            .sign_in(&SignInCredentials::new("buyer@example.com", "pw"))
            .await
            .unwrap();

        let other = Session {
            id: UserId::parse("uid-2").unwrap(),
            email: Email::parse("other@example.com").unwrap(),
        };
        assert!(provider.issue_token(&other).await.is_err());
    }
}
