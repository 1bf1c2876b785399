//! Account creation.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::backend::{IdentityProvider, RoleStore};
use crate::error::{Result, StoreError};
use crate::models::{RegistrationForm, Session, SignInCredentials, UserProfile};

use super::session::SessionManager;

/// Creates accounts and their unprivileged user records.
pub struct Registration<P, R> {
    sessions: Arc<SessionManager<P>>,
    roles: R,
}

impl<P: IdentityProvider, R: RoleStore> Registration<P, R> {
    pub const fn new(sessions: Arc<SessionManager<P>>, roles: R) -> Self {
        Self { sessions, roles }
    }

    /// Create an account, sign it in, and store its profile.
    ///
    /// The new session is published as soon as the provider creates it. A
    /// failed profile write is logged and reported but not returned: the
    /// account exists, and a missing user record resolves as unprivileged.
    ///
    /// # Errors
    ///
    /// - `StoreError::Validation` naming blank contact fields, before any
    ///   remote call
    /// - `StoreError::Remote` if the provider refuses the account
    #[instrument(skip_all, fields(email = %credentials.email))]
    pub async fn register(
        &self,
        credentials: &SignInCredentials,
        form: &RegistrationForm,
    ) -> Result<Session> {
        let missing = form.missing_fields();
        if !missing.is_empty() {
            return Err(StoreError::Validation { missing });
        }

        let session = self.sessions.sign_up(credentials).await?;
        info!(user_id = %session.id, "Registered");

        if let Err(err) = self.store_profile(&session, form).await {
            warn!(user_id = %session.id, error = %err, "Account created without a profile");
            err.report("create profile");
        }
        Ok(session)
    }

    async fn store_profile(&self, session: &Session, form: &RegistrationForm) -> Result<()> {
        let credential = self.sessions.credential_for(session).await?;
        let profile = UserProfile::new(session, form);
        self.roles
            .create_profile(&session.id, &profile, &credential)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{MemoryIdentityProvider, MemoryRoleStore};

    fn form() -> RegistrationForm {
        RegistrationForm {
            phone: "9800000000".to_string(),
            address: "12 MG Road, Pune".to_string(),
        }
    }

    fn registration() -> (
        Registration<MemoryIdentityProvider, MemoryRoleStore>,
        Arc<SessionManager<MemoryIdentityProvider>>,
        MemoryRoleStore,
    ) {
        let provider = MemoryIdentityProvider::new();
        let roles = MemoryRoleStore::new(&provider);
        let sessions = Arc::new(SessionManager::new(provider));
        (
            Registration::new(Arc::clone(&sessions), roles.clone()),
            sessions,
            roles,
        )
    }

    #[tokio::test]
    async fn test_register_signs_in_and_stores_profile() {
        let (registration, sessions, roles) = registration();
        let session = registration
            .register(&SignInCredentials::new("new@example.com", "pw"), &form())
            .await
            .unwrap();

        assert_eq!(sessions.current(), Some(session.clone()));
        let profile = roles.profile(&session.id).unwrap();
        assert_eq!(profile.email, "new@example.com");
        assert_eq!(profile.address, "12 MG Road, Pune");
        assert!(!profile.is_admin);
    }

    #[tokio::test]
    async fn test_blank_contact_fields_create_nothing() {
        let (registration, sessions, _) = registration();
        let form = RegistrationForm {
            address: String::new(),
            ..form()
        };
        match registration
            .register(&SignInCredentials::new("new@example.com", "pw"), &form)
            .await
        {
            Err(StoreError::Validation { missing }) => assert_eq!(missing, vec!["address"]),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(sessions.current().is_none());
    }

    #[tokio::test]
    async fn test_failed_profile_write_keeps_account() {
        let (registration, sessions, roles) = registration();
        roles.fail_lookups(true);

        let session = registration
            .register(&SignInCredentials::new("new@example.com", "pw"), &form())
            .await
            .unwrap();
        assert_eq!(sessions.current(), Some(session.clone()));
        assert!(roles.profile(&session.id).is_none());
    }

    #[tokio::test]
    async fn test_taken_email_is_refused() {
        let (registration, sessions, _) = registration();
        registration
            .register(&SignInCredentials::new("new@example.com", "pw"), &form())
            .await
            .unwrap();
        sessions.sign_out().await.unwrap();

        let err = registration
            .register(&SignInCredentials::new("new@example.com", "other"), &form())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Remote(_)));
        assert!(sessions.current().is_none());
    }
}
