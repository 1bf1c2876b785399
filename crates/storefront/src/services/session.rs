//! Session lifecycle.
//!
//! [`SessionManager`] is the single owner of "who is signed in". Other
//! components hold an `Arc` to it and learn about identity changes through
//! [`SessionManager::subscribe`].

use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info, instrument};

use crate::backend::IdentityProvider;
use crate::error::{self, Result, StoreError};
use crate::models::{Credential, Session, SessionEvent, SignInCredentials};

use super::lock;

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Owns the current [`Session`] and fans identity changes out to listeners.
///
/// Listeners run synchronously, in registration order, while deliveries are
/// serialized. A listener must not call back into the manager's publishing
/// methods or [`SessionManager::subscribe`]; spawn a task instead.
///
/// Publishing needs no runtime of its own. Mounted components spawn their
/// follow-up work on the runtime they were mounted from, so
/// [`SessionManager::report`] may be called from any thread.
pub struct SessionManager<P> {
    provider: P,
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    /// Held for the whole of a delivery so every listener sees the same
    /// sequence of events.
    delivery: Mutex<()>,
}

struct State {
    current: Option<Session>,
    generation: u64,
    next_listener: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Registration handle returned by [`SessionManager::subscribe`].
///
/// The listener stays registered until this handle is dropped or
/// [`Subscription::unsubscribe`] is called.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Unregister the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            lock(&shared.state)
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl<P: IdentityProvider> SessionManager<P> {
    /// Create a manager seeded with the provider's last known session.
    pub fn new(provider: P) -> Self {
        let current = provider.last_known_session();
        Self {
            provider,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    current,
                    generation: 0,
                    next_listener: 0,
                    listeners: Vec::new(),
                }),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// The identity provider this manager drives.
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Register `listener` and deliver the current state to it immediately.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let _delivery = lock(&self.shared.delivery);
        let listener: Listener = Arc::new(listener);

        let (id, event) = {
            let mut state = lock(&self.shared.state);
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push((id, Arc::clone(&listener)));
            (
                id,
                SessionEvent {
                    generation: state.generation,
                    session: state.current.clone(),
                },
            )
        };

        listener(&event);

        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Snapshot of the signed-in identity.
    pub fn current(&self) -> Option<Session> {
        lock(&self.shared.state).current.clone()
    }

    /// Generation of the most recently published event.
    pub fn generation(&self) -> u64 {
        lock(&self.shared.state).generation
    }

    /// Sign in through the provider and publish the new session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Remote` if the provider rejects the credentials.
    /// Nothing is published in that case.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, credentials: &SignInCredentials) -> Result<Session> {
        let session = self.provider.sign_in(credentials).await?;
        error::set_sentry_user(&session.id, Some(session.email.as_str()));
        self.publish(Some(session.clone()));
        Ok(session)
    }

    /// Create an account through the provider and publish it as the new
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Remote` if the provider refuses the account,
    /// e.g. because the email is taken. Nothing is published in that case.
    #[instrument(skip_all)]
    pub async fn sign_up(&self, credentials: &SignInCredentials) -> Result<Session> {
        let session = self.provider.sign_up(credentials).await?;
        error::set_sentry_user(&session.id, Some(session.email.as_str()));
        self.publish(Some(session.clone()));
        Ok(session)
    }

    /// Sign out and publish the absent session.
    ///
    /// The local session ends even when the provider call fails.
    ///
    /// # Errors
    ///
    /// Returns the provider's error after the absent session is published.
    #[instrument(skip_all)]
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.provider.sign_out().await;
        error::clear_sentry_user();
        self.publish(None);
        if result.is_ok() {
            info!("Session ended");
        }
        result.map_err(StoreError::from)
    }

    /// Publish a change the provider reported on its own, e.g. an expired
    /// refresh token.
    pub fn report(&self, session: Option<Session>) {
        match &session {
            Some(session) => error::set_sentry_user(&session.id, Some(session.email.as_str())),
            None => error::clear_sentry_user(),
        }
        self.publish(session);
    }

    /// A fresh credential for the current session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthenticated` if nobody is signed in, or
    /// `StoreError::Remote` if the provider cannot issue a token.
    pub async fn credential(&self) -> Result<Credential> {
        let session = self.current().ok_or(StoreError::Unauthenticated)?;
        self.credential_for(&session).await
    }

    /// A fresh credential for `session`, which must still be the current
    /// session both before and after the token is issued.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthenticated` if `session` is no longer
    /// current, or `StoreError::Remote` if the provider fails.
    pub async fn credential_for(&self, session: &Session) -> Result<Credential> {
        if !self.is_current(session) {
            return Err(StoreError::Unauthenticated);
        }
        let credential = self.provider.issue_token(session).await?;
        if !self.is_current(session) {
            debug!(user_id = %session.id, "Session changed while issuing credential");
            return Err(StoreError::Unauthenticated);
        }
        Ok(credential)
    }

    fn is_current(&self, session: &Session) -> bool {
        lock(&self.shared.state).current.as_ref() == Some(session)
    }

    fn publish(&self, session: Option<Session>) {
        let _delivery = lock(&self.shared.delivery);

        let (event, listeners) = {
            let mut state = lock(&self.shared.state);
            state.generation += 1;
            state.current.clone_from(&session);
            let listeners: Vec<Listener> = state
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            (
                SessionEvent {
                    generation: state.generation,
                    session,
                },
                listeners,
            )
        };

        debug!(
            generation = event.generation,
            signed_in = event.session.is_some(),
            listeners = listeners.len(),
            "Publishing session change"
        );
        for listener in &listeners {
            listener(&event);
        }
    }
}
