//! Role gate for protected views.
//!
//! The gate is a small state machine driven by session deliveries:
//!
//! ```text
//! Unresolved --(session present)--> Checking --(privileged)--> Authorized
//!      |                               |
//!      +--(session absent)--> Denied <-+--(unprivileged or any error)
//! ```
//!
//! Every delivery restarts resolution. A resolution that completes after a
//! newer delivery is discarded, so only the newest session's outcome is ever
//! applied. Errors never surface to views; they resolve to `Denied`.

use std::sync::{Arc, Mutex, OnceLock};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::{IdentityProvider, RoleStore};
use crate::error::{Result, StoreError};
use crate::models::{Credential, Session, SessionEvent};

use super::lock;
use super::session::{SessionManager, Subscription};

/// Path of the sign-in surface.
const SIGN_IN_PATH: &str = "/login";

/// Everything a protected operation needs, available only from an
/// `Authorized` gate.
#[derive(Debug, Clone)]
pub struct AuthorizedContext {
    session: Session,
    credential: Credential,
    privileged: bool,
}

impl AuthorizedContext {
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Credential issued while the gate resolved.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        self.privileged
    }

    #[cfg(test)]
    pub(crate) const fn for_tests(session: Session, credential: Credential) -> Self {
        Self {
            session,
            credential,
            privileged: true,
        }
    }
}

/// Gate state.
#[derive(Debug, Clone, Default)]
pub enum GateState {
    #[default]
    Unresolved,
    Checking,
    Authorized(AuthorizedContext),
    Denied,
}

impl GateState {
    /// `Authorized` or `Denied`.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Authorized(_) | Self::Denied)
    }

    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized(_))
    }
}

/// Where to send the user after a denial, carrying the path they asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRedirect {
    pub return_to: String,
}

impl SignInRedirect {
    /// Sign-in location with the requested path as `returnTo`.
    #[must_use]
    pub fn location(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("returnTo", &self.return_to)
            .finish();
        format!("{SIGN_IN_PATH}?{query}")
    }
}

/// What a protected view should do right now.
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Show a neutral loading indicator; never protected content.
    Loading,
    /// Render protected content with this context.
    Render(AuthorizedContext),
    /// Send the user to sign in.
    Redirect(SignInRedirect),
}

/// Resolves the privileged role for the current session.
pub struct AuthorizationGate<P, R> {
    sessions: Arc<SessionManager<P>>,
    roles: R,
    requested_path: String,
    state: watch::Sender<GateState>,
    /// Generation of the newest session delivery. State changes happen
    /// only while this lock is held.
    latest: Mutex<u64>,
    /// Runtime that role lookups are spawned on.
    runtime: Handle,
    subscription: OnceLock<Subscription>,
}

impl<P: IdentityProvider, R: RoleStore> AuthorizationGate<P, R> {
    /// Mount a gate guarding `requested_path` and start resolving.
    ///
    /// Must be called from within a Tokio runtime. Role lookups for this
    /// and every later session change are spawned on it, so the session
    /// may be changed from any thread.
    pub fn mount(
        sessions: Arc<SessionManager<P>>,
        roles: R,
        requested_path: impl Into<String>,
    ) -> Arc<Self> {
        let gate = Arc::new(Self {
            sessions,
            roles,
            requested_path: requested_path.into(),
            state: watch::Sender::new(GateState::Unresolved),
            latest: Mutex::new(0),
            runtime: Handle::current(),
            subscription: OnceLock::new(),
        });

        let weak = Arc::downgrade(&gate);
        let subscription = gate.sessions.subscribe(move |event| {
            if let Some(gate) = weak.upgrade() {
                gate.on_session(event);
            }
        });
        // Only ever set here
        let _ = gate.subscription.set(subscription);

        gate
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// The view decision for the current state.
    pub fn decision(&self) -> GateDecision {
        match &*self.state.borrow() {
            GateState::Unresolved | GateState::Checking => GateDecision::Loading,
            GateState::Authorized(context) => GateDecision::Render(context.clone()),
            GateState::Denied => GateDecision::Redirect(SignInRedirect {
                return_to: self.requested_path.clone(),
            }),
        }
    }

    /// Wait until the newest delivery has resolved.
    pub async fn settled(&self) -> GateDecision {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = receiver.wait_for(GateState::is_settled).await;
        self.decision()
    }

    /// The context for protected operations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthorized` unless the gate is `Authorized`.
    pub fn context(&self) -> Result<AuthorizedContext> {
        match &*self.state.borrow() {
            GateState::Authorized(context) => Ok(context.clone()),
            _ => Err(StoreError::Unauthorized),
        }
    }

    fn on_session(self: &Arc<Self>, event: &SessionEvent) {
        let mut latest = lock(&self.latest);
        if event.generation < *latest {
            return;
        }
        *latest = event.generation;

        match &event.session {
            None => {
                self.state.send_replace(GateState::Denied);
            }
            Some(session) => {
                self.state.send_replace(GateState::Checking);
                let gate = Arc::clone(self);
                let session = session.clone();
                let generation = event.generation;
                self.runtime
                    .spawn(async move { gate.resolve(generation, session).await });
            }
        }
    }

    async fn resolve(&self, generation: u64, session: Session) {
        let outcome = self.check(&session).await;

        let latest = lock(&self.latest);
        if *latest != generation {
            debug!(
                generation,
                latest = *latest,
                "Discarding superseded role resolution"
            );
            return;
        }

        let next = match outcome {
            Ok(Some(context)) => {
                info!(user_id = %session.id, "Authorized");
                GateState::Authorized(context)
            }
            Ok(None) => {
                warn!(user_id = %session.id, "Access denied: not privileged");
                GateState::Denied
            }
            Err(err) => {
                warn!(user_id = %session.id, error = %err, "Role resolution failed, denying");
                GateState::Denied
            }
        };
        self.state.send_replace(next);
        drop(latest);
    }

    async fn check(&self, session: &Session) -> Result<Option<AuthorizedContext>> {
        let credential = self.sessions.credential_for(session).await?;
        let role = self.roles.get_role(&session.id, &credential).await?;

        Ok(role.is_privileged.then(|| AuthorizedContext {
            session: session.clone(),
            credential,
            privileged: true,
        }))
    }
}
