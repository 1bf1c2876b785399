//! Application state wiring the services to the real backends.

use std::sync::Arc;

use crate::backend::{ApiClient, PasswordIdentityProvider, RemoteError};
use crate::config::StorefrontConfig;
use crate::services::{
    AdminConsole, AuthorizationGate, CartStore, Catalog, OrderHistory, OrderSubmission,
    Registration, SessionManager,
};

pub type Sessions = SessionManager<PasswordIdentityProvider>;
pub type Cart = CartStore<PasswordIdentityProvider, ApiClient>;
pub type Gate = AuthorizationGate<PasswordIdentityProvider, ApiClient>;
pub type Admin = AdminConsole<PasswordIdentityProvider, ApiClient, ApiClient>;

/// Everything a front end needs, built once per process.
///
/// This struct is cheaply cloneable via `Arc`. The cart store follows the
/// session for as long as any clone is alive.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    api: ApiClient,
    sessions: Arc<Sessions>,
    catalog: Arc<Catalog<ApiClient>>,
    cart: Arc<Cart>,
    checkout: OrderSubmission<PasswordIdentityProvider, ApiClient, ApiClient>,
    orders: OrderHistory<PasswordIdentityProvider, ApiClient>,
    admin: Admin,
    registration: Registration<PasswordIdentityProvider, ApiClient>,
}

impl AppState {
    /// Build the HTTP clients and mount the session-following services.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, RemoteError> {
        let api = ApiClient::new(&config)?;
        let identity = PasswordIdentityProvider::new(&config)?;

        let sessions = Arc::new(SessionManager::new(identity));
        let catalog = Arc::new(Catalog::new(api.clone(), config.catalog_ttl));
        let cart = CartStore::mount(Arc::clone(&sessions), api.clone());
        let checkout = OrderSubmission::new(Arc::clone(&sessions), Arc::clone(&cart), api.clone());
        let orders = OrderHistory::new(Arc::clone(&sessions), api.clone());
        let admin = AdminConsole::new(Arc::clone(&sessions), Arc::clone(&catalog), api.clone());
        let registration = Registration::new(Arc::clone(&sessions), api.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                api,
                sessions,
                catalog,
                cart,
                checkout,
                orders,
                admin,
                registration,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<Sessions> {
        &self.inner.sessions
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog<ApiClient> {
        &self.inner.catalog
    }

    #[must_use]
    pub fn cart(&self) -> &Arc<Cart> {
        &self.inner.cart
    }

    #[must_use]
    pub fn checkout(&self) -> &OrderSubmission<PasswordIdentityProvider, ApiClient, ApiClient> {
        &self.inner.checkout
    }

    #[must_use]
    pub fn orders(&self) -> &OrderHistory<PasswordIdentityProvider, ApiClient> {
        &self.inner.orders
    }

    #[must_use]
    pub fn admin(&self) -> &Admin {
        &self.inner.admin
    }

    #[must_use]
    pub fn registration(&self) -> &Registration<PasswordIdentityProvider, ApiClient> {
        &self.inner.registration
    }

    /// Mount a gate for a protected view at `path`.
    ///
    /// Each protected view gets its own gate; dropping it unsubscribes.
    #[must_use]
    pub fn admin_gate(&self, path: &str) -> Arc<Gate> {
        AuthorizationGate::mount(
            Arc::clone(&self.inner.sessions),
            self.inner.api.clone(),
            path,
        )
    }
}
