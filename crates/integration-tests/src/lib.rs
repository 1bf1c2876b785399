//! Integration tests for the camstore storefront client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p camstore-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `authorization` - gate resolution, fail-closed paths, superseded lookups,
//!   registration
//! - `cart_sync` - write-then-refetch convergence across sessions
//! - `checkout` - order placement from sign-in through order history
//!
//! Every flow runs against the in-memory backends from
//! `camstore_storefront::testing`, wired together by [`TestContext`].

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use camstore_core::{Email, Price, ProductId, UserId};
use camstore_storefront::models::{CheckoutForm, Product, Session, SignInCredentials};
use camstore_storefront::services::{
    AdminConsole, AuthorizationGate, CartStore, Catalog, OrderHistory, OrderSubmission,
    Registration, SessionManager,
};
use camstore_storefront::testing::{
    MemoryCartService, MemoryCatalogService, MemoryIdentityProvider, MemoryOrderService,
    MemoryRoleStore,
};
use rust_decimal::Decimal;

pub type Sessions = SessionManager<MemoryIdentityProvider>;
pub type Cart = CartStore<MemoryIdentityProvider, MemoryCartService>;
pub type Gate = AuthorizationGate<MemoryIdentityProvider, MemoryRoleStore>;
pub type Checkout = OrderSubmission<MemoryIdentityProvider, MemoryCartService, MemoryOrderService>;
pub type Admin = AdminConsole<MemoryIdentityProvider, MemoryCatalogService, MemoryOrderService>;

pub const BUYER_PASSWORD: &str = "buyer-password";
pub const ADMIN_PASSWORD: &str = "admin-password";

#[must_use]
pub fn buyer() -> Session {
    session("buyer")
}

/// The account granted the privileged role.
#[must_use]
pub fn admin() -> Session {
    session("admin")
}

#[must_use]
pub fn session(id: &str) -> Session {
    Session {
        id: UserId::parse(id).unwrap(),
        email: Email::parse(&format!("{id}@example.com")).unwrap(),
    }
}

#[must_use]
pub fn camera(id: &str, price: i64) -> Product {
    Product {
        id: ProductId::parse(id).unwrap(),
        name: format!("Camera {id}"),
        description: "2MP night vision".to_string(),
        category: "bullet".to_string(),
        image_url: format!("{id}.jpg"),
        price: Price::new(Decimal::new(price, 0)).unwrap(),
        stock: 25,
    }
}

#[must_use]
pub fn product_id(id: &str) -> ProductId {
    ProductId::parse(id).unwrap()
}

#[must_use]
pub fn shipping_form() -> CheckoutForm {
    CheckoutForm {
        buyer_name: "Asha Rao".to_string(),
        buyer_phone: "9800000000".to_string(),
        shipping_address: "12 MG Road, Pune 411001".to_string(),
    }
}

/// All services mounted over shared in-memory backends.
pub struct TestContext {
    pub identity: MemoryIdentityProvider,
    pub roles: MemoryRoleStore,
    pub carts: MemoryCartService,
    pub orders: MemoryOrderService,
    pub products: MemoryCatalogService,
    pub sessions: Arc<Sessions>,
    pub catalog: Arc<Catalog<MemoryCatalogService>>,
    pub cart: Arc<Cart>,
    pub checkout: Arc<Checkout>,
    pub history: OrderHistory<MemoryIdentityProvider, MemoryOrderService>,
    pub admin: Admin,
    pub registration: Registration<MemoryIdentityProvider, MemoryRoleStore>,
}

impl TestContext {
    /// Nobody signed in; `buyer` and `admin` accounts exist, `admin` is
    /// privileged, and the catalog lists `cam1` (100) and `cam2` (250).
    pub async fn new() -> Self {
        let identity = MemoryIdentityProvider::new()
            .with_account(buyer(), BUYER_PASSWORD)
            .with_account(admin(), ADMIN_PASSWORD);
        let roles = MemoryRoleStore::new(&identity);
        roles.grant(&admin().id);
        let carts = MemoryCartService::new(&identity);
        let orders = MemoryOrderService::new(&identity);
        let products =
            MemoryCatalogService::with_products(vec![camera("cam1", 100), camera("cam2", 250)])
                .authenticated_by(&identity);

        let sessions = Arc::new(SessionManager::new(identity.clone()));
        let catalog = Arc::new(Catalog::new(products.clone(), Duration::from_secs(300)));
        let cart = CartStore::mount(Arc::clone(&sessions), carts.clone());
        let checkout = Arc::new(OrderSubmission::new(
            Arc::clone(&sessions),
            Arc::clone(&cart),
            orders.clone(),
        ));
        let history = OrderHistory::new(Arc::clone(&sessions), orders.clone());
        let admin = AdminConsole::new(Arc::clone(&sessions), Arc::clone(&catalog), orders.clone());
        let registration = Registration::new(Arc::clone(&sessions), roles.clone());

        let context = Self {
            identity,
            roles,
            carts,
            orders,
            products,
            sessions,
            catalog,
            cart,
            checkout,
            history,
            admin,
            registration,
        };
        context.settle().await;
        context
    }

    /// Sign in with the account's password and wait for the cart to load.
    pub async fn sign_in(&self, session: &Session, password: &str) {
        self.sessions
            .sign_in(&SignInCredentials::new(session.email.as_str(), password))
            .await
            .unwrap();
        self.settle().await;
    }

    pub async fn sign_in_buyer(&self) {
        self.sign_in(&buyer(), BUYER_PASSWORD).await;
    }

    pub async fn sign_in_admin(&self) {
        self.sign_in(&admin(), ADMIN_PASSWORD).await;
    }

    /// Mount a gate for `path`.
    #[must_use]
    pub fn gate(&self, path: &str) -> Arc<Gate> {
        AuthorizationGate::mount(Arc::clone(&self.sessions), self.roles.clone(), path)
    }

    /// Let spawned refetches and lookups run to completion.
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}
