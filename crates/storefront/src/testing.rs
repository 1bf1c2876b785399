//! In-memory backends for tests.
//!
//! Every trait seam in [`crate::backend`] has a fake here. The fakes share
//! one [`MemoryIdentityProvider`], which mints tokens and remembers who owns
//! them, so cart and order fakes can keep per-user data and reject unknown
//! credentials the way the real services do.
//!
//! Calls can be held until a test releases them ([`Release`]) to drive
//! interleavings deterministically, and failures can be injected.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::oneshot;

use camstore_core::{Email, OrderId, OrderStatus, ProductId, UserId};

use crate::backend::{
    AdminService, CartService, CatalogService, IdentityProvider, OrderService, RemoteError,
    RoleStore,
};
use crate::models::{
    AdminUser, CartLineInput, Credential, Order, OrderDraft, OrderItem, Product, ProductInput,
    RemoteCartLine, Role, Session, SignInCredentials, UserProfile,
};
use crate::services::lock;

/// Lets one held call continue. Dropping it releases the call as well.
#[derive(Debug)]
pub struct Release(oneshot::Sender<()>);

impl Release {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

fn hold() -> (Release, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    (Release(tx), rx)
}

async fn wait(held: Option<oneshot::Receiver<()>>) {
    if let Some(rx) = held {
        let _ = rx.await;
    }
}

fn injected(what: &str) -> RemoteError {
    RemoteError::Unavailable(format!("injected {what} failure"))
}

fn rejected(service: &'static str, status: u16, body: &str) -> RemoteError {
    RemoteError::Status {
        service,
        status,
        body: body.to_string(),
    }
}

// =============================================================================
// Identity
// =============================================================================

#[derive(Default)]
struct IdentityState {
    accounts: HashMap<Email, (String, Session)>,
    current: Option<Session>,
    tokens: HashMap<String, UserId>,
    minted: u64,
    registered: u64,
    fail_tokens: bool,
    token_holds: VecDeque<oneshot::Receiver<()>>,
}

/// Identity provider with password accounts and a token registry.
#[derive(Clone, Default)]
pub struct MemoryIdentityProvider {
    inner: Arc<Mutex<IdentityState>>,
}

impl MemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account that can sign in with `password`.
    #[must_use]
    pub fn with_account(self, session: Session, password: &str) -> Self {
        lock(&self.inner)
            .accounts
            .insert(session.email.clone(), (password.to_string(), session));
        self
    }

    /// Start with `session` already signed in.
    #[must_use]
    pub fn signed_in_as(self, session: Session) -> Self {
        self.set_current(Some(session));
        self
    }

    /// Change the provider-side session without publishing anything, as an
    /// expiry or a sign-in in another tab would.
    pub fn set_current(&self, session: Option<Session>) {
        let mut state = lock(&self.inner);
        if let Some(session) = &session {
            state
                .accounts
                .entry(session.email.clone())
                .or_insert_with(|| (String::new(), session.clone()));
        }
        state.current = session;
    }

    /// Make token issuance fail until turned off.
    pub fn fail_tokens(&self, fail: bool) {
        lock(&self.inner).fail_tokens = fail;
    }

    /// Hold the next token issuance until released.
    #[must_use]
    pub fn hold_next_token(&self) -> Release {
        let (release, rx) = hold();
        lock(&self.inner).token_holds.push_back(rx);
        release
    }

    /// Who `credential` was issued to.
    #[must_use]
    pub fn owner_of(&self, credential: &Credential) -> Option<UserId> {
        lock(&self.inner).tokens.get(credential.expose()).cloned()
    }

    /// Stop accepting `credential`, as if it had expired.
    pub fn expire(&self, credential: &Credential) {
        lock(&self.inner).tokens.remove(credential.expose());
    }

    /// Tokens issued so far.
    #[must_use]
    pub fn tokens_issued(&self) -> u64 {
        lock(&self.inner).minted
    }

    fn accounts(&self) -> Vec<Session> {
        lock(&self.inner)
            .accounts
            .values()
            .map(|(_, session)| session.clone())
            .collect()
    }

    fn authenticate(&self, service: &'static str, credential: &Credential) -> Result<UserId, RemoteError> {
        self.owner_of(credential)
            .ok_or_else(|| rejected(service, 401, "invalid token"))
    }
}

impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, credentials: &SignInCredentials) -> Result<Session, RemoteError> {
        use secrecy::ExposeSecret;

        let email = Email::parse(&credentials.email)
            .map_err(|_| RemoteError::Provider("INVALID_EMAIL".to_string()))?;
        let mut state = lock(&self.inner);
        let session = match state.accounts.get(&email) {
            Some((password, session))
                if password.as_str() == credentials.password.expose_secret() =>
            {
                session.clone()
            }
            _ => {
                return Err(RemoteError::Provider(
                    "INVALID_LOGIN_CREDENTIALS".to_string(),
                ));
            }
        };
        state.current = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(&self, credentials: &SignInCredentials) -> Result<Session, RemoteError> {
        use secrecy::ExposeSecret;

        let email = Email::parse(&credentials.email)
            .map_err(|_| RemoteError::Provider("INVALID_EMAIL".to_string()))?;
        let mut state = lock(&self.inner);
        if state.accounts.contains_key(&email) {
            return Err(RemoteError::Provider("EMAIL_EXISTS".to_string()));
        }
        state.registered += 1;
        let id = UserId::parse(&format!("new-{}", state.registered))
            .map_err(|e| RemoteError::Provider(e.to_string()))?;
        let session = Session { id, email };
        state.accounts.insert(
            session.email.clone(),
            (credentials.password.expose_secret().to_string(), session.clone()),
        );
        state.current = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        lock(&self.inner).current = None;
        Ok(())
    }

    async fn issue_token(&self, session: &Session) -> Result<Credential, RemoteError> {
        let held = lock(&self.inner).token_holds.pop_front();
        wait(held).await;

        let mut state = lock(&self.inner);
        if state.fail_tokens {
            return Err(injected("token"));
        }
        if state.current.as_ref() != Some(session) {
            return Err(RemoteError::Provider("USER_NOT_SIGNED_IN".to_string()));
        }
        state.minted += 1;
        let token = format!("token-{}-{}", session.id, state.minted);
        state.tokens.insert(token.clone(), session.id.clone());
        Ok(Credential::new(token))
    }

    fn last_known_session(&self) -> Option<Session> {
        lock(&self.inner).current.clone()
    }
}

// =============================================================================
// Roles
// =============================================================================

#[derive(Default)]
struct RoleState {
    privileged: HashSet<UserId>,
    failing: bool,
    holds: HashMap<UserId, VecDeque<oneshot::Receiver<()>>>,
    lookups: u32,
    profiles: HashMap<UserId, UserProfile>,
}

/// Role store keyed by user id.
#[derive(Clone)]
pub struct MemoryRoleStore {
    identity: MemoryIdentityProvider,
    inner: Arc<Mutex<RoleState>>,
}

impl MemoryRoleStore {
    #[must_use]
    pub fn new(identity: &MemoryIdentityProvider) -> Self {
        Self {
            identity: identity.clone(),
            inner: Arc::default(),
        }
    }

    pub fn grant(&self, user: &UserId) {
        lock(&self.inner).privileged.insert(user.clone());
    }

    pub fn revoke(&self, user: &UserId) {
        lock(&self.inner).privileged.remove(user);
    }

    /// Profile stored for `user` at registration.
    #[must_use]
    pub fn profile(&self, user: &UserId) -> Option<UserProfile> {
        lock(&self.inner).profiles.get(user).cloned()
    }

    /// Make lookups and profile writes fail as if the store were
    /// unreachable.
    pub fn fail_lookups(&self, fail: bool) {
        lock(&self.inner).failing = fail;
    }

    /// Hold the next lookup for `user` until released.
    #[must_use]
    pub fn hold_next(&self, user: &UserId) -> Release {
        let (release, rx) = hold();
        lock(&self.inner)
            .holds
            .entry(user.clone())
            .or_default()
            .push_back(rx);
        release
    }

    #[must_use]
    pub fn lookups(&self) -> u32 {
        lock(&self.inner).lookups
    }
}

impl RoleStore for MemoryRoleStore {
    async fn get_role(&self, identity: &UserId, credential: &Credential) -> Result<Role, RemoteError> {
        let held = {
            let mut state = lock(&self.inner);
            state.lookups += 1;
            state.holds.get_mut(identity).and_then(VecDeque::pop_front)
        };
        wait(held).await;

        if lock(&self.inner).failing {
            return Err(injected("role lookup"));
        }
        if &self.identity.authenticate("roles", credential)? != identity {
            return Err(rejected("roles", 403, "token does not match user"));
        }
        Ok(Role {
            is_privileged: lock(&self.inner).privileged.contains(identity),
        })
    }

    async fn create_profile(
        &self,
        identity: &UserId,
        profile: &UserProfile,
        credential: &Credential,
    ) -> Result<(), RemoteError> {
        if lock(&self.inner).failing {
            return Err(injected("profile write"));
        }
        if &self.identity.authenticate("users", credential)? != identity {
            return Err(rejected("users", 403, "token does not match user"));
        }
        lock(&self.inner)
            .profiles
            .insert(identity.clone(), profile.clone());
        Ok(())
    }
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Default)]
struct CartServiceState {
    carts: HashMap<UserId, Vec<RemoteCartLine>>,
    fail_next_write: bool,
    fail_fetches: bool,
    fetch_holds: VecDeque<oneshot::Receiver<()>>,
    fetches: u32,
    writes: u32,
}

/// Per-user server carts.
#[derive(Clone)]
pub struct MemoryCartService {
    identity: MemoryIdentityProvider,
    inner: Arc<Mutex<CartServiceState>>,
}

impl MemoryCartService {
    #[must_use]
    pub fn new(identity: &MemoryIdentityProvider) -> Self {
        Self {
            identity: identity.clone(),
            inner: Arc::default(),
        }
    }

    /// Replace `user`'s server-side cart.
    pub fn seed(&self, user: &UserId, lines: Vec<RemoteCartLine>) {
        lock(&self.inner).carts.insert(user.clone(), lines);
    }

    /// `user`'s server-side cart.
    #[must_use]
    pub fn lines(&self, user: &UserId) -> Vec<RemoteCartLine> {
        lock(&self.inner).carts.get(user).cloned().unwrap_or_default()
    }

    /// Fail the next write once.
    pub fn fail_next_write(&self) {
        lock(&self.inner).fail_next_write = true;
    }

    pub fn fail_fetches(&self, fail: bool) {
        lock(&self.inner).fail_fetches = fail;
    }

    /// Hold the next fetch until released. The fetch reads the cart when
    /// it is called and answers with that snapshot once released.
    #[must_use]
    pub fn hold_next_fetch(&self) -> Release {
        let (release, rx) = hold();
        lock(&self.inner).fetch_holds.push_back(rx);
        release
    }

    #[must_use]
    pub fn fetches(&self) -> u32 {
        lock(&self.inner).fetches
    }

    #[must_use]
    pub fn writes(&self) -> u32 {
        lock(&self.inner).writes
    }

    /// Authenticate and apply `change` to the caller's cart.
    fn write(
        &self,
        credential: &Credential,
        change: impl FnOnce(&mut Vec<RemoteCartLine>),
    ) -> Result<(), RemoteError> {
        let user = self.identity.authenticate("cart", credential)?;
        let mut state = lock(&self.inner);
        state.writes += 1;
        if std::mem::take(&mut state.fail_next_write) {
            return Err(injected("cart write"));
        }
        change(state.carts.entry(user).or_default());
        Ok(())
    }
}

impl CartService for MemoryCartService {
    async fn fetch_cart(&self, credential: &Credential) -> Result<Vec<RemoteCartLine>, RemoteError> {
        let user = self.identity.authenticate("cart", credential)?;
        let (snapshot, failing, held) = {
            let mut state = lock(&self.inner);
            state.fetches += 1;
            (
                state.carts.get(&user).cloned().unwrap_or_default(),
                state.fail_fetches,
                state.fetch_holds.pop_front(),
            )
        };
        wait(held).await;

        if failing {
            return Err(injected("cart fetch"));
        }
        Ok(snapshot)
    }

    async fn add_line(&self, credential: &Credential, line: &CartLineInput) -> Result<(), RemoteError> {
        self.write(credential, |lines| {
            let quantity = i64::from(line.quantity);
            match lines.iter_mut().find(|l| l.product_id == line.product_id) {
                Some(existing) => existing.quantity += quantity,
                None => lines.push(RemoteCartLine {
                    product_id: line.product_id.clone(),
                    name: line.name.clone(),
                    unit_price: line.unit_price,
                    image_ref: line.image_ref.clone(),
                    quantity,
                }),
            }
        })
    }

    async fn set_quantity(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        self.write(credential, |lines| {
            if let Some(line) = lines.iter_mut().find(|l| &l.product_id == product_id) {
                line.quantity = i64::from(quantity);
            }
        })
    }

    async fn remove_line(&self, credential: &Credential, product_id: &ProductId) -> Result<(), RemoteError> {
        self.write(credential, |lines| lines.retain(|l| &l.product_id != product_id))
    }

    async fn clear(&self, credential: &Credential) -> Result<(), RemoteError> {
        self.write(credential, Vec::clear)
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Default)]
struct OrderServiceState {
    orders: Vec<Order>,
    submitted: Vec<OrderDraft>,
    next_id: u64,
    fail_next_submit: bool,
    submit_holds: VecDeque<oneshot::Receiver<()>>,
}

/// Order service, including the admin endpoints.
#[derive(Clone)]
pub struct MemoryOrderService {
    identity: MemoryIdentityProvider,
    inner: Arc<Mutex<OrderServiceState>>,
}

impl MemoryOrderService {
    #[must_use]
    pub fn new(identity: &MemoryIdentityProvider) -> Self {
        Self {
            identity: identity.clone(),
            inner: Arc::default(),
        }
    }

    /// Add an existing order.
    pub fn seed(&self, order: Order) {
        lock(&self.inner).orders.push(order);
    }

    /// Every stored order.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        lock(&self.inner).orders.clone()
    }

    /// Drafts accepted by `submit_order`, in order.
    #[must_use]
    pub fn submitted(&self) -> Vec<OrderDraft> {
        lock(&self.inner).submitted.clone()
    }

    /// Answer the next submission with 200 instead of 201, once.
    pub fn fail_next_submit(&self) {
        lock(&self.inner).fail_next_submit = true;
    }

    #[must_use]
    pub fn hold_next_submit(&self) -> Release {
        let (release, rx) = hold();
        lock(&self.inner).submit_holds.push_back(rx);
        release
    }

    fn set_status(&self, order_id: &OrderId, owner: Option<&UserId>, status: OrderStatus) -> Result<(), RemoteError> {
        let mut state = lock(&self.inner);
        let order = state
            .orders
            .iter_mut()
            .find(|o| &o.id == order_id && owner.is_none_or(|u| o.user_id.as_ref() == Some(u)))
            .ok_or_else(|| rejected("orders", 404, "order not found"))?;
        order.status = status;
        Ok(())
    }
}

impl OrderService for MemoryOrderService {
    async fn submit_order(&self, credential: &Credential, draft: &OrderDraft) -> Result<OrderId, RemoteError> {
        let user = self.identity.authenticate("orders", credential)?;
        let held = lock(&self.inner).submit_holds.pop_front();
        wait(held).await;

        if &user != draft.user_id() {
            return Err(rejected("orders", 403, "order for another user"));
        }

        let mut state = lock(&self.inner);
        if std::mem::take(&mut state.fail_next_submit) {
            return Err(RemoteError::UnexpectedStatus {
                service: "orders",
                status: 200,
            });
        }

        state.next_id += 1;
        let id = OrderId::parse(&format!("order-{}", state.next_id))
            .map_err(|e| RemoteError::Provider(e.to_string()))?;
        state.orders.push(Order {
            id: id.clone(),
            user_id: Some(draft.user_id().clone()),
            user_email: Some(draft.user_email().to_string()),
            items: draft
                .items()
                .iter()
                .map(|line| OrderItem {
                    product_id: line.product_id.to_string(),
                    name: line.name.clone(),
                    unit_price: line.unit_price,
                    quantity: line.quantity,
                })
                .collect(),
            total_amount: draft.total_amount(),
            shipping_address: draft.shipping_address().to_string(),
            user_details: Some(draft.buyer().clone()),
            status: draft.status(),
            order_date: Some(Utc::now()),
        });
        state.submitted.push(draft.clone());
        Ok(id)
    }

    async fn list_orders(&self, credential: &Credential) -> Result<Vec<Order>, RemoteError> {
        let user = self.identity.authenticate("orders", credential)?;
        Ok(lock(&self.inner)
            .orders
            .iter()
            .filter(|o| o.user_id.as_ref() == Some(&user))
            .cloned()
            .collect())
    }

    async fn update_order_status(
        &self,
        credential: &Credential,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), RemoteError> {
        let user = self.identity.authenticate("orders", credential)?;
        self.set_status(order_id, Some(&user), status)
    }
}

impl AdminService for MemoryOrderService {
    async fn list_all_orders(
        &self,
        credential: &Credential,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RemoteError> {
        self.identity.authenticate("admin", credential)?;
        Ok(lock(&self.inner)
            .orders
            .iter()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect())
    }

    async fn set_any_order_status(
        &self,
        credential: &Credential,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), RemoteError> {
        self.identity.authenticate("admin", credential)?;
        self.set_status(order_id, None, status)
    }

    async fn list_users(&self, credential: &Credential) -> Result<Vec<AdminUser>, RemoteError> {
        self.identity.authenticate("admin", credential)?;
        let mut users: Vec<AdminUser> = self
            .identity
            .accounts()
            .into_iter()
            .map(|session| AdminUser {
                id: session.id,
                email: session.email.into_inner(),
                display_name: None,
                is_admin: false,
            })
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Default)]
struct CatalogState {
    products: Vec<Product>,
    next_id: u64,
    listings: u32,
}

/// Catalog service. Writes accept any credential unless
/// [`MemoryCatalogService::authenticated_by`] is set.
#[derive(Clone, Default)]
pub struct MemoryCatalogService {
    identity: Option<MemoryIdentityProvider>,
    inner: Arc<Mutex<CatalogState>>,
}

impl MemoryCatalogService {
    #[must_use]
    pub fn with_products(products: Vec<Product>) -> Self {
        let service = Self::default();
        lock(&service.inner).products = products;
        service
    }

    /// Reject writes whose credential `identity` did not issue.
    #[must_use]
    pub fn authenticated_by(mut self, identity: &MemoryIdentityProvider) -> Self {
        self.identity = Some(identity.clone());
        self
    }

    fn authenticate(&self, credential: &Credential) -> Result<(), RemoteError> {
        match &self.identity {
            Some(identity) => identity.authenticate("catalog", credential).map(drop),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        lock(&self.inner).products.clone()
    }

    /// How many times the listing was fetched.
    #[must_use]
    pub fn listings(&self) -> u32 {
        lock(&self.inner).listings
    }
}

fn apply_input(product: &mut Product, input: &ProductInput) {
    product.name.clone_from(&input.name);
    product.description.clone_from(&input.description);
    product.category.clone_from(&input.category);
    product.image_url.clone_from(&input.image_url);
    product.price = input.price;
    product.stock = input.stock;
}

impl CatalogService for MemoryCatalogService {
    async fn list_products(&self) -> Result<Vec<Product>, RemoteError> {
        let mut state = lock(&self.inner);
        state.listings += 1;
        Ok(state.products.clone())
    }

    async fn create_product(&self, credential: &Credential, input: &ProductInput) -> Result<(), RemoteError> {
        self.authenticate(credential)?;
        let mut state = lock(&self.inner);
        state.next_id += 1;
        let id = ProductId::parse(&format!("cam-{}", state.next_id))
            .map_err(|e| RemoteError::Provider(e.to_string()))?;
        let mut product = Product {
            id,
            name: String::new(),
            description: String::new(),
            category: String::new(),
            image_url: String::new(),
            price: input.price,
            stock: 0,
        };
        apply_input(&mut product, input);
        state.products.push(product);
        Ok(())
    }

    async fn update_product(
        &self,
        credential: &Credential,
        product_id: &ProductId,
        input: &ProductInput,
    ) -> Result<(), RemoteError> {
        self.authenticate(credential)?;
        let mut state = lock(&self.inner);
        let product = state
            .products
            .iter_mut()
            .find(|p| &p.id == product_id)
            .ok_or_else(|| rejected("catalog", 404, "product not found"))?;
        apply_input(product, input);
        Ok(())
    }

    async fn delete_product(&self, credential: &Credential, product_id: &ProductId) -> Result<(), RemoteError> {
        self.authenticate(credential)?;
        let mut state = lock(&self.inner);
        let before = state.products.len();
        state.products.retain(|p| &p.id != product_id);
        if state.products.len() == before {
            return Err(rejected("catalog", 404, "product not found"));
        }
        Ok(())
    }
}
