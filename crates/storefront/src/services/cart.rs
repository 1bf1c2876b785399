//! Client-side cart cache.
//!
//! The remote cart service is the source of truth. Every mutation is a
//! remote write followed by a full refetch; nothing is changed locally ahead
//! of the server.
//!
//! Refetches can complete out of order. Each one takes a sequence number
//! when it is issued, and a result is applied only if no refetch issued
//! later has already been applied. Session changes take a sequence number
//! too, so results that belong to a previous session are never shown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::runtime::Handle;
use tracing::{debug, instrument, warn};

use camstore_core::{Price, ProductId};

use crate::backend::{CartService, IdentityProvider};
use crate::error::{Result, StoreError, add_breadcrumb};
use crate::models::{Cart, CartLineInput, Credential, Product, Session, SessionEvent};

use super::lock;
use super::session::{SessionManager, Subscription};

/// A remote cart write.
enum CartWrite {
    Add(CartLineInput),
    SetQuantity(ProductId, u32),
    Remove(ProductId),
    Clear,
}

impl CartWrite {
    const fn action(&self) -> &'static str {
        match self {
            Self::Add(_) => "Add to cart",
            Self::SetQuantity(..) => "Set quantity",
            Self::Remove(_) => "Remove from cart",
            Self::Clear => "Clear cart",
        }
    }

    fn product_id(&self) -> Option<&ProductId> {
        match self {
            Self::Add(line) => Some(&line.product_id),
            Self::SetQuantity(id, _) | Self::Remove(id) => Some(id),
            Self::Clear => None,
        }
    }
}

#[derive(Default)]
struct CartState {
    cart: Cart,
    /// Sequence number of the newest applied refetch or reset.
    applied: u64,
    synced: bool,
    last_error: Option<String>,
}

/// Read cache of the signed-in user's remote cart.
pub struct CartStore<P, C> {
    sessions: Arc<SessionManager<P>>,
    service: C,
    issued: AtomicU64,
    state: Mutex<CartState>,
    /// Runtime that session-driven refetches are spawned on.
    runtime: Handle,
    subscription: OnceLock<Subscription>,
}

impl<P: IdentityProvider, C: CartService> CartStore<P, C> {
    /// Mount the store and follow the session: sign-out empties the cart
    /// without a remote call, sign-in loads it.
    ///
    /// Must be called from within a Tokio runtime. Refetches triggered by
    /// later session changes run on that runtime, so the session may be
    /// changed from any thread.
    pub fn mount(sessions: Arc<SessionManager<P>>, service: C) -> Arc<Self> {
        let store = Arc::new(Self {
            sessions,
            service,
            issued: AtomicU64::new(0),
            state: Mutex::new(CartState::default()),
            runtime: Handle::current(),
            subscription: OnceLock::new(),
        });

        let weak = Arc::downgrade(&store);
        let subscription = store.sessions.subscribe(move |event| {
            if let Some(store) = weak.upgrade() {
                store.on_session(event);
            }
        });
        let _ = store.subscription.set(subscription);

        store
    }

    /// Snapshot of the cached cart.
    pub fn cart(&self) -> Cart {
        lock(&self.state).cart.clone()
    }

    /// Cart total, recomputed from the cache.
    pub fn total(&self) -> Price {
        lock(&self.state).cart.total()
    }

    /// Units in the cart, for the badge.
    pub fn item_count(&self) -> u32 {
        lock(&self.state).cart.item_count()
    }

    /// Whether the cache reflects a successful read of the current
    /// session's cart (or an empty cart with nobody signed in).
    pub fn is_synced(&self) -> bool {
        lock(&self.state).synced
    }

    /// Message from the last failed load, for display.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.state).last_error.clone()
    }

    /// Fetch the full cart with a fresh credential.
    ///
    /// On failure the cache is emptied and the error recorded, unless a
    /// newer result has already been applied.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthenticated` with no session, or
    /// `StoreError::Remote` if the cart service fails.
    pub async fn load(&self) -> Result<()> {
        let seq = self.next_seq();
        self.refetch(seq).await
    }

    /// Add one unit of `product`. The server adds to an existing line.
    ///
    /// # Errors
    ///
    /// Returns the write error with the cache unchanged, or the refetch
    /// error from [`CartStore::load`].
    pub async fn add(&self, product: &Product) -> Result<()> {
        self.write(CartWrite::Add(CartLineInput::from(product))).await
    }

    /// Remove the line for `product_id`.
    ///
    /// # Errors
    ///
    /// Same as [`CartStore::add`].
    pub async fn remove(&self, product_id: &ProductId) -> Result<()> {
        self.write(CartWrite::Remove(product_id.clone())).await
    }

    /// Set the quantity of a line. Zero or less removes it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` naming `quantity` if it does not fit
    /// a cart line, without a remote call. Otherwise the same as
    /// [`CartStore::add`].
    pub async fn set_quantity(&self, product_id: &ProductId, quantity: i64) -> Result<()> {
        if quantity <= 0 {
            return self.remove(product_id).await;
        }
        let quantity = u32::try_from(quantity).map_err(|_| StoreError::Validation {
            missing: vec!["quantity"],
        })?;
        self.write(CartWrite::SetQuantity(product_id.clone(), quantity))
            .await
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Same as [`CartStore::add`].
    pub async fn clear(&self) -> Result<()> {
        self.write(CartWrite::Clear).await
    }

    /// Remove every line from `session`'s cart.
    ///
    /// Nothing is written if `session` is no longer the signed-in one; the
    /// cart of whoever replaced it is left alone.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthenticated` if `session` is not current.
    /// Otherwise the same as [`CartStore::add`].
    pub async fn clear_for(&self, session: &Session) -> Result<()> {
        let credential = self.sessions.credential_for(session).await?;
        self.write_with(&credential, CartWrite::Clear).await
    }

    fn next_seq(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn write(&self, write: CartWrite) -> Result<()> {
        let credential = self.sessions.credential().await?;
        self.write_with(&credential, write).await
    }

    #[instrument(skip_all, fields(action = write.action()))]
    async fn write_with(&self, credential: &Credential, write: CartWrite) -> Result<()> {
        let product_id = write.product_id().map(ProductId::as_str).unwrap_or_default();
        add_breadcrumb("cart", write.action(), Some(&[("product_id", product_id)]));

        let outcome = match &write {
            CartWrite::Add(line) => self.service.add_line(credential, line).await,
            CartWrite::SetQuantity(id, quantity) => {
                self.service.set_quantity(credential, id, *quantity).await
            }
            CartWrite::Remove(id) => self.service.remove_line(credential, id).await,
            CartWrite::Clear => self.service.clear(credential).await,
        };

        if let Err(err) = outcome {
            let err = StoreError::from(err);
            err.report(write.action());
            return Err(err);
        }

        self.load().await
    }

    async fn refetch(&self, seq: u64) -> Result<()> {
        let result = match self.sessions.credential().await {
            Ok(credential) => self
                .service
                .fetch_cart(&credential)
                .await
                .map_err(StoreError::from),
            Err(err) => Err(err),
        };

        let mut state = lock(&self.state);
        if seq <= state.applied {
            debug!(seq, applied = state.applied, "Discarding stale cart refetch");
            return result.map(drop);
        }
        state.applied = seq;

        match result {
            Ok(lines) => {
                state.cart = Cart::from_remote(lines);
                state.synced = true;
                state.last_error = None;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Cart refetch failed, showing empty cart");
                state.cart = Cart::empty();
                state.synced = false;
                state.last_error = Some(err.user_message());
                Err(err)
            }
        }
    }

    fn on_session(self: &Arc<Self>, event: &SessionEvent) {
        let reset = self.next_seq();
        {
            let mut state = lock(&self.state);
            state.cart = Cart::empty();
            state.applied = reset;
            state.synced = event.session.is_none();
            state.last_error = None;
        }

        if event.session.is_some() {
            let seq = self.next_seq();
            let store = Arc::clone(self);
            self.runtime.spawn(async move {
                // Failures are recorded in `last_error`
                let _ = store.refetch(seq).await;
            });
        }
    }
}
