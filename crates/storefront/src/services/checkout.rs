//! Order placement.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, instrument, warn};

use camstore_core::OrderId;

use crate::backend::{CartService, IdentityProvider, OrderService};
use crate::error::{Result, StoreError, add_breadcrumb};
use crate::models::{CheckoutForm, OrderDraft};

use super::cart::CartStore;
use super::session::SessionManager;

/// Validates and submits orders built from the cached cart.
pub struct OrderSubmission<P, C, O> {
    sessions: Arc<SessionManager<P>>,
    cart: Arc<CartStore<P, C>>,
    orders: O,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a submission ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P: IdentityProvider, C: CartService, O: OrderService> OrderSubmission<P, C, O> {
    pub fn new(
        sessions: Arc<SessionManager<P>>,
        cart: Arc<CartStore<P, C>>,
        orders: O,
    ) -> Self {
        Self {
            sessions,
            cart,
            orders,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a submission is waiting for the order service.
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Place an order for the cached cart.
    ///
    /// Preconditions are checked in order and the first failure is
    /// returned. A cart that has not been read since the last session
    /// change or failed load is loaded before it is checked.
    ///
    /// Only the submitting session's cart is cleared, and only after the
    /// order service confirms creation. A failed clear after that is
    /// logged, not returned, since the order exists; this includes the
    /// session having changed while the order was pending.
    ///
    /// # Errors
    ///
    /// - `StoreError::Unauthenticated` with no session
    /// - `StoreError::Validation` naming blank shipping fields
    /// - `StoreError::Remote` if an unsynced cart cannot be loaded
    /// - `StoreError::EmptyCart` if there is nothing to order
    /// - `StoreError::SubmissionInFlight` if another submission is pending
    /// - `StoreError::Remote` if the order service fails; nothing is changed
    #[instrument(skip_all)]
    pub async fn submit(&self, form: &CheckoutForm) -> Result<OrderId> {
        let session = self.sessions.current().ok_or(StoreError::Unauthenticated)?;

        let missing = form.missing_fields();
        if !missing.is_empty() {
            return Err(StoreError::Validation { missing });
        }

        if !self.cart.is_synced() {
            self.cart.load().await?;
        }
        let cart = self.cart.cart();
        if cart.is_empty() {
            return Err(StoreError::EmptyCart);
        }

        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(StoreError::SubmissionInFlight);
        }
        let _in_flight = InFlight(&self.in_flight);

        let draft = OrderDraft::new(&session, form, &cart);
        let credential = self.sessions.credential_for(&session).await?;

        let total = draft.total_amount().to_string();
        add_breadcrumb("checkout", "Submit order", Some(&[("total", total.as_str())]));

        let order_id = match self.orders.submit_order(&credential, &draft).await {
            Ok(id) => id,
            Err(err) => {
                let err = StoreError::from(err);
                err.report("submit order");
                return Err(err);
            }
        };
        info!(order_id = %order_id, total = %draft.total_amount(), "Order placed");

        if let Err(err) = self.cart.clear_for(&session).await {
            warn!(order_id = %order_id, error = %err, "Order placed but cart was not cleared");
        }

        Ok(order_id)
    }
}
