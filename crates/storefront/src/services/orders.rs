//! The buyer's order history.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::{info, instrument};

use camstore_core::OrderStatus;

use crate::backend::{IdentityProvider, OrderService};
use crate::error::{Result, StoreError, add_breadcrumb};
use crate::models::Order;

use super::session::SessionManager;

/// Lists and cancels the signed-in user's orders.
pub struct OrderHistory<P, O> {
    sessions: Arc<SessionManager<P>>,
    orders: O,
}

impl<P: IdentityProvider, O: OrderService> OrderHistory<P, O> {
    pub const fn new(sessions: Arc<SessionManager<P>>, orders: O) -> Self {
        Self { sessions, orders }
    }

    /// The signed-in user's orders, newest first. Orders without a date
    /// come last.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthenticated` with no session, or
    /// `StoreError::Remote` if the order service fails.
    #[instrument(skip_all)]
    pub async fn list_mine(&self) -> Result<Vec<Order>> {
        let credential = self.sessions.credential().await?;
        let mut orders = self.orders.list_orders(&credential).await?;
        orders.sort_by_key(|order| Reverse(order.order_date));
        Ok(orders)
    }

    /// Cancel `order`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidTransition` if the order has already
    /// shipped, been delivered or been cancelled.
    #[instrument(skip_all, fields(order_id = %order.id, status = %order.status))]
    pub async fn cancel(&self, order: &Order) -> Result<()> {
        if !order.status.is_cancellable() {
            return Err(StoreError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            });
        }

        let credential = self.sessions.credential().await?;
        add_breadcrumb("orders", "Cancel order", Some(&[("order_id", order.id.as_str())]));
        self.orders
            .update_order_status(&credential, &order.id, OrderStatus::Cancelled)
            .await?;

        info!("Order cancelled");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};

    use camstore_core::{Email, OrderId, Price, UserId};

    use super::*;
    use crate::models::Session;
    use crate::testing::{MemoryIdentityProvider, MemoryOrderService};

    fn session() -> Session {
        Session {
            id: UserId::parse("u1").unwrap(),
            email: Email::parse("u1@example.com").unwrap(),
        }
    }

    fn order(id: &str, day: u32, status: OrderStatus) -> Order {
        Order {
            id: OrderId::parse(id).unwrap(),
            user_id: Some(session().id),
            user_email: Some("u1@example.com".to_string()),
            items: Vec::new(),
            total_amount: Price::ZERO,
            shipping_address: String::new(),
            user_details: None,
            status,
            order_date: Some(Utc.with_ymd_and_hms(2025, 3, day, 10, 0, 0).unwrap()),
        }
    }

    fn history() -> (
        OrderHistory<MemoryIdentityProvider, MemoryOrderService>,
        MemoryOrderService,
    ) {
        let provider = MemoryIdentityProvider::new().signed_in_as(session());
        let orders = MemoryOrderService::new(&provider);
        let sessions = Arc::new(SessionManager::new(provider));
        (OrderHistory::new(sessions, orders.clone()), orders)
    }

    #[tokio::test]
    async fn test_newest_first() {
        let (history, orders) = history();
        orders.seed(order("a", 1, OrderStatus::Delivered));
        orders.seed(order("c", 20, OrderStatus::Pending));
        orders.seed(order("b", 5, OrderStatus::Shipped));

        let ids: Vec<_> = history
            .list_mine()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id.into_inner())
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_cancel_pending_order() {
        let (history, orders) = history();
        let pending = order("a", 1, OrderStatus::Pending);
        orders.seed(pending.clone());

        history.cancel(&pending).await.unwrap();
        assert_eq!(orders.orders()[0].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_shipped_order_cannot_be_cancelled() {
        let (history, orders) = history();
        let shipped = order("a", 1, OrderStatus::Shipped);
        orders.seed(shipped.clone());

        let err = history.cancel(&shipped).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled
            }
        ));
        assert_eq!(orders.orders()[0].status, OrderStatus::Shipped);
    }
}
