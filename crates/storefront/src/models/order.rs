//! Order types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use camstore_core::{Email, OrderId, OrderStatus, Price, UserId};

use super::{Cart, CartLine, Session};

/// Shipping details entered on the checkout form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutForm {
    pub buyer_name: String,
    pub buyer_phone: String,
    pub shipping_address: String,
}

impl CheckoutForm {
    /// Required fields that are blank, in form order.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("buyer_name", &self.buyer_name),
            ("buyer_phone", &self.buyer_phone),
            ("shipping_address", &self.shipping_address),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }
}

/// Buyer contact block of an order (`userDetails` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerDetails {
    pub name: String,
    pub mobile_no: String,
}

/// An order as submitted by checkout.
///
/// Built once from the session, the form, and a snapshot of the cart. There
/// are no setters; a draft that was sent is never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    user_id: UserId,
    user_email: Email,
    items: Vec<CartLine>,
    total_amount: Price,
    shipping_address: String,
    user_details: BuyerDetails,
    status: OrderStatus,
}

impl OrderDraft {
    /// Snapshot `cart` into a new pending order for `session`.
    #[must_use]
    pub fn new(session: &Session, form: &CheckoutForm, cart: &Cart) -> Self {
        Self {
            user_id: session.id.clone(),
            user_email: session.email.clone(),
            items: cart.lines().cloned().collect(),
            total_amount: cart.total(),
            shipping_address: form.shipping_address.trim().to_string(),
            user_details: BuyerDetails {
                name: form.buyer_name.trim().to_string(),
                mobile_no: form.buyer_phone.trim().to_string(),
            },
            status: OrderStatus::Pending,
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub const fn user_email(&self) -> &Email {
        &self.user_email
    }

    #[must_use]
    pub fn items(&self) -> &[CartLine] {
        &self.items
    }

    #[must_use]
    pub const fn total_amount(&self) -> Price {
        self.total_amount
    }

    #[must_use]
    pub fn shipping_address(&self) -> &str {
        &self.shipping_address
    }

    #[must_use]
    pub const fn buyer(&self) -> &BuyerDetails {
        &self.user_details
    }

    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }
}

/// A line of a placed order, as read back from the order service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(alias = "cameraId")]
    pub product_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "price")]
    pub unit_price: Price,
    pub quantity: u32,
}

/// A placed order, as listed in the order history or the admin console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub total_amount: Price,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub user_details: Option<BuyerDetails>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
}

/// A user row in the admin console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    #[serde(alias = "uid")]
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}
