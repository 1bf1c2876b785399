//! Admin commands.
//!
//! Every command resolves an authorization gate first and stops with the
//! sign-in location if access is denied.
//!
//! # Usage
//!
//! ```bash
//! camstore admin orders --status processing
//! camstore admin status order-123 shipped
//! camstore admin users
//! camstore admin delete-product cam-dome-4mp
//! ```

use camstore_core::{OrderId, OrderStatus, Price, ProductId};
use camstore_storefront::services::{AuthorizedContext, GateDecision};
use camstore_storefront::state::AppState;

use super::CliError;
use super::shop::{money, print_order};

/// Wait for the gate guarding `path` to settle.
async fn authorize(state: &AppState, path: &str) -> Result<AuthorizedContext, CliError> {
    let gate = state.admin_gate(path);
    match gate.settled().await {
        GateDecision::Render(context) => Ok(context),
        GateDecision::Redirect(redirect) => Err(CliError::Denied(redirect.location())),
        // settled() only returns once the gate has decided
        GateDecision::Loading => Err(CliError::Denied(path.to_string())),
    }
}

pub async fn orders(state: &AppState, status: Option<OrderStatus>) -> Result<(), CliError> {
    let context = authorize(state, "/admin/orders").await?;
    let orders = state.admin().orders(&context, status).await?;

    if orders.is_empty() {
        tracing::info!("No orders");
        return Ok(());
    }
    for order in &orders {
        print_order(order);
        if let Some(email) = &order.user_email {
            tracing::info!("    buyer: {email}");
        }
    }
    let revenue: Price = orders
        .iter()
        .filter(|o| o.status != OrderStatus::Cancelled)
        .map(|o| o.total_amount)
        .sum();
    tracing::info!("{} orders, {} excluding cancelled", orders.len(), money(revenue));
    Ok(())
}

pub async fn set_status(
    state: &AppState,
    order_id: &OrderId,
    status: OrderStatus,
) -> Result<(), CliError> {
    let context = authorize(state, "/admin/orders").await?;
    state
        .admin()
        .set_order_status(&context, order_id, status)
        .await?;
    tracing::info!("Order {order_id} is now {status}");
    Ok(())
}

pub async fn users(state: &AppState) -> Result<(), CliError> {
    let context = authorize(state, "/admin/users").await?;
    for user in state.admin().users(&context).await? {
        tracing::info!(
            "{:<32} {:<32} {}",
            user.id.as_str(),
            user.email,
            if user.is_admin { "admin" } else { "" }
        );
    }
    Ok(())
}

pub async fn delete_product(state: &AppState, product_id: &ProductId) -> Result<(), CliError> {
    let context = authorize(state, "/admin/products").await?;
    state.admin().delete_product(&context, product_id).await?;
    tracing::info!("Product {product_id} deleted");
    Ok(())
}
