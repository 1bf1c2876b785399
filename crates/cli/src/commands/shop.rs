//! Catalog, cart, checkout and order history commands.

use camstore_core::{CurrencyCode, OrderId, Price, ProductId};
use camstore_storefront::models::{CheckoutForm, Order};
use camstore_storefront::state::AppState;

use super::CliError;

pub(super) fn money(price: Price) -> String {
    price.display(CurrencyCode::default())
}

/// List every product.
pub async fn products(state: &AppState) -> Result<(), CliError> {
    let products = state.catalog().products().await?;
    if products.is_empty() {
        tracing::info!("The catalog is empty");
        return Ok(());
    }

    for product in products.iter() {
        tracing::info!(
            "{:<20} {:<32} {:>12}  {} in stock",
            product.id.as_str(),
            product.name,
            money(product.price),
            product.stock
        );
    }
    Ok(())
}

/// Refresh and print the cart.
pub async fn show_cart(state: &AppState) -> Result<(), CliError> {
    let store = state.cart();
    store.load().await?;

    let cart = store.cart();
    if cart.is_empty() {
        tracing::info!("Your cart is empty");
        return Ok(());
    }

    for line in cart.lines() {
        tracing::info!(
            "{:<20} {:<32} {:>3} x {:>12} = {:>12}",
            line.product_id.as_str(),
            line.name,
            line.quantity,
            money(line.unit_price),
            money(line.line_total())
        );
    }
    tracing::info!("{} items, total {}", cart.item_count(), money(cart.total()));
    Ok(())
}

pub async fn add(state: &AppState, product_id: &ProductId) -> Result<(), CliError> {
    let product = state
        .catalog()
        .product(product_id)
        .await?
        .ok_or_else(|| CliError::NotFound(format!("product {product_id}")))?;

    state.cart().add(&product).await?;
    tracing::info!("Added {} to your cart", product.name);
    show_cart(state).await
}

pub async fn remove(state: &AppState, product_id: &ProductId) -> Result<(), CliError> {
    state.cart().remove(product_id).await?;
    show_cart(state).await
}

pub async fn set_quantity(
    state: &AppState,
    product_id: &ProductId,
    quantity: i64,
) -> Result<(), CliError> {
    state.cart().set_quantity(product_id, quantity).await?;
    show_cart(state).await
}

pub async fn clear(state: &AppState) -> Result<(), CliError> {
    state.cart().clear().await?;
    tracing::info!("Cart cleared");
    Ok(())
}

/// Place an order for the current cart.
pub async fn checkout(
    state: &AppState,
    name: String,
    phone: String,
    address: String,
) -> Result<(), CliError> {
    let form = CheckoutForm {
        buyer_name: name,
        buyer_phone: phone,
        shipping_address: address,
    };
    let order_id = state.checkout().submit(&form).await?;
    tracing::info!("Order {order_id} placed");
    Ok(())
}

pub(super) fn print_order(order: &Order) {
    let date = order
        .order_date
        .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string());
    tracing::info!(
        "{:<24} {:<10} {:<11} {:>12}  {} items",
        order.id.as_str(),
        date,
        order.status.as_str(),
        money(order.total_amount),
        order.items.len()
    );
}

pub async fn list_orders(state: &AppState) -> Result<(), CliError> {
    let orders = state.orders().list_mine().await?;
    if orders.is_empty() {
        tracing::info!("You have no orders");
    }
    orders.iter().for_each(print_order);
    Ok(())
}

pub async fn cancel_order(state: &AppState, order_id: &OrderId) -> Result<(), CliError> {
    let orders = state.orders().list_mine().await?;
    let order = orders
        .iter()
        .find(|o| &o.id == order_id)
        .ok_or_else(|| CliError::NotFound(format!("order {order_id}")))?;

    state.orders().cancel(order).await?;
    tracing::info!("Order {order_id} cancelled");
    Ok(())
}
