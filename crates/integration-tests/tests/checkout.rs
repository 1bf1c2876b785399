//! Integration tests for checkout and order history.
//!
//! Full buyer and admin journeys: sign in, fill the cart, place an order,
//! then manage it from both sides.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use camstore_core::OrderStatus;
use camstore_integration_tests::{
    TestContext, buyer, camera, product_id, session, shipping_form,
};
use camstore_storefront::error::StoreError;
use camstore_storefront::models::{CheckoutForm, RemoteCartLine};
use camstore_storefront::services::GateDecision;
use rust_decimal::Decimal;

// =============================================================================
// Placement
// =============================================================================

#[tokio::test]
async fn test_checkout_without_session_leaves_cart_alone() {
    let ctx = TestContext::new().await;
    ctx.sign_in_buyer().await;
    ctx.cart.add(&camera("cam1", 100)).await.unwrap();
    ctx.sessions.sign_out().await.unwrap();

    let err = ctx.checkout.submit(&shipping_form()).await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthenticated));
    assert!(err.redirects_to_sign_in());
    assert_eq!(ctx.carts.lines(&buyer().id).len(), 1);
    assert!(ctx.orders.submitted().is_empty());
}

#[tokio::test]
async fn test_successful_checkout_empties_cart() {
    let ctx = TestContext::new().await;
    ctx.sign_in_buyer().await;
    ctx.cart.add(&camera("cam1", 100)).await.unwrap();
    ctx.cart.set_quantity(&product_id("cam1"), 2).await.unwrap();

    let order_id = ctx.checkout.submit(&shipping_form()).await.unwrap();
    assert!(ctx.cart.cart().is_empty());
    assert!(ctx.carts.lines(&buyer().id).is_empty());

    let submitted = ctx.orders.submitted();
    assert_eq!(submitted.len(), 1);
    let draft = &submitted[0];
    assert_eq!(draft.user_id(), &buyer().id);
    assert_eq!(draft.items().len(), 1);
    assert_eq!(draft.items()[0].quantity, 2);
    assert_eq!(draft.total_amount().amount(), Decimal::new(200, 0));
    assert_eq!(draft.status(), OrderStatus::Pending);

    let mine = ctx.history.list_mine().await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, order_id);
}

#[tokio::test]
async fn test_preconditions_are_checked_in_order() {
    let ctx = TestContext::new().await;
    ctx.sign_in_buyer().await;

    // Blank fields win over the empty cart
    let blank = CheckoutForm {
        buyer_name: " ".to_string(),
        shipping_address: String::new(),
        ..shipping_form()
    };
    match ctx.checkout.submit(&blank).await {
        Err(StoreError::Validation { missing }) => {
            assert_eq!(missing, vec!["buyer_name", "shipping_address"]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    assert!(matches!(
        ctx.checkout.submit(&shipping_form()).await,
        Err(StoreError::EmptyCart)
    ));
    assert!(ctx.orders.submitted().is_empty());
}

#[tokio::test]
async fn test_rejected_order_can_be_retried_without_loss() {
    let ctx = TestContext::new().await;
    ctx.sign_in_buyer().await;
    ctx.cart.add(&camera("cam2", 250)).await.unwrap();
    ctx.orders.fail_next_submit();

    let err = ctx.checkout.submit(&shipping_form()).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(ctx.cart.cart().len(), 1);
    assert!(ctx.orders.orders().is_empty());

    ctx.checkout.submit(&shipping_form()).await.unwrap();
    assert_eq!(ctx.orders.orders().len(), 1);
    assert!(ctx.cart.cart().is_empty());
}

#[tokio::test]
async fn test_double_submit_places_one_order() {
    let ctx = TestContext::new().await;
    ctx.sign_in_buyer().await;
    ctx.cart.add(&camera("cam1", 100)).await.unwrap();
    let release = ctx.orders.hold_next_submit();

    let first = {
        let checkout = Arc::clone(&ctx.checkout);
        tokio::spawn(async move { checkout.submit(&shipping_form()).await })
    };
    ctx.settle().await;

    assert!(matches!(
        ctx.checkout.submit(&shipping_form()).await,
        Err(StoreError::SubmissionInFlight)
    ));

    release.release();
    first.await.unwrap().unwrap();
    assert_eq!(ctx.orders.orders().len(), 1);
}

#[tokio::test]
async fn test_account_switch_during_submit_keeps_other_cart() {
    let ctx = TestContext::new().await;
    let other = session("other");
    ctx.carts.seed(
        &other.id,
        vec![RemoteCartLine {
            product_id: product_id("cam9"),
            name: "Camera cam9".to_string(),
            unit_price: camera("cam9", 900).price,
            image_ref: String::new(),
            quantity: 1,
        }],
    );
    ctx.sign_in_buyer().await;
    ctx.cart.add(&camera("cam1", 100)).await.unwrap();
    let release = ctx.orders.hold_next_submit();

    let pending = {
        let checkout = Arc::clone(&ctx.checkout);
        tokio::spawn(async move { checkout.submit(&shipping_form()).await })
    };
    ctx.settle().await;

    ctx.identity.set_current(Some(other.clone()));
    ctx.sessions.report(Some(other.clone()));
    release.release();

    let order_id = pending.await.unwrap().unwrap();
    assert_eq!(ctx.orders.orders()[0].id, order_id);
    assert_eq!(ctx.carts.lines(&other.id).len(), 1);
    // The buyer's cart could not be cleared once they were replaced
    assert_eq!(ctx.carts.lines(&buyer().id).len(), 1);

    ctx.settle().await;
    assert!(ctx.cart.cart().get(&product_id("cam9")).is_some());
}

#[tokio::test]
async fn test_checkout_right_after_failed_sign_in_load() {
    let ctx = TestContext::new().await;
    ctx.carts.seed(
        &buyer().id,
        vec![RemoteCartLine {
            product_id: product_id("cam2"),
            name: "Camera cam2".to_string(),
            unit_price: camera("cam2", 250).price,
            image_ref: String::new(),
            quantity: 1,
        }],
    );
    ctx.carts.fail_fetches(true);
    ctx.sign_in_buyer().await;
    assert!(!ctx.cart.is_synced());

    ctx.carts.fail_fetches(false);
    ctx.checkout.submit(&shipping_form()).await.unwrap();
    let submitted = ctx.orders.submitted();
    assert_eq!(submitted[0].total_amount().amount(), Decimal::new(250, 0));
    assert!(ctx.carts.lines(&buyer().id).is_empty());
}

// =============================================================================
// After placement
// =============================================================================

#[tokio::test]
async fn test_buyer_cancels_until_admin_ships() {
    let ctx = TestContext::new().await;
    ctx.sign_in_buyer().await;
    ctx.cart.add(&camera("cam1", 100)).await.unwrap();
    ctx.checkout.submit(&shipping_form()).await.unwrap();
    ctx.cart.add(&camera("cam2", 250)).await.unwrap();
    ctx.checkout.submit(&shipping_form()).await.unwrap();
    ctx.sessions.sign_out().await.unwrap();

    // Admin ships one of the two pending orders
    ctx.sign_in_admin().await;
    let gate = ctx.gate("/admin/orders");
    let GateDecision::Render(context) = gate.settled().await else {
        panic!("admin should be authorized");
    };
    let pending = ctx
        .admin
        .orders(&context, Some(OrderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
    ctx.admin
        .set_order_status(&context, &pending[0].id, OrderStatus::Shipped)
        .await
        .unwrap();
    ctx.sessions.sign_out().await.unwrap();
    assert!(gate.context().is_err());

    ctx.sign_in_buyer().await;
    let mine = ctx.history.list_mine().await.unwrap();
    let shipped = mine.iter().find(|o| o.status == OrderStatus::Shipped).unwrap();
    let open = mine.iter().find(|o| o.status == OrderStatus::Pending).unwrap();

    let err = ctx.history.cancel(shipped).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    ctx.history.cancel(open).await.unwrap();
    let statuses: Vec<_> = ctx
        .history
        .list_mine()
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.status)
        .collect();
    assert!(statuses.contains(&OrderStatus::Cancelled));
    assert!(statuses.contains(&OrderStatus::Shipped));
}

#[tokio::test]
async fn test_admin_product_edits_show_in_catalog() {
    let ctx = TestContext::new().await;
    ctx.sign_in_admin().await;
    let gate = ctx.gate("/admin/products");
    let GateDecision::Render(context) = gate.settled().await else {
        panic!("admin should be authorized");
    };

    assert_eq!(ctx.catalog.products().await.unwrap().len(), 2);
    ctx.admin
        .delete_product(&context, &product_id("cam2"))
        .await
        .unwrap();

    let products = ctx.catalog.products().await.unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].id, product_id("cam1"));
    assert_eq!(ctx.products.listings(), 2);
}
