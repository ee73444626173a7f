//! Order lifecycle and payment reconciliation, end to end.
//!
//! Runs the cart, order and catalog services over the in-memory store with a
//! scripted M-Pesa gateway. No database or network is needed.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use chrono::TimeDelta;
use rust_decimal_macros::dec;

use campus_eats_core::{Category, FulfillmentStatus, PaymentMethod, PaymentStatus};
use campus_eats_integration_tests::{
    CUSTOMER, CartEditingGateway, CollidingStore, OTHER_CUSTOMER, RecordingNotifier,
    ScriptedGateway, TestShop,
};
use campus_eats_shop::OrderError;
use campus_eats_shop::config::OrderSettings;
use campus_eats_shop::db::{MemoryShopRepository, RepositoryError, ShopRepository, StatusChange};
use campus_eats_shop::models::{FoodItem, NewFoodItem};
use campus_eats_shop::mpesa::{PaymentOutcome, PaymentResult};
use campus_eats_shop::services::{
    CancelledBy, CustomerLocks, NoOpReason, OrderService, PlaceOrderRequest, ReconcileOutcome,
};

fn checkout(method: PaymentMethod) -> PlaceOrderRequest {
    PlaceOrderRequest {
        hostel: "Hall 6".to_string(),
        room_number: "B14".to_string(),
        phone_number: "0712345678".to_string(),
        delivery_notes: "Call on arrival".to_string(),
        payment_method: method,
    }
}

/// Two A @ 100 and one B @ 50 in the customer's cart.
async fn shop_with_food_cart(gateway: ScriptedGateway) -> (TestShop, FoodItem, FoodItem) {
    let shop = TestShop::new(gateway);
    let a = shop.item("Chapati Beans", dec!(100), Category::Food).await;
    let b = shop.item("Mandazi", dec!(50), Category::Food).await;
    shop.carts.add_item(CUSTOMER, a.id, 2).await.unwrap();
    shop.carts.add_item(CUSTOMER, b.id, 1).await.unwrap();
    (shop, a, b)
}

fn receipt(number: &str) -> PaymentResult {
    PaymentResult::Succeeded {
        receipt_number: Some(number.to_string()),
    }
}

// ============================================================================
// Placement
// ============================================================================

#[tokio::test]
async fn test_cash_order_snapshots_cart_and_credits_rewards_immediately() {
    let (shop, a, b) = shop_with_food_cart(ScriptedGateway::accepting()).await;

    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap();
    let order = &placed.order;

    assert_eq!(order.subtotal, dec!(250));
    assert_eq!(order.delivery_fee, dec!(20));
    assert_eq!(order.total, dec!(270));
    assert_eq!(order.status, FulfillmentStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(order.checkout_request_id.is_none());
    assert!(placed.checkout_request_id.is_none());
    assert!(shop.gateway.pushes().is_empty());

    let detail = shop
        .orders
        .order_detail(&order.order_number, Some(CUSTOMER))
        .await
        .unwrap();
    let mut prices: Vec<_> = detail.items.iter().map(|i| i.unit_price).collect();
    prices.sort();
    assert_eq!(prices, vec![dec!(50), dec!(100)]);
    assert_eq!(detail.history.len(), 1);
    assert_eq!(detail.history[0].status, FulfillmentStatus::Pending);

    assert!(shop.carts.view(CUSTOMER).await.unwrap().lines.is_empty());
    assert_eq!(shop.times_ordered(&a).await, 2);
    assert_eq!(shop.times_ordered(&b).await, 1);
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 270);
    assert_eq!(shop.notifier.kinds(), vec!["order_placed"]);
}

#[tokio::test]
async fn test_order_items_keep_the_price_paid() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap();

    shop.catalog.set_price(a.id, dec!(140)).await.unwrap();

    let detail = shop
        .orders
        .order_detail(&placed.order.order_number, None)
        .await
        .unwrap();
    let line = detail
        .items
        .iter()
        .find(|item| item.food_item_id == a.id)
        .unwrap();
    assert_eq!(line.unit_price, dec!(100));
    assert_eq!(detail.order.total, dec!(270));
}

#[tokio::test]
async fn test_liquor_orders_use_the_liquor_fee() {
    let shop = TestShop::with_settings(
        ScriptedGateway::accepting(),
        OrderSettings {
            delivery_fee_liquor: dec!(45),
            ..OrderSettings::default()
        },
    );
    let beer = shop.item("Tusker 500ml", dec!(250), Category::Liquor).await;
    shop.carts.add_item(CUSTOMER, beer.id, 2).await.unwrap();

    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap();

    assert_eq!(placed.order.category, Category::Liquor);
    assert_eq!(placed.order.delivery_fee, dec!(45));
    assert_eq!(placed.order.total, dec!(545));
}

#[tokio::test]
async fn test_rejected_push_writes_nothing_and_keeps_cart() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::rejecting("Invalid PhoneNumber")).await;
    let before = shop.carts.view(CUSTOMER).await.unwrap();

    let result = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await;

    match result {
        Err(OrderError::PaymentInitiationFailed { reason }) => {
            assert_eq!(reason, "Invalid PhoneNumber");
        }
        other => panic!("expected PaymentInitiationFailed, got {other:?}"),
    }
    assert_eq!(shop.store.order_count().await, 0);
    assert_eq!(shop.store.history_count().await, 0);

    let after = shop.carts.view(CUSTOMER).await.unwrap();
    assert_eq!(after.item_count, before.item_count);
    assert_eq!(after.subtotal, before.subtotal);
    assert_eq!(shop.times_ordered(&a).await, 0);
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 0);
    assert!(shop.notifier.kinds().is_empty());
}

#[tokio::test]
async fn test_empty_cart_cannot_be_checked_out() {
    let shop = TestShop::new(ScriptedGateway::accepting());

    let result = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await;

    assert!(matches!(result, Err(OrderError::EmptyCart)));
    assert!(shop.gateway.pushes().is_empty());
}

#[tokio::test]
async fn test_unavailable_item_blocks_checkout() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    shop.catalog.set_availability(a.id, false).await.unwrap();

    let result = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await;

    assert!(matches!(result, Err(OrderError::Validation(_))));
    assert_eq!(shop.store.order_count().await, 0);
}

#[tokio::test]
async fn test_mixed_category_cart_is_refused() {
    let shop = TestShop::new(ScriptedGateway::accepting());
    let pilau = shop.item("Pilau", dec!(180), Category::Food).await;
    let beer = shop.item("Tusker 500ml", dec!(250), Category::Liquor).await;
    shop.carts.add_item(CUSTOMER, pilau.id, 1).await.unwrap();

    let result = shop.carts.add_item(CUSTOMER, beer.id, 1).await;

    match result {
        Err(OrderError::CategoryMismatch {
            existing,
            attempted,
        }) => {
            assert_eq!(existing, Category::Food);
            assert_eq!(attempted, Category::Liquor);
        }
        other => panic!("expected CategoryMismatch, got {other:?}"),
    }

    // Emptying the cart allows the other category
    shop.carts.clear(CUSTOMER).await.unwrap();
    let cart = shop.carts.add_item(CUSTOMER, beer.id, 1).await.unwrap();
    assert_eq!(cart.category, Some(Category::Liquor));
}

#[tokio::test]
async fn test_carts_are_per_customer() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    shop.carts.add_item(OTHER_CUSTOMER, a.id, 1).await.unwrap();

    shop.orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap();

    let other = shop.carts.view(OTHER_CUSTOMER).await.unwrap();
    assert_eq!(other.item_count, 1);
}

#[tokio::test]
async fn test_double_submit_creates_one_order() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;

    let (first, second) = tokio::join!(
        shop.orders
            .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa)),
        shop.orders
            .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa)),
    );

    let (placed, refused) = match (first, second) {
        (Ok(placed), Err(err)) | (Err(err), Ok(placed)) => (placed, err),
        (first, second) => panic!("expected one order, got {first:?} and {second:?}"),
    };
    assert!(matches!(refused, OrderError::EmptyCart));
    assert_eq!(placed.order.total, dec!(270));
    assert_eq!(shop.store.order_count().await, 1);
    assert_eq!(shop.gateway.pushes().len(), 1);

    let detail = shop
        .orders
        .order_detail(&placed.order.order_number, None)
        .await
        .unwrap();
    let quantity_a: i32 = detail
        .items
        .iter()
        .filter(|item| item.food_item_id == a.id)
        .map(|item| item.quantity)
        .sum();
    assert_eq!(quantity_a, 2);
    assert_eq!(shop.notifier.kinds(), vec!["order_placed"]);
}

#[tokio::test]
async fn test_cart_edited_during_push_is_not_checked_out() {
    let store = Arc::new(MemoryShopRepository::new());
    let ugali = store
        .create_food_item(&NewFoodItem::new("Ugali Sukuma", dec!(100), Category::Food))
        .await
        .unwrap();
    store.add_to_cart(CUSTOMER, ugali.id, 2).await.unwrap();
    let line = store.cart(CUSTOMER).await.unwrap().lines[0].id;

    // Another instance raises the quantity to 5 while the push is out
    let orders = OrderService::new(
        store.clone(),
        Arc::new(CartEditingGateway::new(store.clone(), CUSTOMER, line, 5)),
        Arc::new(RecordingNotifier::new()),
        OrderSettings::default(),
        CustomerLocks::new(),
    );

    let result = orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await;

    assert!(matches!(result, Err(OrderError::EmptyCart)));
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.history_count().await, 0);
    let cart = store.cart(CUSTOMER).await.unwrap();
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.lines[0].quantity, 5);
}

async fn colliding_service(collisions: usize) -> (OrderService, Arc<CollidingStore>, Arc<MemoryShopRepository>) {
    let inner = Arc::new(MemoryShopRepository::new());
    let pilau = inner
        .create_food_item(&NewFoodItem::new("Pilau", dec!(180), Category::Food))
        .await
        .unwrap();
    inner.add_to_cart(CUSTOMER, pilau.id, 1).await.unwrap();

    let store = Arc::new(CollidingStore::new(inner.clone(), collisions));
    let orders = OrderService::new(
        store.clone(),
        Arc::new(ScriptedGateway::accepting()),
        Arc::new(RecordingNotifier::new()),
        OrderSettings::default(),
        CustomerLocks::new(),
    );
    (orders, store, inner)
}

#[tokio::test]
async fn test_order_number_collision_is_retried_with_a_new_number() {
    let (orders, store, inner) = colliding_service(1).await;

    let placed = orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap();

    let attempts = store.attempts();
    assert_eq!(attempts.len(), 2);
    assert_ne!(attempts[0], attempts[1]);
    assert_eq!(placed.order.order_number, attempts[1]);
    assert_eq!(inner.order_count().await, 1);
}

#[tokio::test]
async fn test_order_number_collisions_give_up_after_three_attempts() {
    let (orders, store, inner) = colliding_service(3).await;

    let result = orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await;

    assert!(matches!(
        result,
        Err(OrderError::Repository(RepositoryError::DuplicateOrderNumber(_)))
    ));
    assert_eq!(store.attempts().len(), 3);
    assert_eq!(inner.order_count().await, 0);
    assert_eq!(inner.cart(CUSTOMER).await.unwrap().lines.len(), 1);
}

// ============================================================================
// M-Pesa reconciliation
// ============================================================================

#[tokio::test]
async fn test_mpesa_order_defers_rewards_until_payment_confirms() {
    let (shop, a, b) = shop_with_food_cart(ScriptedGateway::accepting()).await;

    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();
    let checkout_id = placed.checkout_request_id.clone().unwrap();

    assert_eq!(placed.order.payment_status, PaymentStatus::Processing);
    assert_eq!(placed.order.status, FulfillmentStatus::Pending);
    assert_eq!(placed.order.checkout_request_id.as_deref(), Some(checkout_id.as_str()));
    assert!(shop.carts.view(CUSTOMER).await.unwrap().lines.is_empty());
    assert_eq!(shop.times_ordered(&a).await, 0);
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 0);

    let pushes = shop.gateway.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].amount, dec!(270));
    assert_eq!(pushes[0].phone, "254712345678");
    assert_eq!(pushes[0].reference, placed.order.order_number.as_str());

    let outcome = shop
        .orders
        .reconcile_payment_result(&checkout_id, receipt("QKJ4ABCD12"))
        .await
        .unwrap();

    let ReconcileOutcome::Applied(order) = outcome else {
        panic!("expected the payment to apply");
    };
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.status, FulfillmentStatus::Preparing);
    assert_eq!(order.mpesa_receipt_number.as_deref(), Some("QKJ4ABCD12"));
    assert!(order.payment_completed_at.is_some());
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 270);
    assert_eq!(shop.times_ordered(&a).await, 2);
    assert_eq!(shop.times_ordered(&b).await, 1);

    let detail = shop
        .orders
        .order_detail(&order.order_number, Some(CUSTOMER))
        .await
        .unwrap();
    let last = detail.history.last().unwrap();
    assert!(last.note.contains("QKJ4ABCD12"));
    assert_eq!(
        shop.notifier.kinds(),
        vec!["order_placed", "payment_confirmed"]
    );
}

#[tokio::test]
async fn test_paid_orders_can_stay_pending_by_policy() {
    let shop = TestShop::with_settings(
        ScriptedGateway::accepting(),
        OrderSettings {
            paid_order_status: FulfillmentStatus::Pending,
            ..OrderSettings::default()
        },
    );
    let pilau = shop.item("Pilau", dec!(180), Category::Food).await;
    shop.carts.add_item(CUSTOMER, pilau.id, 1).await.unwrap();
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();

    let outcome = shop
        .orders
        .reconcile_payment_result(&placed.checkout_request_id.unwrap(), receipt("QKJ4ABCD13"))
        .await
        .unwrap();

    let ReconcileOutcome::Applied(order) = outcome else {
        panic!("expected the payment to apply");
    };
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.status, FulfillmentStatus::Pending);
}

#[tokio::test]
async fn test_duplicate_callbacks_apply_once() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();
    let checkout_id = placed.checkout_request_id.unwrap();

    let first = shop
        .orders
        .reconcile_payment_result(&checkout_id, receipt("QKJ4ABCD12"))
        .await
        .unwrap();
    let history_after_first = shop.store.history_count().await;

    let second = shop
        .orders
        .reconcile_payment_result(&checkout_id, receipt("QKJ4ABCD12"))
        .await
        .unwrap();

    assert!(first.is_applied());
    assert!(matches!(
        second,
        ReconcileOutcome::NoOp(NoOpReason::AlreadySettled)
    ));
    assert_eq!(shop.store.history_count().await, history_after_first);
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 270);
    assert_eq!(shop.times_ordered(&a).await, 2);
    assert_eq!(
        shop.notifier.kinds(),
        vec!["order_placed", "payment_confirmed"]
    );
}

#[tokio::test]
async fn test_callback_then_poll_counts_rewards_once() {
    let (shop, a, b) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();
    let checkout_id = placed.checkout_request_id.unwrap();
    shop.gateway
        .set_outcome(&checkout_id, PaymentOutcome::Succeeded);

    shop.orders
        .reconcile_payment_result(&checkout_id, receipt("QKJ4ABCD12"))
        .await
        .unwrap();
    let polled = shop.orders.poll_payment(CUSTOMER, &checkout_id).await.unwrap();

    assert_eq!(polled.payment_status, PaymentStatus::Completed);
    // Settled payments are answered from the store
    assert_eq!(shop.gateway.query_count(), 0);
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 270);
    assert_eq!(shop.times_ordered(&a).await, 2);
    assert_eq!(shop.times_ordered(&b).await, 1);
}

#[tokio::test]
async fn test_poll_then_callback_counts_rewards_once() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();
    let checkout_id = placed.checkout_request_id.unwrap();

    // Customer has not answered the prompt yet
    let pending = shop.orders.poll_payment(CUSTOMER, &checkout_id).await.unwrap();
    assert_eq!(pending.payment_status, PaymentStatus::Processing);

    shop.gateway
        .set_outcome(&checkout_id, PaymentOutcome::Succeeded);
    let paid = shop.orders.poll_payment(CUSTOMER, &checkout_id).await.unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Completed);
    assert_eq!(paid.status, FulfillmentStatus::Preparing);
    assert!(paid.mpesa_receipt_number.is_none());

    let late_callback = shop
        .orders
        .reconcile_payment_result(&checkout_id, receipt("QKJ4ABCD12"))
        .await
        .unwrap();

    assert!(!late_callback.is_applied());
    assert_eq!(shop.gateway.query_count(), 2);
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 270);
    assert_eq!(shop.times_ordered(&a).await, 2);
}

#[tokio::test]
async fn test_poll_survives_provider_outage() {
    let (shop, _, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();
    let checkout_id = placed.checkout_request_id.unwrap();
    shop.gateway.fail_queries("connection reset");

    let order = shop.orders.poll_payment(CUSTOMER, &checkout_id).await.unwrap();

    assert_eq!(order.payment_status, PaymentStatus::Processing);
}

#[tokio::test]
async fn test_poll_is_limited_to_own_payments() {
    let (shop, _, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();

    let result = shop
        .orders
        .poll_payment(OTHER_CUSTOMER, &placed.checkout_request_id.unwrap())
        .await;

    assert!(matches!(result, Err(OrderError::NotFound(_))));
    assert_eq!(shop.gateway.query_count(), 0);
}

#[tokio::test]
async fn test_failed_payment_cancels_without_rewards() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();

    let outcome = shop
        .orders
        .reconcile_payment_result(
            &placed.checkout_request_id.unwrap(),
            PaymentResult::Failed {
                reason: "Request cancelled by user".to_string(),
            },
        )
        .await
        .unwrap();

    let ReconcileOutcome::Applied(order) = outcome else {
        panic!("expected the failure to apply");
    };
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.status, FulfillmentStatus::Cancelled);
    assert_eq!(
        order.payment_failure_reason.as_deref(),
        Some("Request cancelled by user")
    );
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 0);
    assert_eq!(shop.times_ordered(&a).await, 0);
    assert_eq!(shop.notifier.kinds(), vec!["order_placed", "payment_failed"]);
}

#[tokio::test]
async fn test_orders_awaiting_payment_cannot_be_cancelled() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();
    let number = placed.order.order_number.clone();
    let history_before = shop.store.history_count().await;

    for by in [CancelledBy::Customer(CUSTOMER), CancelledBy::Staff] {
        assert!(matches!(
            shop.orders.cancel_order(&number, "Changed my mind", by).await,
            Err(OrderError::InvalidState { .. })
        ));
    }
    assert_eq!(shop.store.history_count().await, history_before);

    shop.orders
        .reconcile_payment_result(
            &placed.checkout_request_id.unwrap(),
            receipt("QKJ4ABCD12"),
        )
        .await
        .unwrap();
    let order = shop.orders.order_detail(&number, None).await.unwrap().order;
    assert_eq!(order.status, FulfillmentStatus::Preparing);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 270);
    assert_eq!(shop.times_ordered(&a).await, 2);
}

#[tokio::test]
async fn test_payment_landing_after_cancellation_earns_nothing() {
    let (shop, a, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let placed = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();

    // A cancellation that committed just before the payment result arrived
    shop.store
        .change_status(&StatusChange {
            order_id: placed.order.id,
            expected: FulfillmentStatus::Pending,
            new_status: FulfillmentStatus::Cancelled,
            note: "Cancelled by staff: Kitchen closed".to_string(),
            cancellation_reason: Some("Kitchen closed".to_string()),
        })
        .await
        .unwrap()
        .unwrap();
    shop.carts.add_item(CUSTOMER, a.id, 1).await.unwrap();

    let outcome = shop
        .orders
        .reconcile_payment_result(
            &placed.checkout_request_id.unwrap(),
            receipt("QKJ4ABCD12"),
        )
        .await
        .unwrap();

    let ReconcileOutcome::Applied(order) = outcome else {
        panic!("expected the payment to be recorded");
    };
    assert_eq!(order.status, FulfillmentStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 0);
    assert_eq!(shop.times_ordered(&a).await, 0);
    // The next cart is left alone
    assert_eq!(shop.carts.view(CUSTOMER).await.unwrap().item_count, 1);
}

#[tokio::test]
async fn test_unknown_checkout_request_is_a_no_op() {
    let (shop, _, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;

    let outcome = shop
        .orders
        .reconcile_payment_result("ws_CO_UNKNOWN", receipt("QKJ4ABCD12"))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        ReconcileOutcome::NoOp(NoOpReason::UnknownCorrelation)
    ));
    assert_eq!(shop.store.order_count().await, 0);
    assert_eq!(shop.store.history_count().await, 0);
    assert!(shop.notifier.kinds().is_empty());
}

#[tokio::test]
async fn test_stale_sweep_settles_answered_payments() {
    let shop = TestShop::new(ScriptedGateway::accepting());
    let pilau = shop.item("Pilau", dec!(180), Category::Food).await;

    let mut checkout_ids = Vec::new();
    for customer in [CUSTOMER, OTHER_CUSTOMER] {
        shop.carts.add_item(customer, pilau.id, 1).await.unwrap();
        let placed = shop
            .orders
            .place_order(customer, checkout(PaymentMethod::Mpesa))
            .await
            .unwrap();
        checkout_ids.push(placed.checkout_request_id.unwrap());
    }
    shop.gateway
        .set_outcome(&checkout_ids[0], PaymentOutcome::Succeeded);

    // A negative age puts the cutoff after both orders
    let report = shop
        .orders
        .reconcile_stale_payments(TimeDelta::seconds(-1))
        .await
        .unwrap();

    assert_eq!(report.checked, 2);
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.still_pending, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(shop.orders.loyalty_points(CUSTOMER).await.unwrap(), 200);
    assert_eq!(shop.orders.loyalty_points(OTHER_CUSTOMER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_stale_sweep_ignores_recent_payments() {
    let (shop, _, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    shop.orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Mpesa))
        .await
        .unwrap();

    let report = shop
        .orders
        .reconcile_stale_payments(TimeDelta::minutes(10))
        .await
        .unwrap();

    assert_eq!(report.checked, 0);
    assert_eq!(shop.gateway.query_count(), 0);
}

// ============================================================================
// Fulfillment
// ============================================================================

#[tokio::test]
async fn test_cancel_from_pending_and_preparing_only() {
    let shop = TestShop::new(ScriptedGateway::accepting());
    let pilau = shop.item("Pilau", dec!(180), Category::Food).await;

    // Pending, cancelled by the customer
    shop.carts.add_item(CUSTOMER, pilau.id, 1).await.unwrap();
    let first = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap()
        .order;
    let history_before = shop.store.history_count().await;
    let cancelled = shop
        .orders
        .cancel_order(
            &first.order_number,
            "Ordered twice",
            CancelledBy::Customer(CUSTOMER),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, FulfillmentStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Ordered twice"));
    assert_eq!(shop.store.history_count().await, history_before + 1);
    let history = shop
        .store
        .status_history(cancelled.id)
        .await
        .unwrap();
    assert_eq!(
        history.last().unwrap().note,
        "Cancelled by customer: Ordered twice"
    );

    // Cancelled again
    assert!(matches!(
        shop.orders
            .cancel_order(&first.order_number, "again", CancelledBy::Staff)
            .await,
        Err(OrderError::InvalidState { .. })
    ));

    // Preparing, cancelled by staff
    shop.carts.add_item(CUSTOMER, pilau.id, 1).await.unwrap();
    let second = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap()
        .order;
    shop.orders
        .update_status(&second.order_number, "preparing", None)
        .await
        .unwrap();
    let cancelled = shop
        .orders
        .cancel_order(&second.order_number, "Out of rice", CancelledBy::Staff)
        .await
        .unwrap();
    assert_eq!(cancelled.status, FulfillmentStatus::Cancelled);

    // Delivered
    shop.carts.add_item(CUSTOMER, pilau.id, 1).await.unwrap();
    let third = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap()
        .order;
    for status in ["preparing", "out_for_delivery", "delivered"] {
        shop.orders
            .update_status(&third.order_number, status, None)
            .await
            .unwrap();
    }
    let history_before = shop.store.history_count().await;
    assert!(matches!(
        shop.orders
            .cancel_order(&third.order_number, "Too late", CancelledBy::Staff)
            .await,
        Err(OrderError::InvalidState { .. })
    ));
    assert_eq!(shop.store.history_count().await, history_before);
}

#[tokio::test]
async fn test_orders_do_not_move_backwards() {
    let (shop, _, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let number = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap()
        .order
        .order_number;
    shop.orders
        .update_status(&number, "out_for_delivery", None)
        .await
        .unwrap();
    let history_before = shop.store.history_count().await;

    for earlier in ["pending", "preparing"] {
        assert!(matches!(
            shop.orders.update_status(&number, earlier, None).await,
            Err(OrderError::InvalidState { .. })
        ));
    }
    assert_eq!(shop.store.history_count().await, history_before);

    let delivered = shop
        .orders
        .update_status(&number, "delivered", None)
        .await
        .unwrap();
    assert_eq!(delivered.status, FulfillmentStatus::Delivered);
}

#[tokio::test]
async fn test_customers_cannot_cancel_other_customers_orders() {
    let (shop, _, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let order = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap()
        .order;

    let result = shop
        .orders
        .cancel_order(
            &order.order_number,
            "Not mine",
            CancelledBy::Customer(OTHER_CUSTOMER),
        )
        .await;

    assert!(matches!(result, Err(OrderError::NotFound(_))));
}

#[tokio::test]
async fn test_delivery_flow_then_rating() {
    let (shop, _, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let order = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap()
        .order;

    shop.orders
        .update_status(&order.order_number, "preparing", Some("Rice on the stove"))
        .await
        .unwrap();
    shop.orders
        .update_status(&order.order_number, "out_for_delivery", None)
        .await
        .unwrap();
    let delivered = shop
        .orders
        .update_status(&order.order_number, "delivered", None)
        .await
        .unwrap();
    assert_eq!(delivered.status, FulfillmentStatus::Delivered);

    let rated = shop
        .orders
        .rate_order(CUSTOMER, &order.order_number, 5, "Still hot")
        .await
        .unwrap();
    assert_eq!(rated.rating, Some(5));

    let detail = shop
        .orders
        .order_detail(&order.order_number, Some(CUSTOMER))
        .await
        .unwrap();
    let notes: Vec<_> = detail.history.iter().map(|h| h.note.as_str()).collect();
    assert_eq!(
        notes,
        vec![
            "Order placed",
            "Rice on the stove",
            "Status changed from Preparing to Out for Delivery",
            "Status changed from Out for Delivery to Delivered",
        ]
    );

    let history = shop.orders.customer_orders(CUSTOMER).await.unwrap();
    assert!(history.active.is_empty());
    assert_eq!(history.past.len(), 1);
    assert_eq!(
        shop.notifier.kinds(),
        vec![
            "order_placed",
            "status_changed",
            "status_changed",
            "status_changed"
        ]
    );
}

#[tokio::test]
async fn test_kitchen_board_lists_new_orders() {
    let (shop, _, _) = shop_with_food_cart(ScriptedGateway::accepting()).await;
    let since = chrono::Utc::now() - TimeDelta::seconds(1);
    let order = shop
        .orders
        .place_order(CUSTOMER, checkout(PaymentMethod::Cash))
        .await
        .unwrap()
        .order;

    let fresh = shop.orders.new_orders_since(since).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].order_number, order.order_number);

    shop.orders
        .cancel_order(&order.order_number, "Closed early", CancelledBy::Staff)
        .await
        .unwrap();
    assert!(shop.orders.new_orders_since(since).await.unwrap().is_empty());

    let cancelled = shop
        .orders
        .recent_orders(Some(FulfillmentStatus::Cancelled), 10)
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
}
