//! Order lifecycle coordination.
//!
//! [`OrderService`] turns a cart into an order, attaches an M-Pesa payment
//! leg when the customer pays up front, and reconciles the provider's
//! asynchronous result with the order. Reconciliation is idempotent: a
//! callback and a status poll for the same payment, in any order and any
//! number of times, apply the result exactly once.
//!
//! ```text
//! fulfillment: pending -> preparing -> out_for_delivery -> delivered
//!                 \           \
//!                  +-----------+--> cancelled
//! payment:     pending -> processing -> completed | failed
//! ```

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use campus_eats_core::{
    Category, CustomerId, FulfillmentStatus, OrderNumber, PaymentMethod, PaymentStatus,
    PhoneNumber, loyalty_points_for,
};

use crate::config::OrderSettings;
use crate::db::{
    NewOrder, OrderFilter, PaymentSettlement, RepositoryError, Rewards, ShopRepository,
    StatusChange,
};
use crate::error::OrderError;
use crate::models::{Cart, DeliveryInfo, Order, OrderDetail};
use crate::mpesa::{PaymentGateway, PaymentInitiation, PaymentOutcome, PaymentResult};
use crate::notify::{NotificationSink, OrderEvent};

use super::locks::CustomerLocks;

/// Attempts at inserting an order before a order-number collision is fatal.
const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// Cap on a staff order listing.
pub const MAX_LISTING_LIMIT: i64 = 200;

/// Checkout form.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrderRequest {
    pub hostel: String,
    pub room_number: String,
    pub phone_number: String,
    #[serde(default)]
    pub delivery_notes: String,
    pub payment_method: PaymentMethod,
}

/// A newly created order and, for M-Pesa, the push that is awaiting the customer.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub checkout_request_id: Option<String>,
    pub customer_message: Option<String>,
}

/// Who cancelled an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "actor", content = "customer_id")]
pub enum CancelledBy {
    /// The customer; may only cancel their own orders.
    Customer(CustomerId),
    Staff,
}

impl CancelledBy {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Customer(_) => "customer",
            Self::Staff => "staff",
        }
    }
}

/// Why a payment result was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoOpReason {
    /// No order carries the checkout request id.
    UnknownCorrelation,
    /// The payment already completed or failed.
    AlreadySettled,
}

/// Result of reconciling a payment result. Neither variant is an error.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    Applied(Order),
    NoOp(NoOpReason),
}

impl ReconcileOutcome {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// A customer's orders split for the order history page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomerOrders {
    pub active: Vec<Order>,
    pub past: Vec<Order>,
}

/// Counts from a stale payment sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StaleSweepReport {
    pub checked: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Coordinates carts, orders, payments and notifications.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn ShopRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationSink>,
    settings: OrderSettings,
    locks: CustomerLocks,
}

impl OrderService {
    /// `locks` should be shared with the cart service.
    #[must_use]
    pub fn new(
        store: Arc<dyn ShopRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationSink>,
        settings: OrderSettings,
        locks: CustomerLocks,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            settings,
            locks,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &OrderSettings {
        &self.settings
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Turn the customer's cart into an order.
    ///
    /// Cash orders are final immediately: popularity counters and loyalty are
    /// credited in the same write that creates the order. M-Pesa orders push
    /// a payment prompt first and are only created if the provider accepts
    /// it; their counters and loyalty wait for the payment result.
    ///
    /// # Errors
    ///
    /// - `Validation` for missing delivery details, a bad phone number or an
    ///   item that has become unavailable
    /// - `EmptyCart` if there is nothing to check out (including when a
    ///   concurrent checkout consumed the cart first)
    /// - `PaymentInitiationFailed` if the provider refused the push; nothing
    ///   is written and the cart is untouched
    #[instrument(skip(self, request), fields(customer = %customer, method = %request.payment_method))]
    pub async fn place_order(
        &self,
        customer: CustomerId,
        request: PlaceOrderRequest,
    ) -> Result<PlacedOrder, OrderError> {
        let placed = self
            .locks
            .run(customer, self.place_order_locked(customer, request))
            .await?;

        info!(
            order_number = %placed.order.order_number,
            total = %placed.order.total,
            "Order placed"
        );
        self.notifier
            .notify(OrderEvent::OrderPlaced(placed.order.clone()));
        Ok(placed)
    }

    async fn place_order_locked(
        &self,
        customer: CustomerId,
        request: PlaceOrderRequest,
    ) -> Result<PlacedOrder, OrderError> {
        let delivery = validate_delivery(&request)?;

        let cart = self.store.cart(customer).await?;
        let category = checkout_category(&cart)?;

        let subtotal = cart.subtotal();
        let delivery_fee = self.settings.delivery_fee(category);
        let total = subtotal + delivery_fee;
        let placed_at = Utc::now();
        let mut order_number = OrderNumber::generate(placed_at);

        let (payment_status, checkout_request_id, customer_message, history_note, rewards) =
            match request.payment_method {
                PaymentMethod::Cash => (
                    PaymentStatus::Pending,
                    None,
                    None,
                    "Order placed",
                    Some(Rewards {
                        loyalty_points: loyalty_points_for(total),
                    }),
                ),
                PaymentMethod::Mpesa => {
                    // No store rows are locked while the provider is called
                    let initiation = self
                        .gateway
                        .initiate_payment(
                            &delivery.phone,
                            total,
                            order_number.as_str(),
                            transaction_description(category),
                        )
                        .await;
                    match initiation {
                        PaymentInitiation::Accepted {
                            checkout_request_id,
                            customer_message,
                        } => (
                            PaymentStatus::Processing,
                            Some(checkout_request_id),
                            Some(customer_message),
                            "Awaiting M-Pesa payment",
                            None,
                        ),
                        PaymentInitiation::Rejected { reason } => {
                            warn!(reason = %reason, "M-Pesa payment initiation rejected");
                            return Err(OrderError::PaymentInitiationFailed { reason });
                        }
                    }
                }
            };

        let mut attempt = 1;
        let created = loop {
            let new_order = NewOrder {
                order_number: order_number.clone(),
                customer_id: customer,
                category,
                delivery: delivery.clone(),
                subtotal,
                delivery_fee,
                total,
                payment_method: request.payment_method,
                payment_status,
                checkout_request_id: checkout_request_id.clone(),
                estimated_delivery: placed_at + self.settings.delivery_estimate,
                lines: cart.lines.clone(),
                history_note: history_note.to_string(),
                rewards,
            };

            match self.store.create_order(new_order).await {
                Ok(order) => break Ok(order),
                Err(RepositoryError::DuplicateOrderNumber(taken))
                    if attempt < MAX_ORDER_NUMBER_ATTEMPTS =>
                {
                    warn!(order_number = %taken, attempt, "Order number collision, retrying");
                    order_number = OrderNumber::generate(placed_at);
                    attempt += 1;
                }
                Err(e) => break Err(e),
            }
        };

        let order = match created {
            Ok(order) => order,
            Err(RepositoryError::StaleCart) => {
                if let Some(id) = &checkout_request_id {
                    error!(
                        checkout_request_id = %id,
                        "Cart consumed by a concurrent checkout after the M-Pesa push was sent"
                    );
                }
                return Err(OrderError::EmptyCart);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(PlacedOrder {
            order,
            checkout_request_id,
            customer_message,
        })
    }

    // =========================================================================
    // Payment reconciliation
    // =========================================================================

    /// Apply a provider payment result to the order it belongs to.
    ///
    /// Safe to call any number of times for the same payment: only the first
    /// call that finds the payment unsettled writes anything.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the store fails. Unknown or already settled
    /// payments are `Ok(ReconcileOutcome::NoOp(_))`.
    #[instrument(skip(self, result))]
    pub async fn reconcile_payment_result(
        &self,
        checkout_request_id: &str,
        result: PaymentResult,
    ) -> Result<ReconcileOutcome, OrderError> {
        let Some(order) = self
            .store
            .order_by_checkout_request(checkout_request_id)
            .await?
        else {
            warn!("Payment result for unknown checkout request");
            return Ok(ReconcileOutcome::NoOp(NoOpReason::UnknownCorrelation));
        };

        if order.payment_status.is_settled() {
            info!(
                order_number = %order.order_number,
                payment_status = %order.payment_status,
                "Payment already settled"
            );
            return Ok(ReconcileOutcome::NoOp(NoOpReason::AlreadySettled));
        }

        let settlement = match &result {
            PaymentResult::Succeeded { receipt_number } => PaymentSettlement::Completed {
                receipt_number: receipt_number.clone(),
                paid_at: Utc::now(),
                next_status: self.settings.paid_order_status,
                rewards: Rewards {
                    loyalty_points: loyalty_points_for(order.total),
                },
                note: receipt_number.as_ref().map_or_else(
                    || "Payment confirmed via status query".to_string(),
                    |receipt| format!("Payment confirmed (M-Pesa receipt {receipt})"),
                ),
            },
            PaymentResult::Failed { reason } => PaymentSettlement::Failed {
                reason: reason.clone(),
                note: format!("Payment failed: {reason}"),
            },
        };

        let Some(settled) = self.store.settle_payment(order.id, &settlement).await? else {
            info!(order_number = %order.order_number, "Lost settlement race");
            return Ok(ReconcileOutcome::NoOp(NoOpReason::AlreadySettled));
        };

        let event = match settlement {
            PaymentSettlement::Completed { .. } => {
                if settled.status == FulfillmentStatus::Cancelled {
                    warn!(
                        order_number = %settled.order_number,
                        "Payment completed for a cancelled order; refund required"
                    );
                }
                info!(order_number = %settled.order_number, "Payment confirmed");
                OrderEvent::PaymentConfirmed(settled.clone())
            }
            PaymentSettlement::Failed { .. } => {
                info!(order_number = %settled.order_number, "Payment failed");
                OrderEvent::PaymentFailed(settled.clone())
            }
        };
        self.notifier.notify(event);

        Ok(ReconcileOutcome::Applied(settled))
    }

    /// Ask the provider where a customer's payment stands and apply the
    /// answer. Returns the order as it is after the call.
    ///
    /// Provider errors are logged and leave the order unchanged; the client
    /// can poll again.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` unless the checkout request belongs to one of the
    /// customer's orders.
    #[instrument(skip(self))]
    pub async fn poll_payment(
        &self,
        customer: CustomerId,
        checkout_request_id: &str,
    ) -> Result<Order, OrderError> {
        let order = self
            .store
            .order_by_checkout_request(checkout_request_id)
            .await?
            .filter(|order| order.customer_id == customer)
            .ok_or_else(|| OrderError::NotFound("payment".to_string()))?;

        if order.payment_status.is_settled() {
            return Ok(order);
        }

        let report = match self.gateway.query_payment_status(checkout_request_id).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "M-Pesa status query failed");
                return Ok(order);
            }
        };

        let result = match report.outcome {
            PaymentOutcome::Pending => return Ok(order),
            PaymentOutcome::Succeeded => PaymentResult::Succeeded {
                receipt_number: None,
            },
            PaymentOutcome::Failed { reason } => PaymentResult::Failed { reason },
        };

        match self
            .reconcile_payment_result(checkout_request_id, result)
            .await?
        {
            ReconcileOutcome::Applied(updated) => Ok(updated),
            // Settled by a callback in the meantime
            ReconcileOutcome::NoOp(_) => Ok(self
                .store
                .order_by_checkout_request(checkout_request_id)
                .await?
                .unwrap_or(order)),
        }
    }

    /// Poll the provider for M-Pesa orders still processing after `older_than`.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the stale orders cannot be listed. Failures
    /// for individual orders are counted in the report.
    #[instrument(skip(self))]
    pub async fn reconcile_stale_payments(
        &self,
        older_than: TimeDelta,
    ) -> Result<StaleSweepReport, OrderError> {
        let cutoff = Utc::now() - older_than;
        let stale = self.store.stale_processing_orders(cutoff).await?;
        let mut report = StaleSweepReport::default();

        for order in stale {
            let Some(checkout_request_id) = order.checkout_request_id.as_deref() else {
                continue;
            };
            report.checked += 1;

            let outcome = match self.gateway.query_payment_status(checkout_request_id).await {
                Ok(status) => status.outcome,
                Err(e) => {
                    warn!(order_number = %order.order_number, error = %e, "Status query failed");
                    report.errors += 1;
                    continue;
                }
            };

            let result = match outcome {
                PaymentOutcome::Pending => {
                    report.still_pending += 1;
                    continue;
                }
                PaymentOutcome::Succeeded => PaymentResult::Succeeded {
                    receipt_number: None,
                },
                PaymentOutcome::Failed { reason } => PaymentResult::Failed { reason },
            };
            let succeeded = matches!(result, PaymentResult::Succeeded { .. });

            match self
                .reconcile_payment_result(checkout_request_id, result)
                .await
            {
                Ok(ReconcileOutcome::Applied(_)) if succeeded => report.confirmed += 1,
                Ok(ReconcileOutcome::Applied(_)) => report.failed += 1,
                Ok(ReconcileOutcome::NoOp(_)) => {}
                Err(e) => {
                    warn!(order_number = %order.order_number, error = %e, "Reconciliation failed");
                    report.errors += 1;
                }
            }
        }

        info!(?report, "Stale payment sweep finished");
        Ok(report)
    }

    // =========================================================================
    // Fulfillment
    // =========================================================================

    /// Move an order to a new fulfillment status (staff).
    ///
    /// # Errors
    ///
    /// - `Validation` for an unknown status name
    /// - `NotFound` if the order does not exist
    /// - `InvalidState` when the order is finished, already in that status,
    ///   the target is an earlier stage, or the target is `cancelled` (use
    ///   [`OrderService::cancel_order`])
    /// - `Conflict` if another update changed the status first
    #[instrument(skip(self, notes))]
    pub async fn update_status(
        &self,
        order_number: &OrderNumber,
        new_status: &str,
        notes: Option<&str>,
    ) -> Result<Order, OrderError> {
        let new_status = FulfillmentStatus::from_str(new_status.trim())
            .map_err(|e| OrderError::Validation(e.to_string()))?;
        let order = self.find_order(order_number).await?;
        let current = order.status;

        if current.is_terminal() {
            return Err(OrderError::invalid_state(
                current,
                format!("order is already {}", current.display_name().to_lowercase()),
            ));
        }
        if new_status == current {
            return Err(OrderError::invalid_state(
                current,
                format!("order is already {}", current.display_name().to_lowercase()),
            ));
        }
        if new_status == FulfillmentStatus::Cancelled {
            return Err(OrderError::invalid_state(
                current,
                "use cancel to cancel an order",
            ));
        }
        if !current.can_advance_to(new_status) {
            return Err(OrderError::invalid_state(
                current,
                format!(
                    "orders cannot move back from {} to {}",
                    current.display_name().to_lowercase(),
                    new_status.display_name().to_lowercase()
                ),
            ));
        }

        let note = notes
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(
                || {
                    format!(
                        "Status changed from {} to {}",
                        current.display_name(),
                        new_status.display_name()
                    )
                },
                ToString::to_string,
            );

        let updated = self
            .store
            .change_status(&StatusChange {
                order_id: order.id,
                expected: current,
                new_status,
                note,
                cancellation_reason: None,
            })
            .await?
            .ok_or_else(|| {
                OrderError::Conflict("the order was updated by someone else, reload and try again".to_string())
            })?;

        info!(from = %current, to = %new_status, "Order status changed");
        self.notifier.notify(OrderEvent::StatusChanged {
            order: updated.clone(),
            from: current,
        });
        Ok(updated)
    }

    /// Cancel an order that has not left the kitchen.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank reason
    /// - `NotFound` if the order does not exist or, for a customer, is not theirs
    /// - `InvalidState` unless the order is `pending` or `preparing`, or
    ///   while its M-Pesa payment is still processing
    /// - `Conflict` if another update changed the status first
    #[instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        order_number: &OrderNumber,
        reason: &str,
        by: CancelledBy,
    ) -> Result<Order, OrderError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrderError::Validation(
                "a cancellation reason is required".to_string(),
            ));
        }

        let order = match by {
            CancelledBy::Customer(customer) => self.customer_order(customer, order_number).await?,
            CancelledBy::Staff => self.find_order(order_number).await?,
        };

        if !order.status.is_cancellable() {
            return Err(OrderError::invalid_state(
                order.status,
                format!(
                    "{} orders cannot be cancelled",
                    order.status.display_name().to_lowercase()
                ),
            ));
        }
        if order.payment_status == PaymentStatus::Processing {
            return Err(OrderError::invalid_state(
                order.status,
                "the M-Pesa payment is still in progress, wait for it to finish",
            ));
        }

        let updated = self
            .store
            .change_status(&StatusChange {
                order_id: order.id,
                expected: order.status,
                new_status: FulfillmentStatus::Cancelled,
                note: format!("Cancelled by {}: {reason}", by.label()),
                cancellation_reason: Some(reason.to_string()),
            })
            .await?
            .ok_or_else(|| {
                OrderError::Conflict("the order was updated by someone else, reload and try again".to_string())
            })?;

        info!(by = by.label(), "Order cancelled");
        self.notifier.notify(OrderEvent::OrderCancelled {
            order: updated.clone(),
            by,
        });
        Ok(updated)
    }

    /// Rate a delivered order once.
    ///
    /// # Errors
    ///
    /// - `Validation` for a rating outside 1-5
    /// - `NotFound` unless the order is the customer's
    /// - `InvalidState` if the order is not delivered or already rated
    #[instrument(skip(self, review))]
    pub async fn rate_order(
        &self,
        customer: CustomerId,
        order_number: &OrderNumber,
        rating: i16,
        review: &str,
    ) -> Result<Order, OrderError> {
        if !(1..=5).contains(&rating) {
            return Err(OrderError::Validation(
                "rating must be between 1 and 5".to_string(),
            ));
        }

        let order = self.customer_order(customer, order_number).await?;
        if order.status != FulfillmentStatus::Delivered {
            return Err(OrderError::invalid_state(
                order.status,
                "only delivered orders can be rated",
            ));
        }
        if order.rating.is_some() {
            return Err(OrderError::invalid_state(
                order.status,
                "this order has already been rated",
            ));
        }

        self.store
            .record_rating(order.id, rating, review.trim())
            .await?
            .ok_or_else(|| {
                OrderError::invalid_state(order.status, "this order has already been rated")
            })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// One of the customer's orders.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist or belongs to someone else.
    pub async fn customer_order(
        &self,
        customer: CustomerId,
        order_number: &OrderNumber,
    ) -> Result<Order, OrderError> {
        self.store
            .order_by_number(order_number)
            .await?
            .filter(|order| order.customer_id == customer)
            .ok_or_else(|| OrderError::NotFound("order".to_string()))
    }

    /// Order with items and history. With `viewer`, only that customer's orders.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist or is not visible.
    pub async fn order_detail(
        &self,
        order_number: &OrderNumber,
        viewer: Option<CustomerId>,
    ) -> Result<OrderDetail, OrderError> {
        let order = match viewer {
            Some(customer) => self.customer_order(customer, order_number).await?,
            None => self.find_order(order_number).await?,
        };
        let items = self.store.order_items(order.id).await?;
        let history = self.store.status_history(order.id).await?;
        Ok(OrderDetail {
            order,
            items,
            history,
        })
    }

    /// The customer's orders, newest first, split into active and past.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the store fails.
    pub async fn customer_orders(&self, customer: CustomerId) -> Result<CustomerOrders, OrderError> {
        let (active, past) = self
            .store
            .orders_for_customer(customer)
            .await?
            .into_iter()
            .partition(Order::is_active);
        Ok(CustomerOrders { active, past })
    }

    /// Recent orders for the staff dashboard, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the store fails.
    pub async fn recent_orders(
        &self,
        status: Option<FulfillmentStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, OrderError> {
        let filter = OrderFilter {
            status,
            created_after: None,
            limit: limit.clamp(1, MAX_LISTING_LIMIT),
        };
        Ok(self.store.recent_orders(&filter).await?)
    }

    /// Orders created after `since` that still need the kitchen's attention.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the store fails.
    pub async fn new_orders_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, OrderError> {
        let filter = OrderFilter {
            status: None,
            created_after: Some(since),
            limit: MAX_LISTING_LIMIT,
        };
        let mut orders = self.store.recent_orders(&filter).await?;
        orders.retain(|order| {
            matches!(
                order.status,
                FulfillmentStatus::Pending | FulfillmentStatus::Preparing
            )
        });
        Ok(orders)
    }

    /// Current loyalty balance.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if the store fails.
    pub async fn loyalty_points(&self, customer: CustomerId) -> Result<i64, OrderError> {
        Ok(self.store.loyalty_points(customer).await?)
    }

    async fn find_order(&self, order_number: &OrderNumber) -> Result<Order, OrderError> {
        self.store
            .order_by_number(order_number)
            .await?
            .ok_or_else(|| OrderError::NotFound("order".to_string()))
    }
}

/// Check the delivery fields and normalise the phone number.
fn validate_delivery(request: &PlaceOrderRequest) -> Result<DeliveryInfo, OrderError> {
    let hostel = request.hostel.trim();
    if hostel.is_empty() {
        return Err(OrderError::Validation("hostel is required".to_string()));
    }
    let room_number = request.room_number.trim();
    if room_number.is_empty() {
        return Err(OrderError::Validation("room number is required".to_string()));
    }
    let phone = PhoneNumber::parse(&request.phone_number)
        .map_err(|e| OrderError::Validation(e.to_string()))?;

    Ok(DeliveryInfo {
        hostel: hostel.to_string(),
        room_number: room_number.to_string(),
        phone,
        notes: request.delivery_notes.trim().to_string(),
    })
}

/// The cart's category, once every line is known to be orderable.
fn checkout_category(cart: &Cart) -> Result<Category, OrderError> {
    let category = cart.category().ok_or(OrderError::EmptyCart)?;

    if let Some(line) = cart.lines.iter().find(|line| !line.is_available) {
        return Err(OrderError::Validation(format!(
            "{} is no longer available, remove it to continue",
            line.name
        )));
    }
    if let Some(line) = cart.lines.iter().find(|line| line.category != category) {
        return Err(OrderError::CategoryMismatch {
            existing: category,
            attempted: line.category,
        });
    }

    Ok(category)
}

const fn transaction_description(category: Category) -> &'static str {
    match category {
        Category::Food => "Food order",
        Category::Liquor => "Liquor order",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db::MemoryShopRepository;
    use crate::models::NewFoodItem;
    use crate::mpesa::{GatewayError, PaymentStatusReport};
    use crate::notify::LogNotifier;

    const CUSTOMER: CustomerId = CustomerId::new(1);

    struct RejectingGateway;

    #[async_trait]
    impl PaymentGateway for RejectingGateway {
        async fn initiate_payment(
            &self,
            _phone: &PhoneNumber,
            _amount: Decimal,
            _reference: &str,
            _description: &str,
        ) -> PaymentInitiation {
            PaymentInitiation::Rejected {
                reason: "insufficient balance".to_string(),
            }
        }

        async fn query_payment_status(
            &self,
            _checkout_request_id: &str,
        ) -> Result<PaymentStatusReport, GatewayError> {
            Err(GatewayError::UnexpectedResponse("not used".to_string()))
        }
    }

    async fn service_with_cart() -> (OrderService, Arc<MemoryShopRepository>) {
        let store = Arc::new(MemoryShopRepository::new());
        let item = store
            .create_food_item(&NewFoodItem::new("Pilau", dec!(150), Category::Food))
            .await
            .unwrap();
        store.add_to_cart(CUSTOMER, item.id, 1).await.unwrap();

        let service = OrderService::new(
            store.clone(),
            Arc::new(RejectingGateway),
            Arc::new(LogNotifier),
            OrderSettings::default(),
            CustomerLocks::new(),
        );
        (service, store)
    }

    fn request(method: PaymentMethod) -> PlaceOrderRequest {
        PlaceOrderRequest {
            hostel: "Hall 6".to_string(),
            room_number: "B14".to_string(),
            phone_number: "0712 345 678".to_string(),
            delivery_notes: String::new(),
            payment_method: method,
        }
    }

    #[tokio::test]
    async fn test_delivery_details_are_required() {
        let (service, _) = service_with_cart().await;

        let mut missing_hostel = request(PaymentMethod::Cash);
        missing_hostel.hostel = "   ".to_string();
        assert!(matches!(
            service.place_order(CUSTOMER, missing_hostel).await,
            Err(OrderError::Validation(_))
        ));

        let mut bad_phone = request(PaymentMethod::Cash);
        bad_phone.phone_number = "12345".to_string();
        assert!(matches!(
            service.place_order(CUSTOMER, bad_phone).await,
            Err(OrderError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_push_writes_nothing() {
        let (service, store) = service_with_cart().await;

        let err = service
            .place_order(CUSTOMER, request(PaymentMethod::Mpesa))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::PaymentInitiationFailed { ref reason } if reason == "insufficient balance"
        ));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.cart(CUSTOMER).await.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn test_cash_order_normalises_delivery_fields() {
        let (service, _) = service_with_cart().await;

        let placed = service
            .place_order(CUSTOMER, request(PaymentMethod::Cash))
            .await
            .unwrap();

        assert_eq!(placed.order.phone_number, "254712345678");
        assert_eq!(placed.order.total, dec!(170));
        assert_eq!(
            placed.order.estimated_delivery - placed.order.created_at,
            TimeDelta::minutes(30)
        );
        assert!(placed.checkout_request_id.is_none());
    }

    #[tokio::test]
    async fn test_update_status_rules() {
        let (service, _) = service_with_cart().await;
        let placed = service
            .place_order(CUSTOMER, request(PaymentMethod::Cash))
            .await
            .unwrap();
        let number = placed.order.order_number;

        assert!(matches!(
            service.update_status(&number, "teleported", None).await,
            Err(OrderError::Validation(_))
        ));
        assert!(matches!(
            service.update_status(&number, "pending", None).await,
            Err(OrderError::InvalidState { .. })
        ));
        assert!(matches!(
            service.update_status(&number, "cancelled", None).await,
            Err(OrderError::InvalidState { .. })
        ));

        service
            .update_status(&number, "delivered", None)
            .await
            .unwrap();
        assert!(matches!(
            service.update_status(&number, "preparing", None).await,
            Err(OrderError::InvalidState { .. })
        ));

        let history = service
            .order_detail(&number, None)
            .await
            .unwrap()
            .history;
        let last = history.last().unwrap();
        assert_eq!(last.note, "Status changed from Pending to Delivered");
    }

    #[tokio::test]
    async fn test_rating_rules() {
        let (service, _) = service_with_cart().await;
        let number = service
            .place_order(CUSTOMER, request(PaymentMethod::Cash))
            .await
            .unwrap()
            .order
            .order_number;

        assert!(matches!(
            service.rate_order(CUSTOMER, &number, 5, "").await,
            Err(OrderError::InvalidState { .. })
        ));

        service.update_status(&number, "delivered", None).await.unwrap();

        assert!(matches!(
            service.rate_order(CUSTOMER, &number, 6, "").await,
            Err(OrderError::Validation(_))
        ));
        assert!(matches!(
            service.rate_order(CustomerId::new(2), &number, 4, "").await,
            Err(OrderError::NotFound(_))
        ));

        let rated = service
            .rate_order(CUSTOMER, &number, 4, " Hot and fast ")
            .await
            .unwrap();
        assert_eq!(rated.rating, Some(4));
        assert_eq!(rated.review.as_deref(), Some("Hot and fast"));

        assert!(matches!(
            service.rate_order(CUSTOMER, &number, 5, "").await,
            Err(OrderError::InvalidState { .. })
        ));
    }
}
