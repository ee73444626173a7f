//! Orders, their line items and status history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use campus_eats_core::{
    Category, CustomerId, FoodItemId, FulfillmentStatus, OrderId, OrderItemId, OrderNumber,
    PaymentMethod, PaymentStatus, PhoneNumber,
};

/// A placed order.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub category: Category,
    pub hostel: String,
    pub room_number: String,
    pub phone_number: String,
    pub delivery_notes: String,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub status: FulfillmentStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// M-Pesa `CheckoutRequestID` returned when the STK push was accepted.
    pub checkout_request_id: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub payment_failure_reason: Option<String>,
    pub estimated_delivery: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub rating: Option<i16>,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Still moving through the kitchen or delivery.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Price snapshot of one cart line, taken when the order was created.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub food_item_id: FoodItemId,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderItem {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// One row of the append-only order audit log.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub order_id: OrderId,
    pub status: FulfillmentStatus,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Where and to whom an order is delivered.
#[derive(Debug, Clone)]
pub struct DeliveryInfo {
    pub hostel: String,
    pub room_number: String,
    pub phone: PhoneNumber,
    pub notes: String,
}

/// An order with its items and history, for detail views.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<StatusHistoryEntry>,
}
