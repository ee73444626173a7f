//! In-memory implementation of [`ShopRepository`].
//!
//! All state sits behind one async mutex, so every method is atomic with
//! respect to every other. Used by tests and local experiments; nothing is
//! persisted.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use campus_eats_core::{
    CartItemId, Category, CustomerId, FoodItemId, FulfillmentStatus, OrderId, OrderItemId,
    OrderNumber, PaymentStatus,
};

use super::{
    NewOrder, OrderFilter, PaymentSettlement, RepositoryError, Rewards, ShopRepository,
    StatusChange,
};
use crate::models::{Cart, CartLine, FoodItem, NewFoodItem, Order, OrderItem, StatusHistoryEntry};

#[derive(Debug, Clone)]
struct StoredCartItem {
    id: CartItemId,
    customer: CustomerId,
    item: FoodItemId,
    quantity: i32,
}

#[derive(Default)]
struct State {
    next_id: i32,
    next_history_id: i64,
    items: HashMap<FoodItemId, FoodItem>,
    cart: Vec<StoredCartItem>,
    orders: Vec<Order>,
    order_items: Vec<OrderItem>,
    history: Vec<StatusHistoryEntry>,
    loyalty: HashMap<CustomerId, i64>,
}

impl State {
    const fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn item(&self, id: FoodItemId) -> Result<&FoodItem, RepositoryError> {
        self.items.get(&id).ok_or(RepositoryError::NotFound)
    }

    fn order_mut(&mut self, id: OrderId) -> Result<&mut Order, RepositoryError> {
        self.orders
            .iter_mut()
            .find(|order| order.id == id)
            .ok_or(RepositoryError::NotFound)
    }

    fn append_history(&mut self, order: OrderId, status: FulfillmentStatus, note: &str) {
        self.next_history_id += 1;
        self.history.push(StatusHistoryEntry {
            id: self.next_history_id,
            order_id: order,
            status,
            note: note.to_owned(),
            created_at: Utc::now(),
        });
    }

    fn grant_rewards(&mut self, order: OrderId, customer: CustomerId, rewards: Rewards) {
        let sold: Vec<(FoodItemId, i32)> = self
            .order_items
            .iter()
            .filter(|item| item.order_id == order)
            .map(|item| (item.food_item_id, item.quantity))
            .collect();

        for (id, quantity) in sold {
            if let Some(item) = self.items.get_mut(&id) {
                item.times_ordered += i64::from(quantity);
            }
        }

        *self.loyalty.entry(customer).or_default() += rewards.loyalty_points;
    }

    fn cart_lines(&self, customer: CustomerId) -> Vec<CartLine> {
        self.cart
            .iter()
            .filter(|line| line.customer == customer)
            .filter_map(|line| {
                let item = self.items.get(&line.item)?;
                Some(CartLine {
                    id: line.id,
                    food_item_id: item.id,
                    name: item.name.clone(),
                    unit_price: item.price,
                    category: item.category,
                    is_available: item.is_available,
                    quantity: line.quantity,
                })
            })
            .collect()
    }
}

/// Repository holding everything in process memory.
#[derive(Default)]
pub struct MemoryShopRepository {
    state: Mutex<State>,
}

impl MemoryShopRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders ever created.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Number of history rows across all orders.
    pub async fn history_count(&self) -> usize {
        self.state.lock().await.history.len()
    }
}

#[async_trait]
impl ShopRepository for MemoryShopRepository {
    async fn food_item(&self, id: FoodItemId) -> Result<Option<FoodItem>, RepositoryError> {
        Ok(self.state.lock().await.items.get(&id).cloned())
    }

    async fn menu(&self, category: Option<Category>) -> Result<Vec<FoodItem>, RepositoryError> {
        let state = self.state.lock().await;
        let mut items: Vec<FoodItem> = state
            .items
            .values()
            .filter(|item| item.is_available)
            .filter(|item| category.is_none_or(|c| item.category == c))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            b.is_featured
                .cmp(&a.is_featured)
                .then(b.times_ordered.cmp(&a.times_ordered))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(items)
    }

    async fn catalog_items(&self) -> Result<Vec<FoodItem>, RepositoryError> {
        let state = self.state.lock().await;
        let mut items: Vec<FoodItem> = state.items.values().cloned().collect();
        items.sort_by(|a, b| {
            a.category
                .as_str()
                .cmp(b.category.as_str())
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(items)
    }

    async fn create_food_item(&self, item: &NewFoodItem) -> Result<FoodItem, RepositoryError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created = FoodItem {
            id: FoodItemId::new(state.next_id()),
            name: item.name.clone(),
            description: item.description.clone(),
            price: item.price,
            category: item.category,
            is_available: item.is_available,
            is_featured: item.is_featured,
            times_ordered: 0,
            prep_time_minutes: item.prep_time_minutes,
            created_at: now,
            updated_at: now,
        };
        state.items.insert(created.id, created.clone());
        Ok(created)
    }

    async fn set_item_availability(
        &self,
        id: FoodItemId,
        available: bool,
    ) -> Result<FoodItem, RepositoryError> {
        let mut state = self.state.lock().await;
        let item = state.items.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        item.is_available = available;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn set_item_price(
        &self,
        id: FoodItemId,
        price: Decimal,
    ) -> Result<FoodItem, RepositoryError> {
        let mut state = self.state.lock().await;
        let item = state.items.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        item.price = price;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn cart(&self, customer: CustomerId) -> Result<Cart, RepositoryError> {
        let state = self.state.lock().await;
        Ok(Cart {
            customer_id: customer,
            lines: state.cart_lines(customer),
        })
    }

    async fn add_to_cart(
        &self,
        customer: CustomerId,
        item: FoodItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.item(item)?;

        if let Some(line) = state
            .cart
            .iter_mut()
            .find(|line| line.customer == customer && line.item == item)
        {
            line.quantity += quantity;
            return Ok(());
        }

        let id = CartItemId::new(state.next_id());
        state.cart.push(StoredCartItem {
            id,
            customer,
            item,
            quantity,
        });
        Ok(())
    }

    async fn set_cart_quantity(
        &self,
        customer: CustomerId,
        line: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state
            .cart
            .iter_mut()
            .find(|stored| stored.id == line && stored.customer == customer)
            .ok_or(RepositoryError::NotFound)?;
        stored.quantity = quantity;
        Ok(())
    }

    async fn remove_cart_line(
        &self,
        customer: CustomerId,
        line: CartItemId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let before = state.cart.len();
        state
            .cart
            .retain(|stored| !(stored.id == line && stored.customer == customer));
        if state.cart.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn clear_cart(&self, customer: CustomerId) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().await;
        let before = state.cart.len();
        state.cart.retain(|stored| stored.customer != customer);
        Ok(u64::try_from(before - state.cart.len()).unwrap_or(u64::MAX))
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state.lock().await;

        if state
            .orders
            .iter()
            .any(|existing| existing.order_number == order.order_number)
        {
            return Err(RepositoryError::DuplicateOrderNumber(order.order_number));
        }

        let all_present = order.lines.iter().all(|line| {
            state
                .cart
                .iter()
                .any(|stored| {
                    stored.id == line.id
                        && stored.customer == order.customer_id
                        && stored.quantity == line.quantity
                })
        });
        if !all_present {
            return Err(RepositoryError::StaleCart);
        }

        let now = Utc::now();
        let created = Order {
            id: OrderId::new(state.next_id()),
            order_number: order.order_number,
            customer_id: order.customer_id,
            category: order.category,
            hostel: order.delivery.hostel,
            room_number: order.delivery.room_number,
            phone_number: order.delivery.phone.as_str().to_owned(),
            delivery_notes: order.delivery.notes,
            subtotal: order.subtotal,
            delivery_fee: order.delivery_fee,
            total: order.total,
            status: FulfillmentStatus::Pending,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            checkout_request_id: order.checkout_request_id,
            mpesa_receipt_number: None,
            payment_completed_at: None,
            payment_failure_reason: None,
            estimated_delivery: order.estimated_delivery,
            delivered_at: None,
            cancellation_reason: None,
            rating: None,
            review: None,
            created_at: now,
            updated_at: now,
        };

        state.cart.retain(|stored| {
            stored.customer != order.customer_id
                || !order.lines.iter().any(|line| line.id == stored.id)
        });

        for line in &order.lines {
            let id = OrderItemId::new(state.next_id());
            state.order_items.push(OrderItem {
                id,
                order_id: created.id,
                food_item_id: line.food_item_id,
                name: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }

        state.orders.push(created.clone());
        state.append_history(created.id, created.status, &order.history_note);

        if let Some(rewards) = order.rewards {
            state.grant_rewards(created.id, created.customer_id, rewards);
        }

        Ok(created)
    }

    async fn order_by_number(
        &self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .find(|order| &order.order_number == number)
            .cloned())
    }

    async fn order_by_checkout_request(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .find(|order| order.checkout_request_id.as_deref() == Some(checkout_request_id))
            .cloned())
    }

    async fn orders_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|order| order.customer_id == customer)
            .cloned()
            .collect())
    }

    async fn recent_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|order| filter.status.is_none_or(|s| order.status == s))
            .filter(|order| filter.created_after.is_none_or(|t| order.created_at > t))
            .take(usize::try_from(filter.limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn order_items(&self, order: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .order_items
            .iter()
            .filter(|item| item.order_id == order)
            .cloned()
            .collect())
    }

    async fn status_history(
        &self,
        order: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .iter()
            .filter(|entry| entry.order_id == order)
            .cloned()
            .collect())
    }

    async fn settle_payment(
        &self,
        order: OrderId,
        settlement: &PaymentSettlement,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state.order_mut(order)?;

        if stored.payment_status.is_settled() {
            return Ok(None);
        }

        stored.updated_at = Utc::now();
        match settlement {
            PaymentSettlement::Completed {
                receipt_number,
                paid_at,
                next_status,
                ..
            } => {
                stored.payment_status = PaymentStatus::Completed;
                stored.mpesa_receipt_number.clone_from(receipt_number);
                stored.payment_completed_at = Some(*paid_at);
                if stored.status == FulfillmentStatus::Pending {
                    stored.status = *next_status;
                }
            }
            PaymentSettlement::Failed { reason, .. } => {
                stored.payment_status = PaymentStatus::Failed;
                stored.payment_failure_reason = Some(reason.clone());
                if stored.status.is_cancellable() {
                    stored.status = FulfillmentStatus::Cancelled;
                }
            }
        }
        let settled = stored.clone();

        match settlement {
            PaymentSettlement::Completed { rewards, note, .. } => {
                if settled.status != FulfillmentStatus::Cancelled {
                    state.grant_rewards(settled.id, settled.customer_id, *rewards);
                    state
                        .cart
                        .retain(|stored| stored.customer != settled.customer_id);
                }
                state.append_history(settled.id, settled.status, note);
            }
            PaymentSettlement::Failed { note, .. } => {
                state.append_history(settled.id, settled.status, note);
            }
        }

        Ok(Some(settled))
    }

    async fn change_status(&self, change: &StatusChange) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state.order_mut(change.order_id)?;

        if stored.status != change.expected {
            return Ok(None);
        }

        let now = Utc::now();
        stored.status = change.new_status;
        stored.updated_at = now;
        if change.new_status == FulfillmentStatus::Delivered {
            stored.delivered_at = Some(now);
        }
        if change.cancellation_reason.is_some() {
            stored.cancellation_reason.clone_from(&change.cancellation_reason);
        }
        let updated = stored.clone();

        state.append_history(updated.id, updated.status, &change.note);
        Ok(Some(updated))
    }

    async fn record_rating(
        &self,
        order: OrderId,
        rating: i16,
        review: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.lock().await;
        let stored = state.order_mut(order)?;

        if stored.status != FulfillmentStatus::Delivered || stored.rating.is_some() {
            return Ok(None);
        }

        stored.rating = Some(rating);
        stored.review = Some(review.to_owned());
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn stale_processing_orders(
        &self,
        placed_before: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .filter(|order| order.payment_status == PaymentStatus::Processing)
            .filter(|order| order.created_at < placed_before)
            .cloned()
            .collect())
    }

    async fn loyalty_points(&self, customer: CustomerId) -> Result<i64, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .loyalty
            .get(&customer)
            .copied()
            .unwrap_or_default())
    }
}
