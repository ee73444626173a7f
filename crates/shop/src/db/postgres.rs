//! `PostgreSQL` implementation of [`ShopRepository`].
//!
//! Counters and loyalty balances are only ever changed with in-place
//! `SET x = x + n` updates. Payment settlement and status changes are
//! conditional updates whose `WHERE` clause carries the expected prior state,
//! so a second caller racing on the same order matches zero rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use campus_eats_core::{
    CartItemId, Category, CustomerId, FoodItemId, FulfillmentStatus, OrderId, OrderNumber,
};

use super::{
    NewOrder, OrderFilter, PaymentSettlement, RepositoryError, Rewards, ShopRepository,
    StatusChange,
};
use crate::models::{Cart, CartLine, FoodItem, NewFoodItem, Order, OrderItem, StatusHistoryEntry};

macro_rules! order_columns {
    () => {
        "id, order_number, customer_id, category, hostel, room_number, phone_number, \
         delivery_notes, subtotal, delivery_fee, total, status, payment_method, \
         payment_status, checkout_request_id, mpesa_receipt_number, payment_completed_at, \
         payment_failure_reason, estimated_delivery, delivered_at, cancellation_reason, \
         rating, review, created_at, updated_at"
    };
}

macro_rules! food_item_columns {
    () => {
        "id, name, description, price, category, is_available, is_featured, times_ordered, \
         prep_time_minutes, created_at, updated_at"
    };
}

/// Repository backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgShopRepository {
    pool: PgPool,
}

impl PgShopRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_order_insert_error(err: sqlx::Error, number: &OrderNumber) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        if db_err
            .constraint()
            .is_some_and(|name| name.contains("order_number"))
        {
            return RepositoryError::DuplicateOrderNumber(number.clone());
        }
        return RepositoryError::Conflict(db_err.message().to_owned());
    }
    RepositoryError::Database(err)
}

async fn append_history(
    conn: &mut PgConnection,
    order: OrderId,
    status: FulfillmentStatus,
    note: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO order_status_history (order_id, status, note) VALUES ($1, $2, $3)")
        .bind(order)
        .bind(status)
        .bind(note)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn grant_rewards(
    conn: &mut PgConnection,
    order: OrderId,
    customer: CustomerId,
    rewards: Rewards,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        UPDATE food_item f
        SET times_ordered = f.times_ordered + oi.quantity
        FROM order_item oi
        WHERE oi.order_id = $1 AND oi.food_item_id = f.id
        ",
    )
    .bind(order)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE customer SET loyalty_points = loyalty_points + $2 WHERE id = $1")
        .bind(customer)
        .bind(rewards.loyalty_points)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[async_trait]
impl ShopRepository for PgShopRepository {
    async fn food_item(&self, id: FoodItemId) -> Result<Option<FoodItem>, RepositoryError> {
        let item = sqlx::query_as::<_, FoodItem>(concat!(
            "SELECT ",
            food_item_columns!(),
            " FROM food_item WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    async fn menu(&self, category: Option<Category>) -> Result<Vec<FoodItem>, RepositoryError> {
        let items = sqlx::query_as::<_, FoodItem>(concat!(
            "SELECT ",
            food_item_columns!(),
            " FROM food_item
              WHERE is_available
                AND ($1::store_category IS NULL OR category = $1)
              ORDER BY is_featured DESC, times_ordered DESC, name"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn catalog_items(&self) -> Result<Vec<FoodItem>, RepositoryError> {
        let items = sqlx::query_as::<_, FoodItem>(concat!(
            "SELECT ",
            food_item_columns!(),
            " FROM food_item ORDER BY category, name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn create_food_item(&self, item: &NewFoodItem) -> Result<FoodItem, RepositoryError> {
        let created = sqlx::query_as::<_, FoodItem>(concat!(
            "INSERT INTO food_item
                (name, description, price, category, is_available, is_featured, prep_time_minutes)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING ",
            food_item_columns!()
        ))
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price)
        .bind(item.category)
        .bind(item.is_available)
        .bind(item.is_featured)
        .bind(item.prep_time_minutes)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn set_item_availability(
        &self,
        id: FoodItemId,
        available: bool,
    ) -> Result<FoodItem, RepositoryError> {
        sqlx::query_as::<_, FoodItem>(concat!(
            "UPDATE food_item SET is_available = $2, updated_at = NOW() WHERE id = $1 RETURNING ",
            food_item_columns!()
        ))
        .bind(id)
        .bind(available)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn set_item_price(
        &self,
        id: FoodItemId,
        price: Decimal,
    ) -> Result<FoodItem, RepositoryError> {
        sqlx::query_as::<_, FoodItem>(concat!(
            "UPDATE food_item SET price = $2, updated_at = NOW() WHERE id = $1 RETURNING ",
            food_item_columns!()
        ))
        .bind(id)
        .bind(price)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    async fn cart(&self, customer: CustomerId) -> Result<Cart, RepositoryError> {
        let lines = sqlx::query_as::<_, CartLine>(
            r"
            SELECT c.id, c.food_item_id, f.name, f.price AS unit_price, f.category,
                   f.is_available, c.quantity
            FROM cart_item c
            JOIN food_item f ON f.id = c.food_item_id
            WHERE c.customer_id = $1
            ORDER BY c.added_at, c.id
            ",
        )
        .bind(customer)
        .fetch_all(&self.pool)
        .await?;

        Ok(Cart {
            customer_id: customer,
            lines,
        })
    }

    async fn add_to_cart(
        &self,
        customer: CustomerId,
        item: FoodItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO cart_item (customer_id, food_item_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id, food_item_id)
            DO UPDATE SET quantity = cart_item.quantity + EXCLUDED.quantity
            ",
        )
        .bind(customer)
        .bind(item)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_cart_quantity(
        &self,
        customer: CustomerId,
        line: CartItemId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE cart_item SET quantity = $3 WHERE id = $2 AND customer_id = $1")
                .bind(customer)
                .bind(line)
                .bind(quantity)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn remove_cart_line(
        &self,
        customer: CustomerId,
        line: CartItemId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_item WHERE id = $2 AND customer_id = $1")
            .bind(customer)
            .bind(line)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn clear_cart(&self, customer: CustomerId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_item WHERE customer_id = $1")
            .bind(customer)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Order>(concat!(
            "INSERT INTO customer_order (
                order_number, customer_id, category, hostel, room_number, phone_number,
                delivery_notes, subtotal, delivery_fee, total, status, payment_method,
                payment_status, checkout_request_id, estimated_delivery
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             RETURNING ",
            order_columns!()
        ))
        .bind(&order.order_number)
        .bind(order.customer_id)
        .bind(order.category)
        .bind(&order.delivery.hostel)
        .bind(&order.delivery.room_number)
        .bind(order.delivery.phone.as_str())
        .bind(&order.delivery.notes)
        .bind(order.subtotal)
        .bind(order.delivery_fee)
        .bind(order.total)
        .bind(FulfillmentStatus::Pending)
        .bind(order.payment_method)
        .bind(order.payment_status)
        .bind(order.checkout_request_id.as_deref())
        .bind(order.estimated_delivery)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_order_insert_error(e, &order.order_number))?;

        let line_ids: Vec<i32> = order.lines.iter().map(|line| line.id.as_i32()).collect();
        let quantities: Vec<i32> = order.lines.iter().map(|line| line.quantity).collect();
        let removed = sqlx::query(
            r"
            DELETE FROM cart_item c
            USING unnest($2::int[], $3::int[]) AS snapshot(id, quantity)
            WHERE c.customer_id = $1
              AND c.id = snapshot.id
              AND c.quantity = snapshot.quantity
            ",
        )
        .bind(order.customer_id)
        .bind(&line_ids)
        .bind(&quantities)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed != u64::try_from(line_ids.len()).unwrap_or(u64::MAX) {
            // Dropping `tx` rolls back the order insert.
            return Err(RepositoryError::StaleCart);
        }

        for line in &order.lines {
            sqlx::query(
                r"
                INSERT INTO order_item (order_id, food_item_id, name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(created.id)
            .bind(line.food_item_id)
            .bind(&line.name)
            .bind(line.quantity)
            .bind(line.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        append_history(&mut tx, created.id, created.status, &order.history_note).await?;

        if let Some(rewards) = order.rewards {
            grant_rewards(&mut tx, created.id, created.customer_id, rewards).await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn order_by_number(
        &self,
        number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM customer_order WHERE order_number = $1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn order_by_checkout_request(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM customer_order WHERE checkout_request_id = $1"
        ))
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn orders_for_customer(
        &self,
        customer: CustomerId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM customer_order WHERE customer_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(customer)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn recent_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM customer_order
              WHERE ($1::fulfillment_status IS NULL OR status = $1)
                AND ($2::timestamptz IS NULL OR created_at > $2)
              ORDER BY created_at DESC, id DESC
              LIMIT $3"
        ))
        .bind(filter.status)
        .bind(filter.created_after)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn order_items(&self, order: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(
            r"
            SELECT id, order_id, food_item_id, name, quantity, unit_price
            FROM order_item
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(order)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn status_history(
        &self,
        order: OrderId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let history = sqlx::query_as::<_, StatusHistoryEntry>(
            r"
            SELECT id, order_id, status, note, created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(order)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }

    #[instrument(skip(self, settlement), fields(payment_status = %settlement.payment_status()))]
    async fn settle_payment(
        &self,
        order: OrderId,
        settlement: &PaymentSettlement,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let settled = match settlement {
            PaymentSettlement::Completed {
                receipt_number,
                paid_at,
                next_status,
                ..
            } => {
                sqlx::query_as::<_, Order>(concat!(
                    "UPDATE customer_order
                     SET payment_status = 'completed',
                         mpesa_receipt_number = $2,
                         payment_completed_at = $3,
                         status = CASE WHEN status = 'pending'
                                       THEN $4::fulfillment_status ELSE status END,
                         updated_at = NOW()
                     WHERE id = $1 AND payment_status IN ('pending', 'processing')
                     RETURNING ",
                    order_columns!()
                ))
                .bind(order)
                .bind(receipt_number.as_deref())
                .bind(paid_at)
                .bind(next_status)
                .fetch_optional(&mut *tx)
                .await?
            }
            PaymentSettlement::Failed { reason, .. } => {
                sqlx::query_as::<_, Order>(concat!(
                    "UPDATE customer_order
                     SET payment_status = 'failed',
                         payment_failure_reason = $2,
                         status = CASE WHEN status IN ('pending', 'preparing')
                                       THEN 'cancelled'::fulfillment_status ELSE status END,
                         updated_at = NOW()
                     WHERE id = $1 AND payment_status IN ('pending', 'processing')
                     RETURNING ",
                    order_columns!()
                ))
                .bind(order)
                .bind(reason)
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let Some(settled) = settled else {
            return Ok(None);
        };

        match settlement {
            PaymentSettlement::Completed { rewards, note, .. } => {
                if settled.status != FulfillmentStatus::Cancelled {
                    grant_rewards(&mut tx, settled.id, settled.customer_id, *rewards).await?;
                    sqlx::query("DELETE FROM cart_item WHERE customer_id = $1")
                        .bind(settled.customer_id)
                        .execute(&mut *tx)
                        .await?;
                }
                append_history(&mut tx, settled.id, settled.status, note).await?;
            }
            PaymentSettlement::Failed { note, .. } => {
                append_history(&mut tx, settled.id, settled.status, note).await?;
            }
        }

        tx.commit().await?;
        Ok(Some(settled))
    }

    #[instrument(skip(self, change), fields(order_id = %change.order_id, to = %change.new_status))]
    async fn change_status(&self, change: &StatusChange) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Order>(concat!(
            "UPDATE customer_order
             SET status = $3,
                 delivered_at = CASE WHEN $3 = 'delivered'::fulfillment_status
                                     THEN NOW() ELSE delivered_at END,
                 cancellation_reason = COALESCE($4, cancellation_reason),
                 updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING ",
            order_columns!()
        ))
        .bind(change.order_id)
        .bind(change.expected)
        .bind(change.new_status)
        .bind(change.cancellation_reason.as_deref())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(updated) = updated else {
            return Ok(None);
        };

        append_history(&mut tx, updated.id, updated.status, &change.note).await?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn record_rating(
        &self,
        order: OrderId,
        rating: i16,
        review: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let rated = sqlx::query_as::<_, Order>(concat!(
            "UPDATE customer_order
             SET rating = $2, review = $3, updated_at = NOW()
             WHERE id = $1 AND status = 'delivered' AND rating IS NULL
             RETURNING ",
            order_columns!()
        ))
        .bind(order)
        .bind(rating)
        .bind(review)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rated)
    }

    async fn stale_processing_orders(
        &self,
        placed_before: DateTime<Utc>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM customer_order
              WHERE payment_status = 'processing' AND created_at < $1
              ORDER BY created_at"
        ))
        .bind(placed_before)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn loyalty_points(&self, customer: CustomerId) -> Result<i64, RepositoryError> {
        sqlx::query_scalar::<_, i64>("SELECT loyalty_points FROM customer WHERE id = $1")
            .bind(customer)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }
}
