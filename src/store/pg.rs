//! Postgres implementation of [`CommerceStore`].
//!
//! Multi-row write units ("create order + items + history", "update order +
//! history") run inside a single transaction; the idempotency guards are the
//! unique constraints and the `stock_committed_at IS NULL` conditional update.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    Address, Discount, Order, OrderItem, OrderStatus, OrderStatusHistory, Payment,
    PaymentProvider, Product, ProductVariant, ResolvedVariant,
};

use super::{
    CommerceStore, NewDiscountUsage, NewOrder, NewPayment, Page, PaymentInsert,
    PaymentTransition, StoreError,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommerceStore for PgStore {
    async fn resolve_variant(
        &self,
        product_id: Uuid,
        variant_name: &str,
    ) -> Result<Option<ResolvedVariant>, StoreError> {
        let row = sqlx::query_as::<_, ResolvedVariant>(
            "SELECT p.id AS product_id, v.id AS variant_id, p.name AS product_name, \
             v.name AS variant_name, v.sku, v.price AS unit_price, v.stock_quantity, v.image_url \
             FROM products p JOIN product_variants v ON v.product_id = p.id \
             WHERE p.id = $1 AND v.name = $2 AND p.status = 'active'",
        )
        .bind(product_id)
        .bind(variant_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_products(&self, page: Page) -> Result<(Vec<Product>, i64), StoreError> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE status = 'active' ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM products WHERE status = 'active'")
                .fetch_one(&self.pool)
                .await?;
        Ok((products, total.0))
    }

    async fn product(
        &self,
        id: Uuid,
    ) -> Result<Option<(Product, Vec<ProductVariant>)>, StoreError> {
        let Some(product) = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let variants = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE product_id = $1 ORDER BY name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some((product, variants)))
    }

    async fn address(
        &self,
        user_id: Option<Uuid>,
        address_id: Uuid,
    ) -> Result<Option<Address>, StoreError> {
        let row = sqlx::query_as::<_, Address>(
            "SELECT * FROM addresses WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)",
        )
        .bind(address_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn discount_by_code(&self, code: &str) -> Result<Option<Discount>, StoreError> {
        let row =
            sqlx::query_as::<_, Discount>("SELECT * FROM discounts WHERE LOWER(code) = LOWER($1)")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn redeem_discount(&self, usage: NewDiscountUsage) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO discount_usages (id, discount_id, order_id, user_id, amount_saved, created_at) \
             VALUES ($1, $2, $3, $4, $5, NOW()) \
             ON CONFLICT (discount_id, order_id) DO NOTHING",
        )
        .bind(Uuid::now_v7())
        .bind(usage.discount_id)
        .bind(usage.order_id)
        .bind(usage.user_id)
        .bind(usage.amount_saved)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("UPDATE discounts SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(usage.discount_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn create_order(&self, new_order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (id, order_number, user_id, status, payment_status, subtotal, \
             shipping_total, discount_total, total, currency, shipping_method, shipping_address, \
             discount_id, created_at, updated_at) \
             VALUES ($1, $2, $3, 'pending', 'pending', $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW()) \
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new_order.order_number)
        .bind(new_order.user_id)
        .bind(new_order.subtotal)
        .bind(new_order.shipping_total)
        .bind(new_order.discount_total)
        .bind(new_order.total)
        .bind(&new_order.currency)
        .bind(&new_order.shipping_method)
        .bind(&new_order.shipping_address)
        .bind(new_order.discount_id)
        .fetch_one(&mut *tx)
        .await?;

        for item in &new_order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, variant_id, product_name, \
                 variant_name, sku, unit_price, quantity, line_total, image_url) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(Uuid::now_v7())
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.product_name)
            .bind(&item.variant_name)
            .bind(&item.sku)
            .bind(item.unit_price)
            .bind(item.quantity)
            .bind(item.line_total)
            .bind(&item.image_url)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO order_status_history (id, order_id, status, previous_status, changed_by, note, created_at) \
             VALUES ($1, $2, 'pending', NULL, 'checkout', $3, NOW())",
        )
        .bind(Uuid::now_v7())
        .bind(order.id)
        .bind(format!("order {} created", new_order.order_number))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn order_by_number(&self, number: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1")
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        let rows =
            sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
                .bind(order_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn order_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, StoreError> {
        let rows = sqlx::query_as::<_, OrderStatusHistory>(
            "SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_orders(&self, page: Page) -> Result<(Vec<Order>, i64), StoreError> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok((orders, total.0))
    }

    async fn transition_order(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        changed_by: &str,
        note: Option<String>,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let current =
            sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::OrderNotFound)?;
        if !current.status.can_transition(to) {
            return Err(StoreError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let sql = match to {
            OrderStatus::Confirmed => {
                "UPDATE orders SET status = $2, confirmed_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING *"
            }
            OrderStatus::Shipped => {
                "UPDATE orders SET status = $2, shipped_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING *"
            }
            OrderStatus::Delivered => {
                "UPDATE orders SET status = $2, delivered_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING *"
            }
            OrderStatus::Cancelled => {
                "UPDATE orders SET status = $2, cancelled_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING *"
            }
            _ => "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        };
        let updated = sqlx::query_as::<_, Order>(sql)
            .bind(order_id)
            .bind(to)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO order_status_history (id, order_id, status, previous_status, changed_by, note, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW())",
        )
        .bind(Uuid::now_v7())
        .bind(order_id)
        .bind(to)
        .bind(current.status)
        .bind(changed_by)
        .bind(note)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn payment_by_provider_id(
        &self,
        provider: PaymentProvider,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE provider = $1 AND provider_payment_id = $2",
        )
        .bind(provider)
        .bind(provider_payment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_payment(&self, new: NewPayment) -> Result<PaymentInsert, StoreError> {
        // ON CONFLICT DO NOTHING makes concurrent duplicate deliveries race-safe
        let row = sqlx::query_as::<_, Payment>(
            "INSERT INTO payments (id, order_id, provider, provider_payment_id, amount, currency, status, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) \
             ON CONFLICT (provider, provider_payment_id) DO NOTHING \
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(new.order_id)
        .bind(new.provider)
        .bind(&new.provider_payment_id)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(&new.status)
        .bind(&new.metadata)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match row {
            Some(payment) => PaymentInsert::Created(payment),
            None => PaymentInsert::Duplicate,
        })
    }

    async fn commit_stock(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            "UPDATE orders SET stock_committed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND stock_committed_at IS NULL",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if claimed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .fetch_all(&mut *tx)
            .await?;
        for item in &items {
            sqlx::query(
                "UPDATE product_variants SET stock_quantity = stock_quantity - $2 WHERE id = $1",
            )
            .bind(item.variant_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn apply_payment_transition(
        &self,
        order_id: Uuid,
        transition: PaymentTransition,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let current =
            sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::OrderNotFound)?;

        let new_status = transition.order_status.unwrap_or(current.status);
        let sql = if transition.stamp_confirmed {
            "UPDATE orders SET payment_status = $2, status = $3, confirmed_at = COALESCE(confirmed_at, NOW()), updated_at = NOW() \
             WHERE id = $1 RETURNING *"
        } else {
            "UPDATE orders SET payment_status = $2, status = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING *"
        };
        let updated = sqlx::query_as::<_, Order>(sql)
            .bind(order_id)
            .bind(transition.payment_status)
            .bind(new_status)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO order_status_history (id, order_id, status, previous_status, changed_by, note, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW())",
        )
        .bind(Uuid::now_v7())
        .bind(order_id)
        .bind(new_status)
        .bind(current.status)
        .bind(&transition.changed_by)
        .bind(&transition.note)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }
}
