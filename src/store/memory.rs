//! In-memory [`CommerceStore`] used by the test suite. Mirrors the Postgres
//! guards (unique payment ids, single stock commit, single redemption per
//! order) so idempotency behavior can be asserted without a database.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    Address, Discount, DiscountUsage, Order, OrderItem, OrderStatus, OrderStatusHistory, Payment,
    PaymentProvider, PaymentStatus, Product, ProductVariant, ResolvedVariant,
};

use super::{
    CommerceStore, NewDiscountUsage, NewOrder, NewPayment, Page, PaymentInsert,
    PaymentTransition, StoreError,
};

#[derive(Default)]
struct Inner {
    variants: Vec<ResolvedVariant>,
    addresses: Vec<Address>,
    discounts: Vec<Discount>,
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    history: Vec<OrderStatusHistory>,
    payments: Vec<Payment>,
    usages: Vec<DiscountUsage>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_variant(&self, variant: ResolvedVariant) {
        self.inner.lock().unwrap().variants.push(variant);
    }

    pub fn seed_address(&self, address: Address) {
        self.inner.lock().unwrap().addresses.push(address);
    }

    pub fn seed_discount(&self, discount: Discount) {
        self.inner.lock().unwrap().discounts.push(discount);
    }

    pub fn stock_of(&self, variant_id: Uuid) -> i32 {
        self.inner
            .lock()
            .unwrap()
            .variants
            .iter()
            .find(|v| v.variant_id == variant_id)
            .map(|v| v.stock_quantity)
            .unwrap_or(0)
    }

    pub fn order_count(&self) -> usize {
        self.inner.lock().unwrap().orders.len()
    }

    pub fn payment_count(&self) -> usize {
        self.inner.lock().unwrap().payments.len()
    }

    pub fn usage_count(&self) -> usize {
        self.inner.lock().unwrap().usages.len()
    }

    pub fn discount_usage_counter(&self, discount_id: Uuid) -> i32 {
        self.inner
            .lock()
            .unwrap()
            .discounts
            .iter()
            .find(|d| d.id == discount_id)
            .map(|d| d.usage_count)
            .unwrap_or(0)
    }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    async fn resolve_variant(
        &self,
        product_id: Uuid,
        variant_name: &str,
    ) -> Result<Option<ResolvedVariant>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .variants
            .iter()
            .find(|v| v.product_id == product_id && v.variant_name == variant_name)
            .cloned())
    }

    async fn list_products(&self, _page: Page) -> Result<(Vec<Product>, i64), StoreError> {
        Ok((vec![], 0))
    }

    async fn product(
        &self,
        _id: Uuid,
    ) -> Result<Option<(Product, Vec<ProductVariant>)>, StoreError> {
        Ok(None)
    }

    async fn address(
        &self,
        user_id: Option<Uuid>,
        address_id: Uuid,
    ) -> Result<Option<Address>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .addresses
            .iter()
            .find(|a| a.id == address_id && (user_id.is_none() || a.user_id == user_id))
            .cloned())
    }

    async fn discount_by_code(&self, code: &str) -> Result<Option<Discount>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .discounts
            .iter()
            .find(|d| d.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn redeem_discount(&self, usage: NewDiscountUsage) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let already = inner
            .usages
            .iter()
            .any(|u| u.discount_id == usage.discount_id && u.order_id == usage.order_id);
        if already {
            return Ok(false);
        }
        inner.usages.push(DiscountUsage {
            id: Uuid::now_v7(),
            discount_id: usage.discount_id,
            order_id: usage.order_id,
            user_id: usage.user_id,
            amount_saved: usage.amount_saved,
            created_at: Utc::now(),
        });
        if let Some(d) = inner.discounts.iter_mut().find(|d| d.id == usage.discount_id) {
            d.usage_count += 1;
        }
        Ok(true)
    }

    async fn create_order(&self, new_order: NewOrder) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let order = Order {
            id: Uuid::now_v7(),
            order_number: new_order.order_number.clone(),
            user_id: new_order.user_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            subtotal: new_order.subtotal,
            shipping_total: new_order.shipping_total,
            discount_total: new_order.discount_total,
            total: new_order.total,
            currency: new_order.currency.clone(),
            shipping_method: new_order.shipping_method.clone(),
            shipping_address: new_order.shipping_address.clone(),
            discount_id: new_order.discount_id,
            stock_committed_at: None,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        for item in &new_order.items {
            inner.items.push(OrderItem {
                id: Uuid::now_v7(),
                order_id: order.id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                product_name: item.product_name.clone(),
                variant_name: item.variant_name.clone(),
                sku: item.sku.clone(),
                unit_price: item.unit_price,
                quantity: item.quantity,
                line_total: item.line_total,
                image_url: item.image_url.clone(),
            });
        }
        inner.history.push(OrderStatusHistory {
            id: Uuid::now_v7(),
            order_id: order.id,
            status: OrderStatus::Pending,
            previous_status: None,
            changed_by: "checkout".into(),
            note: Some(format!("order {} created", order.order_number)),
            created_at: now,
        });
        inner.orders.push(order.clone());
        Ok(order)
    }

    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn order_by_number(&self, number: &str) -> Result<Option<Order>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.order_number == number)
            .cloned())
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn order_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_orders(&self, _page: Page) -> Result<(Vec<Order>, i64), StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok((inner.orders.clone(), inner.orders.len() as i64))
    }

    async fn transition_order(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        changed_by: &str,
        note: Option<String>,
    ) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let previous;
        let updated;
        {
            let order = inner
                .orders
                .iter_mut()
                .find(|o| o.id == order_id)
                .ok_or(StoreError::OrderNotFound)?;
            if !order.status.can_transition(to) {
                return Err(StoreError::InvalidTransition {
                    from: order.status,
                    to,
                });
            }
            previous = order.status;
            order.status = to;
            order.updated_at = now;
            match to {
                OrderStatus::Confirmed => order.confirmed_at = Some(now),
                OrderStatus::Shipped => order.shipped_at = Some(now),
                OrderStatus::Delivered => order.delivered_at = Some(now),
                OrderStatus::Cancelled => order.cancelled_at = Some(now),
                _ => {}
            }
            updated = order.clone();
        }
        inner.history.push(OrderStatusHistory {
            id: Uuid::now_v7(),
            order_id,
            status: to,
            previous_status: Some(previous),
            changed_by: changed_by.into(),
            note,
            created_at: now,
        });
        Ok(updated)
    }

    async fn payment_by_provider_id(
        &self,
        provider: PaymentProvider,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .iter()
            .find(|p| p.provider == provider && p.provider_payment_id == provider_payment_id)
            .cloned())
    }

    async fn insert_payment(&self, new: NewPayment) -> Result<PaymentInsert, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let duplicate = inner
            .payments
            .iter()
            .any(|p| p.provider == new.provider && p.provider_payment_id == new.provider_payment_id);
        if duplicate {
            return Ok(PaymentInsert::Duplicate);
        }
        let payment = Payment {
            id: Uuid::now_v7(),
            order_id: new.order_id,
            provider: new.provider,
            provider_payment_id: new.provider_payment_id,
            amount: new.amount,
            currency: new.currency,
            status: new.status,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        inner.payments.push(payment.clone());
        Ok(PaymentInsert::Created(payment))
    }

    async fn commit_stock(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        {
            let order = inner
                .orders
                .iter_mut()
                .find(|o| o.id == order_id)
                .ok_or(StoreError::OrderNotFound)?;
            if order.stock_committed_at.is_some() {
                return Ok(false);
            }
            order.stock_committed_at = Some(now);
        }
        let decrements: Vec<(Uuid, i32)> = inner
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .map(|i| (i.variant_id, i.quantity))
            .collect();
        for (variant_id, quantity) in decrements {
            if let Some(v) = inner
                .variants
                .iter_mut()
                .find(|v| v.variant_id == variant_id)
            {
                v.stock_quantity -= quantity;
            }
        }
        Ok(true)
    }

    async fn apply_payment_transition(
        &self,
        order_id: Uuid,
        transition: PaymentTransition,
    ) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let previous;
        let updated;
        {
            let order = inner
                .orders
                .iter_mut()
                .find(|o| o.id == order_id)
                .ok_or(StoreError::OrderNotFound)?;
            previous = order.status;
            order.payment_status = transition.payment_status;
            if let Some(status) = transition.order_status {
                order.status = status;
            }
            if transition.stamp_confirmed && order.confirmed_at.is_none() {
                order.confirmed_at = Some(now);
            }
            order.updated_at = now;
            updated = order.clone();
        }
        inner.history.push(OrderStatusHistory {
            id: Uuid::now_v7(),
            order_id,
            status: updated.status,
            previous_status: Some(previous),
            changed_by: transition.changed_by,
            note: Some(transition.note),
            created_at: now,
        });
        Ok(updated)
    }
}
