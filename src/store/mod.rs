//! Persistence seam.
//!
//! All shared state lives in the database; every coordination point (payment
//! idempotency, stock commitment, discount redemption) is a constraint or
//! conditional write here, never an in-process lock. Components receive the
//! store as an injected handle rather than reaching for a global.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Address, Discount, Order, OrderItem, OrderStatus, OrderStatusHistory, Payment,
    PaymentProvider, PaymentStatus, Product, ProductVariant, ResolvedVariant,
};

pub mod pg;
pub use pg::PgStore;

#[cfg(test)]
pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("order not found")]
    OrderNotFound,
    #[error("cannot transition order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        ((self.page - 1) * self.per_page) as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub subtotal: Decimal,
    pub shipping_total: Decimal,
    pub discount_total: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub shipping_method: String,
    pub shipping_address: Value,
    pub discount_id: Option<Uuid>,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: Uuid,
    pub provider: PaymentProvider,
    pub provider_payment_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub metadata: Value,
}

/// Outcome of an idempotent payment insert.
#[derive(Debug)]
pub enum PaymentInsert {
    Created(Payment),
    /// A row for this (provider, provider_payment_id) already exists.
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct NewDiscountUsage {
    pub discount_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub amount_saved: Decimal,
}

/// Payment-driven order update, applied together with its history entry in
/// one transaction.
#[derive(Debug, Clone)]
pub struct PaymentTransition {
    pub payment_status: PaymentStatus,
    pub order_status: Option<OrderStatus>,
    pub stamp_confirmed: bool,
    pub changed_by: String,
    pub note: String,
}

#[async_trait]
pub trait CommerceStore: Send + Sync {
    // catalog
    async fn resolve_variant(
        &self,
        product_id: Uuid,
        variant_name: &str,
    ) -> Result<Option<ResolvedVariant>, StoreError>;
    async fn list_products(&self, page: Page) -> Result<(Vec<Product>, i64), StoreError>;
    async fn product(&self, id: Uuid) -> Result<Option<(Product, Vec<ProductVariant>)>, StoreError>;

    // customer data
    async fn address(
        &self,
        user_id: Option<Uuid>,
        address_id: Uuid,
    ) -> Result<Option<Address>, StoreError>;

    // discounts
    async fn discount_by_code(&self, code: &str) -> Result<Option<Discount>, StoreError>;
    /// Increments the usage counter and writes the usage row; returns false
    /// when this order already redeemed the discount.
    async fn redeem_discount(&self, usage: NewDiscountUsage) -> Result<bool, StoreError>;

    // orders
    async fn create_order(&self, new_order: NewOrder) -> Result<Order, StoreError>;
    async fn order_by_id(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn order_by_number(&self, number: &str) -> Result<Option<Order>, StoreError>;
    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError>;
    async fn order_history(&self, order_id: Uuid) -> Result<Vec<OrderStatusHistory>, StoreError>;
    async fn list_orders(&self, page: Page) -> Result<(Vec<Order>, i64), StoreError>;
    /// Admin-driven status change; validates the transition, stamps the
    /// matching timestamp and appends a history entry.
    async fn transition_order(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        changed_by: &str,
        note: Option<String>,
    ) -> Result<Order, StoreError>;

    // payment reconciliation
    async fn payment_by_provider_id(
        &self,
        provider: PaymentProvider,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, StoreError>;
    async fn insert_payment(&self, new: NewPayment) -> Result<PaymentInsert, StoreError>;
    /// Decrements each line's variant stock exactly once per order. Returns
    /// false when stock was already committed for this order.
    async fn commit_stock(&self, order_id: Uuid) -> Result<bool, StoreError>;
    async fn apply_payment_transition(
        &self,
        order_id: Uuid,
        transition: PaymentTransition,
    ) -> Result<Order, StoreError>;
}
