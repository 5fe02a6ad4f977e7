//! Order aggregate rows and status state machines.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Forward flow is pending -> confirmed/processing -> shipped -> delivered;
    /// cancelled is reachable from early states, refunded from late ones.
    pub fn can_transition(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Pending => matches!(to, Confirmed | Processing | Cancelled),
            Confirmed => matches!(to, Processing | Shipped | Cancelled),
            Processing => matches!(to, Shipped | Cancelled),
            Shipped => matches!(to, Delivered | Refunded),
            Delivered => matches!(to, Refunded),
            Cancelled | Refunded => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition(self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        match self {
            Pending => matches!(to, Paid | Failed | Refunded),
            Paid => matches!(to, Refunded),
            Failed | Refunded => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub shipping_total: Decimal,
    pub discount_total: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub shipping_method: String,
    pub shipping_address: serde_json::Value,
    pub discount_id: Option<Uuid>,
    pub stock_committed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of a purchased line, decoupled from the live catalog.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
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

/// Append-only audit trail entry. Never mutated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub previous_status: Option<OrderStatus>,
    pub changed_by: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_forward_flow() {
        assert!(OrderStatus::Pending.can_transition(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition(OrderStatus::Delivered));
        assert!(!OrderStatus::Delivered.can_transition(OrderStatus::Pending));
        assert!(!OrderStatus::Cancelled.can_transition(OrderStatus::Processing));
    }

    #[test]
    fn cancelled_only_from_early_states() {
        assert!(OrderStatus::Pending.can_transition(OrderStatus::Cancelled));
        assert!(OrderStatus::Processing.can_transition(OrderStatus::Cancelled));
        assert!(!OrderStatus::Shipped.can_transition(OrderStatus::Cancelled));
    }

    #[test]
    fn payment_status_guards() {
        assert!(PaymentStatus::Pending.can_transition(PaymentStatus::Paid));
        assert!(PaymentStatus::Paid.can_transition(PaymentStatus::Refunded));
        // a late "rejected" must not clobber a paid order
        assert!(!PaymentStatus::Paid.can_transition(PaymentStatus::Failed));
        assert!(!PaymentStatus::Refunded.can_transition(PaymentStatus::Paid));
    }
}
