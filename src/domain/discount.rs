//! Discount codes and redemption records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "discount_type", rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
    FreeShipping,
    BuyXGetY,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Discount {
    pub id: Uuid,
    pub code: String,
    pub kind: DiscountType,
    pub value: Decimal,
    pub maximum_discount: Option<Decimal>,
    pub buy_quantity: Option<i32>,
    pub get_quantity: Option<i32>,
    pub usage_count: i32,
    pub usage_limit: Option<i32>,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Why a code cannot be applied right now. Callers treat any of these as
/// "no discount" (fail-open), they exist so the skip can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inapplicable {
    Inactive,
    NotStarted,
    Expired,
    LimitReached,
}

impl Discount {
    /// Checks the validity window `[starts_at, expires_at)` and usage counters.
    pub fn applicability(&self, now: DateTime<Utc>) -> Result<(), Inapplicable> {
        if !self.is_active {
            return Err(Inapplicable::Inactive);
        }
        if let Some(starts) = self.starts_at {
            if now < starts {
                return Err(Inapplicable::NotStarted);
            }
        }
        if let Some(expires) = self.expires_at {
            if now >= expires {
                return Err(Inapplicable::Expired);
            }
        }
        if let Some(limit) = self.usage_limit {
            if self.usage_count >= limit {
                return Err(Inapplicable::LimitReached);
            }
        }
        Ok(())
    }
}

/// One row per order where a discount was actually redeemed; the unique
/// (discount_id, order_id) pair is the double-counting guard.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DiscountUsage {
    pub id: Uuid,
    pub discount_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub amount_saved: Decimal,
    pub created_at: DateTime<Utc>,
}
