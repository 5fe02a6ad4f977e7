//! Recorded provider transactions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_provider", rename_all = "snake_case")]
pub enum PaymentProvider {
    Mercadopago,
    Stripe,
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mercadopago => f.write_str("mercadopago"),
            Self::Stripe => f.write_str("stripe"),
        }
    }
}

/// One row per recorded provider transaction. Created at most once per
/// (provider, provider_payment_id); the table constraint enforces it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: PaymentProvider,
    pub provider_payment_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
