//! Environment-driven configuration, read once at startup.

use anyhow::Context;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub currency: String,
    /// Shipping is free once the subtotal reaches this amount.
    pub free_shipping_threshold: Decimal,
    /// Secret for verifying `Stripe-Signature` headers. Unset means the
    /// Stripe webhook endpoint rejects everything as misconfigured.
    pub stripe_webhook_secret: Option<String>,
    /// Access token for fetching payment details from MercadoPago.
    pub mercadopago_access_token: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse()
            .context("PORT must be a number")?;
        let currency = std::env::var("CURRENCY").unwrap_or_else(|_| "USD".to_string());
        let free_shipping_threshold = std::env::var("FREE_SHIPPING_THRESHOLD")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("FREE_SHIPPING_THRESHOLD must be a decimal amount")?
            .unwrap_or_else(|| Decimal::from(2500));
        Ok(Self {
            database_url,
            port,
            currency,
            free_shipping_threshold,
            stripe_webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
            mercadopago_access_token: std::env::var("MERCADOPAGO_ACCESS_TOKEN").ok(),
        })
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            port: 0,
            currency: "USD".to_string(),
            free_shipping_threshold: Decimal::from(2500),
            stripe_webhook_secret: None,
            mercadopago_access_token: None,
        }
    }
}
