//! Stripe webhook (provider B).
//!
//! The raw body is verified against the `Stripe-Signature` header
//! (HMAC-SHA256 over `"{timestamp}.{body}"`, 5 minute replay tolerance)
//! before parsing. Signature problems are the one case a webhook endpoint
//! answers 400; once an event is accepted the response is always 200.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::PaymentProvider;
use crate::error::ApiError;
use crate::AppState;

use super::{reconcile, PaymentNotice, PaymentSignal};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    StaleTimestamp,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies `t=<unix>,v1=<hex>` headers. Any one matching `v1` entry passes;
/// Stripe sends several during secret rotation.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_ts: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse().map_err(|_| SignatureError::Malformed)?);
            }
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now_ts - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    let ts_prefix = timestamp.to_string();
    for candidate in candidates {
        let Ok(signature) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(ts_prefix.as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&signature).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: StripeObject,
}

#[derive(Debug, Deserialize)]
pub struct StripeObject {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Minor units (cents) on checkout sessions.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Minor units on payment intents.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Maps a typed event onto a reconciliation notice. Unhandled event types
/// and events without an order reference return `None`.
pub fn notice_from_event(event: &StripeEvent) -> Option<PaymentNotice> {
    let signal = match event.kind.as_str() {
        "checkout.session.completed" => PaymentSignal::Approved,
        "checkout.session.expired" | "payment_intent.payment_failed" => PaymentSignal::Failed,
        _ => return None,
    };
    let object = &event.data.object;
    let Some(reference) = object
        .client_reference_id
        .clone()
        .or_else(|| object.metadata.get("order_id").cloned())
    else {
        warn!(event = %event.kind, object = %object.id, "stripe event carries no order reference");
        return None;
    };
    let minor_units = object.amount_total.or(object.amount).unwrap_or(0);
    Some(PaymentNotice {
        provider: PaymentProvider::Stripe,
        provider_payment_id: object
            .payment_intent
            .clone()
            .unwrap_or_else(|| object.id.clone()),
        signal,
        external_reference: reference,
        amount: Decimal::new(minor_units, 2),
        currency: object
            .currency
            .clone()
            .unwrap_or_else(|| "usd".into())
            .to_uppercase(),
        metadata: json!({ "event": event.kind }),
    })
}

pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::Provider("stripe webhook secret not configured".into()))?;
    let header = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Provider("missing stripe-signature header".into()))?;
    verify_signature(&body, header, secret, Utc::now().timestamp())
        .map_err(|e| ApiError::Provider(e.to_string()))?;
    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Provider(format!("malformed webhook payload: {e}")))?;

    // accepted: from here on the provider always gets a success response
    match notice_from_event(&event) {
        Some(notice) => {
            if let Err(e) = reconcile(state.store.as_ref(), notice).await {
                error!(error = %e, event = %event.kind, "stripe reconciliation failed");
            }
        }
        None => debug!(event = %event.kind, "ignored stripe event type"),
    }
    Ok(Json(json!({ "received": true })))
}
