//! MercadoPago webhook (provider A).
//!
//! Deliveries carry only a payment id; the handler fetches the full payment
//! from the provider before acting. The endpoint always answers 200
//! `{"received": true}` so the provider stops retrying.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::domain::PaymentProvider;
use crate::AppState;

use super::{reconcile, PaymentNotice, PaymentSignal};

#[derive(Debug, Deserialize)]
pub struct MercadoPagoWebhook {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub id: Value,
}

#[derive(Debug, Deserialize)]
pub struct MercadoPagoPayment {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub transaction_amount: Decimal,
    #[serde(default)]
    pub currency_id: String,
}

#[derive(Clone)]
pub struct MercadoPagoClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MercadoPagoClient {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, "https://api.mercadopago.com")
    }

    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    pub async fn payment(&self, id: &str) -> Result<MercadoPagoPayment, reqwest::Error> {
        self.http
            .get(format!("{}/v1/payments/{}", self.base_url, id))
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

pub fn map_status(status: &str) -> PaymentSignal {
    match status {
        "approved" => PaymentSignal::Approved,
        "pending" | "in_process" | "in_mediation" | "authorized" => PaymentSignal::StillPending,
        "rejected" | "cancelled" => PaymentSignal::Failed,
        "refunded" | "charged_back" => PaymentSignal::Refunded,
        other => PaymentSignal::Unrecognized(other.to_string()),
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn ack() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "received": true })))
}

pub async fn handle(
    State(state): State<AppState>,
    Json(body): Json<MercadoPagoWebhook>,
) -> (StatusCode, Json<Value>) {
    if body.kind.as_deref() != Some("payment") {
        debug!(kind = ?body.kind, action = ?body.action, "ignored mercadopago notification type");
        return ack();
    }
    let Some(payment_id) = body.data.as_ref().and_then(|d| id_string(&d.id)) else {
        warn!("mercadopago notification without payment id");
        return ack();
    };
    let Some(client) = state.mercadopago.clone() else {
        warn!("mercadopago access token not configured, notification dropped");
        return ack();
    };

    match client.payment(&payment_id).await {
        Ok(payment) => {
            let Some(reference) = payment.external_reference.clone() else {
                warn!(payment_id = payment.id, "mercadopago payment has no external reference");
                return ack();
            };
            let notice = PaymentNotice {
                provider: PaymentProvider::Mercadopago,
                provider_payment_id: payment.id.to_string(),
                signal: map_status(&payment.status),
                external_reference: reference,
                amount: payment.transaction_amount,
                currency: payment.currency_id.clone(),
                metadata: json!({ "status": payment.status }),
            };
            if let Err(e) = reconcile(state.store.as_ref(), notice).await {
                // acknowledged anyway; failing here would only trigger retries
                error!(error = %e, payment_id = payment.id, "mercadopago reconciliation failed");
            }
        }
        Err(e) => {
            error!(error = %e, payment_id = %payment_id, "failed to fetch mercadopago payment");
        }
    }
    ack()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_vocabulary_mapping() {
        assert_eq!(map_status("approved"), PaymentSignal::Approved);
        assert_eq!(map_status("pending"), PaymentSignal::StillPending);
        assert_eq!(map_status("in_process"), PaymentSignal::StillPending);
        assert_eq!(map_status("rejected"), PaymentSignal::Failed);
        assert_eq!(map_status("cancelled"), PaymentSignal::Failed);
        assert_eq!(map_status("refunded"), PaymentSignal::Refunded);
        assert_eq!(map_status("charged_back"), PaymentSignal::Refunded);
        assert_eq!(
            map_status("something_new"),
            PaymentSignal::Unrecognized("something_new".into())
        );
    }

    #[test]
    fn payment_id_accepts_number_or_string() {
        assert_eq!(id_string(&json!(12345)), Some("12345".into()));
        assert_eq!(id_string(&json!("12345")), Some("12345".into()));
        assert_eq!(id_string(&json!({})), None);
    }

    #[test]
    fn webhook_body_parses_with_missing_fields() {
        let body: MercadoPagoWebhook = serde_json::from_str("{}").unwrap();
        assert!(body.kind.is_none());
        let body: MercadoPagoWebhook =
            serde_json::from_str(r#"{"type":"payment","action":"payment.updated","data":{"id":42}}"#)
                .unwrap();
        assert_eq!(body.kind.as_deref(), Some("payment"));
    }
}
