//! Checkout submission: validates the cart, prices it against the live
//! catalog, and creates the order aggregate in `pending`/`pending`.
//!
//! Inventory and discount usage are not committed here; the payment
//! confirmation webhook is the commitment point (see `webhooks`). Checkout
//! still validates stock so oversells fail before an order exists.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::ApiError;
use crate::pricing;
use crate::store::{CommerceStore, NewOrder, NewOrderItem};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub address_id: Uuid,
    /// Injected by the session layer upstream; absent for guest checkout.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, message = "shipping method is required"))]
    pub shipping_method: String,
    #[validate(length(min = 1, message = "cart is empty"))]
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub discount_code: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub variant_name: String,
    pub quantity: u32,
    /// Advisory only; the catalog price at quote time is authoritative.
    #[serde(default)]
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_id: Uuid,
    pub order_number: String,
    pub total: Decimal,
}

pub async fn checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let response = place_order(state.store.as_ref(), &state.config, req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn place_order(
    store: &dyn CommerceStore,
    config: &Config,
    req: CheckoutRequest,
) -> Result<CheckoutResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    if req.items.iter().any(|i| i.quantity == 0) {
        return Err(ApiError::Validation("item quantity must be at least 1".into()));
    }

    let address = store
        .address(req.user_id, req.address_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("address".into()))?;

    let mut lines = Vec::with_capacity(req.items.len());
    for item in &req.items {
        let variant = store
            .resolve_variant(item.product_id, &item.variant_name)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "product {} variant {:?}",
                    item.product_id, item.variant_name
                ))
            })?;
        lines.push((variant, item.quantity));
    }

    let discount = match req.discount_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            let found = store.discount_by_code(code).await?;
            if found.is_none() {
                // fail open: an unknown code never blocks checkout
                debug!(code, "unknown discount code ignored");
            }
            found
        }
        _ => None,
    };

    let quote = pricing::quote(
        lines,
        &req.shipping_method,
        discount.as_ref(),
        config.free_shipping_threshold,
        Utc::now(),
    )
    .map_err(|e| ApiError::Validation(e.to_string()))?;

    let order_number = generate_order_number();
    let items = quote
        .lines
        .iter()
        .map(|line| NewOrderItem {
            product_id: line.variant.product_id,
            variant_id: line.variant.variant_id,
            product_name: line.variant.product_name.clone(),
            variant_name: line.variant.variant_name.clone(),
            sku: line.variant.sku.clone(),
            unit_price: line.variant.unit_price,
            quantity: line.quantity as i32,
            line_total: line.line_total,
            image_url: line.variant.image_url.clone(),
        })
        .collect();

    let order = store
        .create_order(NewOrder {
            order_number: order_number.clone(),
            user_id: req.user_id,
            subtotal: quote.subtotal,
            shipping_total: quote.shipping_total,
            discount_total: quote.discount_total,
            total: quote.total,
            currency: config.currency.clone(),
            shipping_method: req.shipping_method.clone(),
            shipping_address: address.snapshot(),
            discount_id: quote.discount_id,
            items,
        })
        .await?;

    info!(order_number = %order.order_number, total = %order.total, "order created");
    Ok(CheckoutResponse {
        success: true,
        order_id: order.id,
        order_number: order.order_number,
        total: order.total,
    })
}

const ORDER_NUMBER_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Human-readable order number: `ORD-` + base32 timestamp token + 4 random
/// characters. The unique column constraint backstops the negligible
/// collision chance.
pub fn generate_order_number() -> String {
    let mut token = Vec::new();
    let mut ts = Utc::now().timestamp() as u64;
    while ts > 0 {
        token.push(ORDER_NUMBER_ALPHABET[(ts % 32) as usize]);
        ts /= 32;
    }
    token.reverse();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| ORDER_NUMBER_ALPHABET[rng.gen_range(0..ORDER_NUMBER_ALPHABET.len())] as char)
        .collect();
    format!("ORD-{}{}", String::from_utf8_lossy(&token), suffix)
}
