//! Storefront order service.
//!
//! Checkout prices a cart against the live catalog and creates orders in
//! `pending`/`pending`; asynchronous payment-provider webhooks (MercadoPago,
//! Stripe) reconcile those orders, committing inventory and discount usage
//! exactly once per order. All shared state lives in Postgres; idempotency
//! is enforced by constraints and conditional writes, not in-process locks.

pub mod checkout;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod pricing;
pub mod store;
pub mod webhooks;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use store::CommerceStore;
use webhooks::mercadopago::MercadoPagoClient;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CommerceStore>,
    pub config: Arc<Config>,
    pub mercadopago: Option<Arc<MercadoPagoClient>>,
}

impl AppState {
    pub fn new(store: Arc<dyn CommerceStore>, config: Arc<Config>) -> Self {
        let mercadopago = config
            .mercadopago_access_token
            .as_ref()
            .map(|token| Arc::new(MercadoPagoClient::new(token.clone())));
        Self {
            store,
            config,
            mercadopago,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/products", get(handlers::list_products))
        .route("/api/v1/products/:id", get(handlers::get_product))
        .route("/api/v1/orders", get(handlers::list_orders))
        .route("/api/v1/orders/:id", get(handlers::get_order))
        .route(
            "/api/v1/orders/:id/status",
            post(handlers::update_order_status),
        )
        .route("/api/v1/checkout", post(checkout::checkout))
        .route(
            "/api/v1/webhooks/mercadopago",
            post(webhooks::mercadopago::handle),
        )
        .route("/api/v1/webhooks/stripe", post(webhooks::stripe::handle))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
