//! Storefront and back-office JSON endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{
    Order, OrderItem, OrderStatus, OrderStatusHistory, Product, ProductVariant,
};
use crate::error::ApiError;
use crate::store::Page;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListParams {
    fn page(&self) -> Page {
        Page {
            page: self.page.unwrap_or(1).max(1),
            per_page: self.per_page.unwrap_or(20).clamp(1, 100),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "storefront-api" }))
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Product>>, ApiError> {
    let page = params.page();
    let (data, total) = state.store.list_products(page).await?;
    Ok(Json(PaginatedResponse {
        data,
        total,
        page: page.page,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductDetail>, ApiError> {
    let (product, variants) = state
        .store
        .product(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("product".into()))?;
    Ok(Json(ProductDetail { product, variants }))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Order>>, ApiError> {
    let page = params.page();
    let (data, total) = state.store.list_orders(page).await?;
    Ok(Json(PaginatedResponse {
        data,
        total,
        page: page.page,
    }))
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderStatusHistory>,
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetail>, ApiError> {
    let order = state
        .store
        .order_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".into()))?;
    let items = state.store.order_items(id).await?;
    let history = state.store.order_history(id).await?;
    Ok(Json(OrderDetail {
        order,
        items,
        history,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub changed_by: Option<String>,
}

/// Back-office status change; every transition is validated and lands in the
/// order's history trail.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .store
        .transition_order(
            id,
            req.status,
            req.changed_by.as_deref().unwrap_or("admin"),
            req.note,
        )
        .await?;
    Ok(Json(order))
}
