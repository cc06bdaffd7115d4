use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};

use crate::domain::entities::{CategoryUpdate, ProductUpdate};
use crate::domain::types::{CategoryId, OrderId, ProductId};

use super::super::error::ApiError;
use super::super::models::{AppliedBody, OrderStatusPayload, StockPayload};
use super::AdminState;

pub(super) async fn admin_product_update(
    State(state): State<AdminState>,
    Path(id): Path<ProductId>,
    Json(update): Json<ProductUpdate>,
) -> Result<Response, ApiError> {
    let applied = state.inventory.update_product(id, update).await?;
    Ok(Json(AppliedBody::from(applied)).into_response())
}

pub(super) async fn admin_product_delete(
    State(state): State<AdminState>,
    Path(id): Path<ProductId>,
) -> Result<Response, ApiError> {
    let applied = state.inventory.delete_product(id).await?;
    Ok(Json(AppliedBody::from(applied)).into_response())
}

pub(super) async fn admin_stock_set(
    State(state): State<AdminState>,
    Path(id): Path<ProductId>,
    Json(payload): Json<StockPayload>,
) -> Result<Response, ApiError> {
    let applied = state.inventory.set_stock(id, payload.quantity).await?;
    Ok(Json(AppliedBody::from(applied)).into_response())
}

pub(super) async fn admin_category_update(
    State(state): State<AdminState>,
    Path(id): Path<CategoryId>,
    Json(update): Json<CategoryUpdate>,
) -> Result<Response, ApiError> {
    let applied = state.inventory.update_category(id, update).await?;
    Ok(Json(AppliedBody::from(applied)).into_response())
}

pub(super) async fn admin_order_status(
    State(state): State<AdminState>,
    Path(id): Path<OrderId>,
    Json(payload): Json<OrderStatusPayload>,
) -> Result<Response, ApiError> {
    let applied = state
        .inventory
        .update_order_status(id, payload.status)
        .await?;
    Ok(Json(AppliedBody::from(applied)).into_response())
}
