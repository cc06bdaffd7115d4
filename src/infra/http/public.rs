use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use serde::Serialize;

use crate::{
    application::{catalog::CatalogService, inventory::InventoryService},
    cache::{Cached, StatsProbe, StockBroadcaster},
    domain::{entities::NewOrder, listing::ListQuery, types::ProductId},
};

use super::{
    cache_health_response,
    error::ApiError,
    middleware::{CacheOutcome, log_responses, set_request_context},
    models::{AppliedBody, ProductListParams},
    stream,
};

#[derive(Clone)]
pub struct HttpState {
    pub catalog: Arc<CatalogService>,
    pub inventory: Arc<InventoryService>,
    pub broadcaster: StockBroadcaster,
    pub stats: Arc<StatsProbe>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/products/featured", get(featured_products))
        .route("/api/products/{id}", get(product_detail))
        .route("/api/products/{id}/stock", get(product_stock))
        .route("/api/products/{id}/events", get(stream::product_events))
        .route("/api/events/stock", get(stream::stock_events))
        .route("/api/categories", get(categories))
        .route("/api/orders", post(place_order))
        .route("/_health/cache", get(cache_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn list_products(
    State(state): State<HttpState>,
    Query(params): Query<ProductListParams>,
) -> Result<Response, ApiError> {
    let page = state.catalog.list_products(ListQuery::from(params)).await?;
    Ok(cached_json(page))
}

async fn featured_products(State(state): State<HttpState>) -> Result<Response, ApiError> {
    let featured = state.catalog.featured_products().await?;
    Ok(cached_json(featured))
}

async fn product_detail(
    State(state): State<HttpState>,
    Path(id): Path<ProductId>,
) -> Result<Response, ApiError> {
    let detail = state.catalog.product_detail(id).await?;
    Ok(cached_json(detail))
}

async fn product_stock(
    State(state): State<HttpState>,
    Path(id): Path<ProductId>,
) -> Result<Response, ApiError> {
    let level = state.catalog.stock_level(id).await?;
    Ok(cached_json(level))
}

async fn categories(State(state): State<HttpState>) -> Result<Response, ApiError> {
    let categories = state.catalog.categories().await?;
    Ok(cached_json(categories))
}

async fn place_order(
    State(state): State<HttpState>,
    Json(order): Json<NewOrder>,
) -> Result<Response, ApiError> {
    let applied = state.inventory.place_order(order).await?;
    Ok((StatusCode::CREATED, Json(AppliedBody::from(applied))).into_response())
}

async fn cache_health(State(state): State<HttpState>) -> Response {
    cache_health_response(&state.stats).await
}

fn cached_json<T: Serialize>(value: Cached<T>) -> Response {
    let outcome = CacheOutcome::from_cached(value.cached);
    let mut response = Json(value).into_response();
    response.extensions_mut().insert(outcome);
    response
}
