use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::info;

use super::super::{cache_health_response, models::AppliedBody};
use super::AdminState;

#[derive(Debug, Serialize)]
struct ClearedBody {
    deleted: usize,
}

pub(super) async fn cache_stats(State(state): State<AdminState>) -> Response {
    Json(state.stats.snapshot().await).into_response()
}

pub(super) async fn clear_cache(State(state): State<AdminState>) -> Response {
    state.registry.clear();
    let deleted = state.cache.clear_all().await;
    info!(deleted, "Cache cleared by operator");
    Json(ClearedBody { deleted }).into_response()
}

pub(super) async fn clear_product_views(State(state): State<AdminState>) -> Response {
    let applied = state.inventory.clear_product_views().await;
    Json(AppliedBody::from(applied)).into_response()
}

pub(super) async fn warm_cache(State(state): State<AdminState>) -> Response {
    Json(state.catalog.warm().await).into_response()
}

pub(super) async fn cache_health(State(state): State<AdminState>) -> Response {
    cache_health_response(&state.stats).await
}
