mod cache;
mod catalog;
mod health;
mod state;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{get, patch, post, put},
};

use super::middleware::{log_responses, set_request_context};

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/products/{id}",
            patch(catalog::admin_product_update).delete(catalog::admin_product_delete),
        )
        .route("/products/{id}/stock", put(catalog::admin_stock_set))
        .route("/categories/{id}", patch(catalog::admin_category_update))
        .route("/orders/{id}/status", post(catalog::admin_order_status))
        .route("/cache/stats", get(cache::cache_stats))
        .route("/cache/clear", post(cache::clear_cache))
        .route("/cache/clear/products", post(cache::clear_product_views))
        .route("/cache/warm", post(cache::warm_cache))
        .route("/cache/health", get(cache::cache_health))
        .route("/health", get(health::admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
