mod admin;
pub mod error;
mod middleware;
pub mod models;
mod public;
mod stream;

pub use admin::{AdminState, build_admin_router};
pub use error::ApiError;
pub use public::{HttpState, build_router};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::cache::{HealthStatus, StatsProbe};

/// Cache health as JSON: 200 when healthy, 503 when degraded.
async fn cache_health_response(stats: &StatsProbe) -> Response {
    let health = stats.health_check().await;
    let status = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(health)).into_response()
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
