//! Server-sent stock updates.
//!
//! Each connection owns one [`Subscription`]; dropping the response stream on
//! disconnect drops the subscription and revokes its interest.

use std::convert::Infallible;
use std::time::Duration;

use async_stream::stream;
use axum::{
    extract::{Path, State},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use tracing::{debug, warn};

use crate::cache::Subscription;
use crate::domain::types::ProductId;

use super::public::HttpState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const STOCK_EVENT: &str = "stock_update";

pub(super) async fn product_events(
    State(state): State<HttpState>,
    Path(id): Path<ProductId>,
) -> Response {
    debug!(product_id = id, "Stock subscription opened");
    subscription_response(state.broadcaster.subscribe(id))
}

pub(super) async fn stock_events(State(state): State<HttpState>) -> Response {
    debug!("Global stock subscription opened");
    subscription_response(state.broadcaster.subscribe_all())
}

fn subscription_response(mut subscription: Subscription) -> Response {
    let stream = stream! {
        while let Some(update) = subscription.recv().await {
            match Event::default().event(STOCK_EVENT).json_data(&update) {
                Ok(event) => yield Ok::<Event, Infallible>(event),
                Err(err) => warn!(
                    product_id = update.product_id,
                    error = %err,
                    "Stock update could not be encoded"
                ),
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response()
}
