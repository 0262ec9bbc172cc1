// src/handlers/order_handler.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
};
use tracing;

use crate::{
    errors::{SparrowError, SparrowResult},
    models::order::{ActiveDeliverySummary, LiveState, OrderSnapshot},
    state::AppState,
};

const FIRST_EVENT_WAIT: Duration = Duration::from_secs(5);

pub async fn list_orders(State(state): State<Arc<AppState>>) -> Json<LiveState<Vec<OrderSnapshot>>> {
    Json(state.order_feed.current())
}

pub async fn active_delivery(State(state): State<Arc<AppState>>) -> Json<Option<ActiveDeliverySummary>> {
    Json(state.order_feed.active_delivery())
}

/// Opens a short-lived feed on one order and returns whatever it settled
/// on. An order the source reports as absent is a 404.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> SparrowResult<Json<LiveState<Option<OrderSnapshot>>>> {
    if order_id.trim().is_empty() {
        return Err(SparrowError::bad_request("order id must not be empty"));
    }

    let mut feed = state.orders.subscribe_one(Some(order_id.as_str())).await;
    let live = match feed.settled(FIRST_EVENT_WAIT).await {
        Ok(live) => live,
        Err(SparrowError::NetworkTimeout) => {
            tracing::warn!("Order {} produced no event within {:?}", order_id, FIRST_EVENT_WAIT);
            feed.current()
        }
        Err(e) => return Err(e),
    };
    feed.cancel();

    if !live.loading && live.error.is_none() && live.data.is_none() {
        return Err(SparrowError::order_not_found(order_id));
    }
    Ok(Json(live))
}
