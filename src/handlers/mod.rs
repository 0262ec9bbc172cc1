// src/handlers/mod.rs
pub mod notification_handler;
pub mod order_handler;
pub mod source_handler;
pub mod zone_handler;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post, put},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/health", get(health))
        .route("/zone/check", get(zone_handler::check_zone))
        .route("/orders", get(order_handler::list_orders))
        .route("/orders/active", get(order_handler::active_delivery))
        .route(
            "/orders/:id",
            get(order_handler::get_order)
                .put(source_handler::upsert_order)
                .delete(source_handler::remove_order),
        )
        .route("/geofence", put(source_handler::publish_geofence))
        .route(
            "/notifications",
            get(notification_handler::list_notifications).post(notification_handler::show_notification),
        )
        .route("/notifications/permission", post(notification_handler::request_permission))
        .route("/notifications/:id/click", post(notification_handler::click_notification))
        .route("/push", post(notification_handler::receive_push))
        .route(
            "/windows",
            get(notification_handler::list_windows).post(notification_handler::open_window),
        )
        .layer(cors)
        .with_state(state)
}
