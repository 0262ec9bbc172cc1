// src/handlers/notification_handler.rs
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    errors::{SparrowError, SparrowResult},
    models::notification::{Notification, NotificationOptions, PushPayload},
    services::messaging_service::{ClickOutcome, NotificationCapability, WindowClient},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ShowNotificationRequest {
    pub title: String,
    #[serde(flatten)]
    pub options: NotificationOptions,
}

#[derive(Debug, Serialize)]
pub struct ShownNotification {
    pub id: String,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenWindowRequest {
    pub url: String,
}

pub async fn request_permission(State(state): State<Arc<AppState>>) -> Json<Value> {
    let granted = state.notifier.request_permission().await;
    Json(json!({ "granted": granted }))
}

pub async fn show_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ShowNotificationRequest>,
) -> SparrowResult<Json<Option<ShownNotification>>> {
    if state.notifier.capability() == NotificationCapability::Unsupported {
        return Err(SparrowError::NotificationsUnsupported);
    }
    if request.title.trim().is_empty() {
        return Err(SparrowError::bad_request("title must not be empty"));
    }

    let shown = state.notifier.show(&request.title, request.options).map(|handle| ShownNotification {
        id: handle.id().to_string(),
        tag: handle.tag().map(str::to_string),
    });
    Ok(Json(shown))
}

pub async fn list_notifications(State(state): State<Arc<AppState>>) -> Json<Vec<Notification>> {
    Json(state.tray.visible())
}

pub async fn receive_push(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PushPayload>,
) -> Json<Option<Notification>> {
    Json(state.worker.on_push(payload))
}

pub async fn click_notification(
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<String>,
) -> SparrowResult<Json<ClickOutcome>> {
    let notification = state
        .tray
        .find(&notification_id)
        .ok_or_else(|| SparrowError::not_found(format!("notification {}", notification_id)))?;

    state
        .worker
        .on_click(&notification)
        .await
        .map(Json)
        .ok_or_else(|| SparrowError::WindowNavigation(format!("no window for notification {}", notification_id)))
}

/// Registers an already-open app window. Relative URLs resolve against the
/// app origin.
pub async fn open_window(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OpenWindowRequest>,
) -> SparrowResult<Json<WindowClient>> {
    let url = state
        .worker
        .app_origin()
        .join(&request.url)
        .map_err(SparrowError::invalid_url)?;
    Ok(Json(state.windows.register(&url)))
}

pub async fn list_windows(State(state): State<Arc<AppState>>) -> Json<Vec<WindowClient>> {
    Json(state.windows.list())
}
