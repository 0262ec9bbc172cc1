use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{TimeZone, Utc};
use serde_json::json;
use sparrow_live::{
    SparrowError,
    handlers::{notification_handler, order_handler, zone_handler},
    models::{
        geofence::{GeofenceConfig, GeofencePhase},
        notification::{NotificationOptions, Permission, PushPayload},
        order::{DeliveryPhase, OrderSnapshot, OrderStatus},
    },
    services::{
        backend::MemoryBackend,
        geofence_service::GeofenceStore,
        local_platform::{NotificationTray, WindowRegistry},
        messaging_service::{BackgroundWorker, ClickAction, ForegroundNotifier},
        order_service::OrderChannel,
    },
    state::{AppConfig, AppState},
};

const ORIGIN: &str = "https://shop.example.com";

fn order(id: &str, status: OrderStatus, minute: u32) -> OrderSnapshot {
    OrderSnapshot {
        id: id.to_string(),
        user_id: Some("user-1".to_string()),
        status,
        eta_minutes: None,
        item_count: 3,
        total_amount: Some(412.5),
        delivery_location: None,
        created_at: Some(Utc.with_ymd_and_hms(2025, 8, 28, 9, minute, 0).unwrap()),
        updated_at: None,
    }
}

fn worker_with(tray: &Arc<NotificationTray>, windows: &Arc<WindowRegistry>) -> BackgroundWorker {
    BackgroundWorker::new(tray.clone(), windows.clone(), ORIGIN).unwrap()
}

#[tokio::test]
async fn test_zone_check_end_to_end() {
    let backend = Arc::new(MemoryBackend::with_config(GeofenceConfig::new(13.20, 80.10, 5.0).unwrap()));
    let store = GeofenceStore::new(backend.clone());

    // fail-open before anything is loaded
    assert!(store.is_within_zone(13.50, 80.10));
    assert_eq!(store.distance_from_center(13.50, 80.10), 0.0);

    store.activate().await;
    assert_eq!(store.phase(), GeofencePhase::Ready);

    let east = store.distance_from_center(13.20, 80.15);
    assert!((east - 5.41).abs() < 0.01, "got {east}");
    assert!(!store.is_within_zone(13.20, 80.15));
    assert!(store.is_within_zone(13.20, 80.14));

    let north = store.distance_from_center(13.50, 80.10);
    assert!((north - 33.36).abs() < 0.05, "got {north}");
    assert!(!store.is_within_zone(13.50, 80.10));
}

#[tokio::test]
async fn test_config_push_replaces_zone() {
    let backend = Arc::new(MemoryBackend::with_config(GeofenceConfig::new(13.20, 80.10, 5.0).unwrap()));
    let store = GeofenceStore::new(backend.clone());
    store.activate().await;
    let revision = store.revision();
    assert!(!store.is_within_zone(13.50, 80.10));

    backend.publish_config(GeofenceConfig::new(13.20, 80.10, 40.0).unwrap());
    store.wait_for_revision(revision + 1).await;
    assert!(store.is_within_zone(13.50, 80.10));

    store.deactivate();
    store.deactivate();
    assert_eq!(backend.live_subscriptions(), 0);

    backend.publish_config(GeofenceConfig::new(13.20, 80.10, 1.0).unwrap());
    assert!(store.is_within_zone(13.50, 80.10));
}

#[tokio::test]
async fn test_order_feeds_follow_backend() {
    let backend = Arc::new(MemoryBackend::new());
    backend.upsert_order(order("ord-1", OrderStatus::Preparing, 0));
    let channel = OrderChannel::new(backend.clone());

    let feed = channel.subscribe_all().await;
    assert!(!feed.current().loading);
    assert_eq!(feed.current().data.len(), 1);

    let mut on_the_way = order("ord-2", OrderStatus::OutForDelivery, 30);
    on_the_way.eta_minutes = Some(4);
    backend.upsert_order(on_the_way);

    let summary = feed.active_delivery().unwrap();
    assert_eq!(summary.order_id, "ord-2");
    assert_eq!(summary.status, DeliveryPhase::Nearby);
    assert_eq!(summary.eta_minutes, Some(4));

    backend.fail_orders(SparrowError::NetworkConnection("reset".to_string()));
    let live = feed.current();
    assert!(live.error.is_some());
    assert_eq!(live.data.len(), 2);

    feed.cancel();
    feed.cancel();
    assert_eq!(backend.live_subscriptions(), 0);
    backend.upsert_order(order("ord-3", OrderStatus::Pending, 45));
    assert_eq!(feed.current().data.len(), 2);
}

#[tokio::test]
async fn test_missing_order_id_opens_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    let channel = OrderChannel::new(backend.clone());

    let feed = channel.subscribe_one(None).await;
    let live = feed.current();
    assert!(!live.loading);
    assert_eq!(live.data, None);
    assert!(live.error.is_none());
    assert!(!feed.is_subscribed());
    assert_eq!(backend.subscriptions_opened(), 0);
}

#[tokio::test]
async fn test_tracker_switch_drops_old_order() {
    let backend = Arc::new(MemoryBackend::new());
    backend.upsert_order(order("ord-1", OrderStatus::Preparing, 0));
    backend.upsert_order(order("ord-2", OrderStatus::Packed, 5));
    let channel = OrderChannel::new(backend.clone());
    let tracker = channel.tracker();

    tracker.track(Some("ord-1")).await;
    tracker.track(Some("ord-2")).await;
    assert_eq!(tracker.tracked_order().await.as_deref(), Some("ord-2"));
    assert_eq!(backend.live_subscriptions(), 1);

    backend.upsert_order(order("ord-1", OrderStatus::Delivered, 50));
    let current = tracker.current().data.unwrap();
    assert_eq!(current.id, "ord-2");
    assert_eq!(current.status, OrderStatus::Packed);

    tracker.teardown().await;
    tracker.teardown().await;
    assert_eq!(backend.live_subscriptions(), 0);
}

#[tokio::test]
async fn test_push_with_same_tag_coalesces() {
    let tray = Arc::new(NotificationTray::new());
    let windows = Arc::new(WindowRegistry::new());
    let worker = worker_with(&tray, &windows);

    let first = worker.on_push(PushPayload::default()).unwrap();
    let payload: PushPayload = serde_json::from_value(json!({
        "notification": {"title": "Order #1042", "body": "3 items"},
        "data": {"url": "/admin/orders/1042", "orderId": "1042"}
    }))
    .unwrap();
    let second = worker.on_push(payload).unwrap();

    assert_eq!(first.title, "New Order");
    assert_eq!(first.body.as_deref(), Some("You have a new order waiting for review"));
    assert_eq!(first.tag.as_deref(), Some("order_alerts"));
    assert!(second.require_interaction);
    assert_eq!(second.vibrate, vec![200, 100, 200]);

    let visible = tray.visible();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, second.id);
}

#[tokio::test]
async fn test_click_focuses_first_window_on_origin() {
    let tray = Arc::new(NotificationTray::new());
    let windows = Arc::new(WindowRegistry::new());
    let worker = worker_with(&tray, &windows);

    windows.register(&"https://other.example.com/".parse().unwrap());
    let first = windows.register(&"https://shop.example.com/catalog".parse().unwrap());
    windows.register(&"https://shop.example.com/cart".parse().unwrap());

    let payload: PushPayload = serde_json::from_value(json!({
        "data": {"url": "/admin/orders/1042"}
    }))
    .unwrap();
    let notification = worker.on_push(payload).unwrap();
    let outcome = worker.on_click(&notification).await.unwrap();

    assert_eq!(outcome.action, ClickAction::Focused);
    assert_eq!(outcome.window_id, first.id);
    assert_eq!(outcome.url, "https://shop.example.com/admin/orders/1042");
    assert!(tray.find(&notification.id).is_none());
    assert_eq!(windows.list().len(), 3);
}

#[tokio::test]
async fn test_click_without_app_window_opens_default_screen() {
    let tray = Arc::new(NotificationTray::new());
    let windows = Arc::new(WindowRegistry::new());
    let worker = worker_with(&tray, &windows);
    windows.register(&"https://other.example.com/admin/orders".parse().unwrap());

    let notification = worker.on_push(PushPayload::default()).unwrap();
    let outcome = worker.on_click(&notification).await.unwrap();

    assert_eq!(outcome.action, ClickAction::Opened);
    assert_eq!(outcome.url, "https://shop.example.com/admin/orders");
    assert_eq!(windows.list().len(), 2);
    assert!(tray.visible().is_empty());
}

#[tokio::test]
async fn test_unsupported_platform_never_fails() {
    let notifier = ForegroundNotifier::detect(None);
    assert!(!notifier.request_permission().await);
    assert!(notifier.show("Hello", NotificationOptions::default()).is_none());
}

#[tokio::test]
async fn test_denied_permission_shows_nothing() {
    let tray = Arc::new(NotificationTray::with_prompt_answer(Permission::Denied));
    let notifier = ForegroundNotifier::detect(Some(tray.clone()));

    assert!(!notifier.request_permission().await);
    assert!(notifier.show("Hello", NotificationOptions::default()).is_none());
    assert!(tray.visible().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_foreground_notification_auto_dismisses() {
    let tray = Arc::new(NotificationTray::granted());
    let notifier = ForegroundNotifier::detect(Some(tray.clone()));

    let handle = notifier.show("Order packed", NotificationOptions::default()).unwrap();
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(tray.find(handle.id()).is_some());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(tray.find(handle.id()).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_spares_replacement() {
    let tray = Arc::new(NotificationTray::granted());
    let notifier = ForegroundNotifier::detect(Some(tray.clone()));
    let options = NotificationOptions {
        tag: Some("order-1042".to_string()),
        ..NotificationOptions::default()
    };

    let old = notifier.show("Packed", options.clone()).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    let new = notifier.show("On the way", options).unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(tray.find(old.id()).is_none());
    assert!(tray.find(new.id()).is_some());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(tray.visible().is_empty());
}

#[tokio::test]
async fn test_handlers_over_session() {
    let backend = Arc::new(MemoryBackend::with_config(GeofenceConfig::new(13.20, 80.10, 5.0).unwrap()));
    backend.upsert_order(order("ord-1", OrderStatus::Confirmed, 10));
    let config = AppConfig {
        app_origin: ORIGIN.to_string(),
        ..AppConfig::default()
    };
    let state = Arc::new(
        AppState::with_sources(config, backend.clone(), backend.clone(), Some(backend.clone()))
            .await
            .unwrap(),
    );

    let Json(check) = zone_handler::check_zone(
        State(state.clone()),
        Query(zone_handler::ZoneQuery { lat: 13.50, lng: 80.10 }),
    )
    .await
    .unwrap();
    assert!(!check.within_zone);
    assert_eq!(check.phase, GeofencePhase::Ready);

    let Json(live) = order_handler::get_order(State(state.clone()), Path("ord-1".to_string()))
        .await
        .unwrap();
    assert_eq!(live.data.unwrap().status, OrderStatus::Confirmed);

    let missing = order_handler::get_order(State(state.clone()), Path("ord-9".to_string())).await;
    assert!(matches!(missing, Err(SparrowError::OrderNotFound(_))));

    let Json(pushed) = notification_handler::receive_push(State(state.clone()), Json(PushPayload::default())).await;
    let pushed = pushed.unwrap();
    let Json(outcome) = notification_handler::click_notification(State(state.clone()), Path(pushed.id.clone()))
        .await
        .unwrap();
    assert_eq!(outcome.action, ClickAction::Opened);

    let again = notification_handler::click_notification(State(state.clone()), Path(pushed.id)).await;
    assert!(matches!(again, Err(SparrowError::NotFound(_))));

    // only the session's own feeds stay open after the request-scoped feed
    assert_eq!(backend.live_subscriptions(), 2);
    state.shutdown();
    assert_eq!(backend.live_subscriptions(), 0);
}
