// src/state.rs
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::{
    errors::{SparrowError, SparrowResult},
    models::order::OrderSnapshot,
    services::{
        backend::{ConfigSource, MemoryBackend, OrderSource},
        firebase_backend::{FirebaseBackend, FirebaseConfig},
        geofence_service::GeofenceStore,
        local_platform::{NotificationTray, WindowRegistry},
        messaging_service::{
            BackgroundWorker, ForegroundNotifier, NotificationPlatform, register_notification_channels,
        },
        order_service::{LiveFeed, OrderChannel},
    },
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub app_origin: String,
    pub firebase_url: Option<String>,
    pub firebase_auth_token: Option<String>,
    pub geofence_path: String,
    pub orders_path: String,
    pub notifications_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            app_origin: "http://localhost:3000".to_string(),
            firebase_url: None,
            firebase_auth_token: None,
            geofence_path: "settings/geofence".to_string(),
            orders_path: "orders".to_string(),
            notifications_enabled: true,
        }
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    optional_var(key).unwrap_or_else(|| {
        tracing::info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

impl AppConfig {
    pub fn from_env() -> SparrowResult<Self> {
        let defaults = Self::default();

        let bind_addr = var_or("SPARROW_BIND_ADDR", &defaults.bind_addr.to_string())
            .parse()
            .map_err(|e| SparrowError::invalid_configuration(format!("SPARROW_BIND_ADDR: {e}")))?;

        let notifications_enabled = match var_or("SPARROW_NOTIFICATIONS", "enabled").as_str() {
            "enabled" | "true" | "1" => true,
            "disabled" | "false" | "0" => false,
            other => {
                return Err(SparrowError::invalid_configuration(format!(
                    "SPARROW_NOTIFICATIONS must be enabled or disabled, got {other}"
                )));
            }
        };

        Ok(Self {
            bind_addr,
            app_origin: var_or("SPARROW_APP_ORIGIN", &defaults.app_origin),
            firebase_url: optional_var("FIREBASE_DATABASE_URL"),
            firebase_auth_token: optional_var("FIREBASE_AUTH_TOKEN"),
            geofence_path: var_or("SPARROW_GEOFENCE_PATH", &defaults.geofence_path),
            orders_path: var_or("SPARROW_ORDERS_PATH", &defaults.orders_path),
            notifications_enabled,
        })
    }
}

/// Everything a session needs, constructed once and shared by reference.
pub struct AppState {
    pub config: AppConfig,
    pub geofence: Arc<GeofenceStore>,
    pub orders: Arc<OrderChannel>,
    pub order_feed: LiveFeed<Vec<OrderSnapshot>>,
    pub notifier: ForegroundNotifier,
    pub worker: BackgroundWorker,
    pub tray: Arc<NotificationTray>,
    pub windows: Arc<WindowRegistry>,
    pub memory_backend: Option<Arc<MemoryBackend>>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> SparrowResult<Self> {
        let (config_source, order_source, memory_backend): (
            Arc<dyn ConfigSource>,
            Arc<dyn OrderSource>,
            Option<Arc<MemoryBackend>>,
        ) = match &config.firebase_url {
            Some(url) => {
                let backend = Arc::new(FirebaseBackend::new(FirebaseConfig {
                    auth_token: config.firebase_auth_token.clone(),
                    geofence_path: config.geofence_path.clone(),
                    orders_path: config.orders_path.clone(),
                    ..FirebaseConfig::new(url.clone())
                }));
                (backend.clone() as Arc<dyn ConfigSource>, backend as Arc<dyn OrderSource>, None)
            }
            None => {
                tracing::warn!("FIREBASE_DATABASE_URL not set, using in-memory backend");
                let backend = Arc::new(MemoryBackend::new());
                (
                    backend.clone() as Arc<dyn ConfigSource>,
                    backend.clone() as Arc<dyn OrderSource>,
                    Some(backend),
                )
            }
        };

        Self::with_sources(config, config_source, order_source, memory_backend).await
    }

    /// Wires the session around explicit sources.
    pub async fn with_sources(
        config: AppConfig,
        config_source: Arc<dyn ConfigSource>,
        order_source: Arc<dyn OrderSource>,
        memory_backend: Option<Arc<MemoryBackend>>,
    ) -> SparrowResult<Self> {
        let tray = Arc::new(NotificationTray::new());
        let windows = Arc::new(WindowRegistry::new());
        let worker = BackgroundWorker::new(tray.clone(), windows.clone(), &config.app_origin)?;

        let platform: Option<Arc<dyn NotificationPlatform>> = if config.notifications_enabled {
            let registered = register_notification_channels(tray.as_ref()).await;
            tracing::info!("Registered {} notification channels", registered);
            Some(tray.clone())
        } else {
            None
        };
        let notifier = ForegroundNotifier::detect(platform);

        let geofence = Arc::new(GeofenceStore::new(config_source));
        geofence.activate().await;

        let orders = Arc::new(OrderChannel::new(order_source));
        let order_feed = orders.subscribe_all().await;

        Ok(Self {
            config,
            geofence,
            orders,
            order_feed,
            notifier,
            worker,
            tray,
            windows,
            memory_backend,
        })
    }

    /// Releases every subscription the session opened. Idempotent.
    pub fn shutdown(&self) {
        self.order_feed.cancel();
        self.geofence.deactivate();
        tracing::info!("Session subscriptions released");
    }
}
