// src/services/messaging_service.rs
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing;

use crate::{
    errors::{SparrowError, SparrowResult},
    models::notification::{
        ChannelId, ChannelRegistration, Notification, NotificationOptions, Permission, PushData,
        PushPayload,
    },
    utils::id_generator::generate_notification_id,
};

/// Foreground notifications close themselves after this long, whatever the
/// platform's own timing is.
pub const AUTO_DISMISS_AFTER: Duration = Duration::from_secs(10);

pub const DEFAULT_PUSH_TITLE: &str = "New Order";
pub const DEFAULT_PUSH_BODY: &str = "You have a new order waiting for review";
pub const DEFAULT_CLICK_PATH: &str = "/admin/orders";
pub const PUSH_ICON: &str = "/icons/icon-192x192.png";
pub const PUSH_VIBRATION_PATTERN: [u32; 3] = [200, 100, 200];

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification permission denied")]
    PermissionDenied,
}

/// OS-level notification surface.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    fn permission(&self) -> Permission;

    async fn request_permission(&self) -> Result<Permission, NotificationError>;

    async fn register_channel(&self, registration: &ChannelRegistration) -> Result<(), NotificationError>;

    /// Shows `notification`, replacing any visible one with the same tag.
    fn display(&self, notification: Notification) -> Result<(), NotificationError>;

    /// Removes the notification with exactly this id. Returns whether it was
    /// still visible.
    fn dismiss(&self, notification_id: &str) -> bool;
}

/// An application window the background worker can route clicks into.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowClient {
    pub id: String,
    pub url: String,
    pub focused: bool,
}

#[async_trait]
pub trait WindowClients: Send + Sync {
    /// Every open window, in platform order.
    async fn match_all(&self) -> SparrowResult<Vec<WindowClient>>;

    async fn focus_and_navigate(&self, window_id: &str, url: &Url) -> SparrowResult<WindowClient>;

    async fn open_window(&self, url: &Url) -> SparrowResult<WindowClient>;
}

/// Registers every static channel with the platform. Returns how many
/// registrations succeeded.
pub async fn register_notification_channels(platform: &dyn NotificationPlatform) -> usize {
    let mut registered = 0;
    for channel in ChannelId::ALL {
        let registration = ChannelRegistration::from(channel.descriptor());
        match platform.register_channel(&registration).await {
            Ok(()) => {
                tracing::debug!(
                    "Registered notification channel {} (importance {})",
                    registration.id,
                    registration.importance
                );
                registered += 1;
            }
            Err(e) => tracing::warn!("Could not register channel {}: {}", registration.id, e),
        }
    }
    registered
}

fn build_notification(title: &str, options: NotificationOptions) -> Notification {
    let channel = options.channel.unwrap_or(ChannelId::CustomerNotifications);
    let descriptor = channel.descriptor();

    Notification {
        id: generate_notification_id(),
        title: title.to_string(),
        body: options.body,
        tag: options.tag,
        icon: options.icon,
        channel,
        importance: descriptor.importance.ordinal(),
        visibility: descriptor.visibility,
        require_interaction: options.require_interaction,
        vibrate: if descriptor.vibration { options.vibrate } else { Vec::new() },
        silent: !descriptor.sound,
        data: options.data.unwrap_or_default(),
        created_at: Utc::now(),
    }
}

/// Handle to a shown notification.
pub struct NotificationHandle {
    id: String,
    tag: Option<String>,
    platform: Arc<dyn NotificationPlatform>,
}

impl fmt::Debug for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHandle")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .finish()
    }
}

impl NotificationHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn close(&self) -> bool {
        self.platform.dismiss(&self.id)
    }
}

/// Result of probing the host for notification support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCapability {
    Supported,
    Unsupported,
}

/// Page-context dispatcher. Detected once at startup; call sites never check
/// for platform support themselves.
pub enum ForegroundNotifier {
    Supported { platform: Arc<dyn NotificationPlatform> },
    Unsupported,
}

impl ForegroundNotifier {
    pub fn detect(platform: Option<Arc<dyn NotificationPlatform>>) -> Self {
        match platform {
            Some(platform) => {
                tracing::info!("Notifications supported (permission: {:?})", platform.permission());
                ForegroundNotifier::Supported { platform }
            }
            None => {
                tracing::warn!("Notifications are not supported on this platform");
                ForegroundNotifier::Unsupported
            }
        }
    }

    pub fn capability(&self) -> NotificationCapability {
        match self {
            ForegroundNotifier::Supported { .. } => NotificationCapability::Supported,
            ForegroundNotifier::Unsupported => NotificationCapability::Unsupported,
        }
    }

    /// Asks for permission. Never fails: an unsupported platform or a
    /// failed request yields `false`.
    pub async fn request_permission(&self) -> bool {
        let platform = match self {
            ForegroundNotifier::Supported { platform } => platform,
            ForegroundNotifier::Unsupported => {
                tracing::warn!("This platform does not support notifications");
                return false;
            }
        };

        if platform.permission() == Permission::Granted {
            return true;
        }
        match platform.request_permission().await {
            Ok(permission) => {
                tracing::info!("Notification permission: {:?}", permission);
                permission == Permission::Granted
            }
            Err(e) => {
                tracing::warn!("Notification permission request failed: {}", e);
                false
            }
        }
    }

    /// Shows a notification that dismisses itself after
    /// [`AUTO_DISMISS_AFTER`]. `None` when unsupported, not permitted, or the
    /// platform refuses it.
    pub fn show(&self, title: &str, options: NotificationOptions) -> Option<NotificationHandle> {
        let ForegroundNotifier::Supported { platform } = self else {
            return None;
        };
        if platform.permission() != Permission::Granted {
            tracing::debug!("Notification '{}' skipped: permission not granted", title);
            return None;
        }

        let notification = build_notification(title, options);
        let handle = NotificationHandle {
            id: notification.id.clone(),
            tag: notification.tag.clone(),
            platform: platform.clone(),
        };
        if let Err(e) = platform.display(notification) {
            tracing::warn!("Failed to show notification '{}': {}", title, e);
            return None;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let platform = platform.clone();
                let id = handle.id.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(AUTO_DISMISS_AFTER).await;
                    if platform.dismiss(&id) {
                        tracing::debug!("Notification {} auto-dismissed", id);
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime available, notification {} will not auto-dismiss", handle.id),
        }

        Some(handle)
    }
}

/// How a notification click was routed.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClickAction {
    Focused,
    Opened,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClickOutcome {
    pub action: ClickAction,
    pub window_id: String,
    pub url: String,
}

/// Background push handler: turns push payloads into notifications and
/// routes clicks back into the app, with or without an open page.
pub struct BackgroundWorker {
    surface: Arc<dyn NotificationPlatform>,
    windows: Arc<dyn WindowClients>,
    app_origin: Url,
}

impl BackgroundWorker {
    /// `app_origin` must be an absolute URL; it decides which windows belong
    /// to this app and resolves relative click targets.
    pub fn new(
        surface: Arc<dyn NotificationPlatform>,
        windows: Arc<dyn WindowClients>,
        app_origin: &str,
    ) -> SparrowResult<Self> {
        let app_origin = Url::parse(app_origin).map_err(SparrowError::invalid_url)?;
        if app_origin.cannot_be_a_base() {
            return Err(SparrowError::invalid_configuration(format!(
                "app origin {} cannot be used as a base URL",
                app_origin
            )));
        }
        Ok(Self {
            surface,
            windows,
            app_origin,
        })
    }

    pub fn app_origin(&self) -> &Url {
        &self.app_origin
    }

    /// Maps a push payload onto a notification, filling every missing field
    /// with its default.
    pub fn notification_for(payload: &PushPayload) -> Notification {
        let body = payload.notification.clone().unwrap_or_default();
        let channel = payload
            .data
            .channel_id
            .as_deref()
            .and_then(ChannelId::parse)
            .unwrap_or(ChannelId::OrderAlerts);
        let descriptor = channel.descriptor();

        Notification {
            id: generate_notification_id(),
            title: body.title.unwrap_or_else(|| DEFAULT_PUSH_TITLE.to_string()),
            body: Some(body.body.unwrap_or_else(|| DEFAULT_PUSH_BODY.to_string())),
            tag: Some(channel.as_str().to_string()),
            icon: Some(body.icon.unwrap_or_else(|| PUSH_ICON.to_string())),
            channel,
            importance: descriptor.importance.ordinal(),
            visibility: descriptor.visibility,
            require_interaction: true,
            vibrate: PUSH_VIBRATION_PATTERN.to_vec(),
            silent: !descriptor.sound,
            data: payload.data.clone(),
            created_at: Utc::now(),
        }
    }

    /// Shows the notification for an inbound push. Display failures are
    /// logged, never raised.
    pub fn on_push(&self, payload: PushPayload) -> Option<Notification> {
        let notification = Self::notification_for(&payload);
        tracing::info!(
            "Push received: '{}' on {}",
            notification.title,
            notification.channel
        );

        match self.surface.display(notification.clone()) {
            Ok(()) => Some(notification),
            Err(e) => {
                tracing::error!("Failed to display push notification: {}", e);
                None
            }
        }
    }

    /// Click target: the payload URL resolved against the app origin, or
    /// the admin order review screen.
    pub fn resolve_target(&self, data: &PushData) -> Url {
        let fallback = || {
            self.app_origin
                .join(DEFAULT_CLICK_PATH)
                .unwrap_or_else(|_| self.app_origin.clone())
        };

        match data.url.as_deref().filter(|url| !url.trim().is_empty()) {
            Some(url) => self.app_origin.join(url).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unusable click URL {}: {}", url, e);
                fallback()
            }),
            None => fallback(),
        }
    }

    /// Closes the notification and brings exactly one app window to the
    /// target: the first open window on this origin, or a new one.
    pub async fn on_click(&self, notification: &Notification) -> Option<ClickOutcome> {
        self.surface.dismiss(&notification.id);
        let target = self.resolve_target(&notification.data);

        let windows = self.windows.match_all().await.unwrap_or_else(|e| {
            tracing::warn!("Could not list windows: {}", e);
            Vec::new()
        });
        let existing = windows.into_iter().find(|window| {
            Url::parse(&window.url).is_ok_and(|url| url.origin() == self.app_origin.origin())
        });

        if let Some(window) = existing {
            match self.windows.focus_and_navigate(&window.id, &target).await {
                Ok(window) => {
                    tracing::info!("Focused window {} at {}", window.id, target);
                    return Some(ClickOutcome {
                        action: ClickAction::Focused,
                        window_id: window.id,
                        url: target.to_string(),
                    });
                }
                Err(e) => tracing::warn!("Could not focus window {}: {}", window.id, e),
            }
        }

        match self.windows.open_window(&target).await {
            Ok(window) => {
                tracing::info!("Opened window {} at {}", window.id, target);
                Some(ClickOutcome {
                    action: ClickAction::Opened,
                    window_id: window.id,
                    url: target.to_string(),
                })
            }
            Err(e) => {
                tracing::error!("Could not open a window for {}: {}", target, e);
                None
            }
        }
    }
}
