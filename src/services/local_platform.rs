// src/services/local_platform.rs
//! In-process notification surface and window list, used by the host
//! process and by tests.

use async_trait::async_trait;
use reqwest::Url;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing;

use crate::{
    errors::{SparrowError, SparrowResult},
    models::notification::{ChannelRegistration, Notification, Permission},
    services::messaging_service::{NotificationError, NotificationPlatform, WindowClient, WindowClients},
    utils::id_generator::generate_window_id,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Visible notifications keyed by tag. A notification whose tag is already
/// visible replaces it; untagged notifications always stack.
pub struct NotificationTray {
    permission: Mutex<Permission>,
    // what a permission prompt resolves to
    prompt_answer: Permission,
    visible: Mutex<Vec<Notification>>,
    channels: Mutex<Vec<ChannelRegistration>>,
}

impl Default for NotificationTray {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationTray {
    /// Permission starts as `default`; a prompt grants it.
    pub fn new() -> Self {
        Self::with_prompt_answer(Permission::Granted)
    }

    pub fn with_prompt_answer(answer: Permission) -> Self {
        Self {
            permission: Mutex::new(Permission::Default),
            prompt_answer: answer,
            visible: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
        }
    }

    pub fn granted() -> Self {
        let tray = Self::new();
        *lock(&tray.permission) = Permission::Granted;
        tray
    }

    /// Oldest first.
    pub fn visible(&self) -> Vec<Notification> {
        lock(&self.visible).clone()
    }

    pub fn find(&self, notification_id: &str) -> Option<Notification> {
        lock(&self.visible).iter().find(|n| n.id == notification_id).cloned()
    }

    pub fn channels(&self) -> Vec<ChannelRegistration> {
        lock(&self.channels).clone()
    }
}

#[async_trait]
impl NotificationPlatform for NotificationTray {
    fn permission(&self) -> Permission {
        *lock(&self.permission)
    }

    async fn request_permission(&self) -> Result<Permission, NotificationError> {
        let mut permission = lock(&self.permission);
        if *permission == Permission::Default {
            *permission = self.prompt_answer;
        }
        Ok(*permission)
    }

    async fn register_channel(&self, registration: &ChannelRegistration) -> Result<(), NotificationError> {
        let mut channels = lock(&self.channels);
        channels.retain(|existing| existing.id != registration.id);
        channels.push(registration.clone());
        Ok(())
    }

    /// Refused once the user has denied permission, whichever context asks.
    fn display(&self, notification: Notification) -> Result<(), NotificationError> {
        if self.permission() == Permission::Denied {
            return Err(NotificationError::PermissionDenied);
        }
        let mut visible = lock(&self.visible);
        if let Some(tag) = notification.tag.as_deref() {
            let before = visible.len();
            visible.retain(|existing| existing.tag.as_deref() != Some(tag));
            if visible.len() != before {
                tracing::debug!("Notification tagged {} replaced", tag);
            }
        }
        tracing::info!("[TRAY] {} - {}", notification.title, notification.body.as_deref().unwrap_or(""));
        visible.push(notification);
        Ok(())
    }

    fn dismiss(&self, notification_id: &str) -> bool {
        let mut visible = lock(&self.visible);
        let before = visible.len();
        visible.retain(|n| n.id != notification_id);
        visible.len() != before
    }
}

/// Open application windows, in the order they were opened.
#[derive(Default)]
pub struct WindowRegistry {
    windows: Mutex<Vec<WindowClient>>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, url: &Url) -> WindowClient {
        let window = WindowClient {
            id: generate_window_id(),
            url: url.to_string(),
            focused: false,
        };
        lock(&self.windows).push(window.clone());
        window
    }

    pub fn close(&self, window_id: &str) -> bool {
        let mut windows = lock(&self.windows);
        let before = windows.len();
        windows.retain(|w| w.id != window_id);
        windows.len() != before
    }

    pub fn list(&self) -> Vec<WindowClient> {
        lock(&self.windows).clone()
    }
}

#[async_trait]
impl WindowClients for WindowRegistry {
    async fn match_all(&self) -> SparrowResult<Vec<WindowClient>> {
        Ok(self.list())
    }

    async fn focus_and_navigate(&self, window_id: &str, url: &Url) -> SparrowResult<WindowClient> {
        let mut windows = lock(&self.windows);
        if !windows.iter().any(|w| w.id == window_id) {
            return Err(SparrowError::WindowNotFound(window_id.to_string()));
        }

        let mut focused = None;
        for window in windows.iter_mut() {
            window.focused = window.id == window_id;
            if window.focused {
                window.url = url.to_string();
                focused = Some(window.clone());
            }
        }
        focused.ok_or_else(|| SparrowError::WindowNotFound(window_id.to_string()))
    }

    async fn open_window(&self, url: &Url) -> SparrowResult<WindowClient> {
        let mut windows = lock(&self.windows);
        for window in windows.iter_mut() {
            window.focused = false;
        }
        let window = WindowClient {
            id: generate_window_id(),
            url: url.to_string(),
            focused: true,
        };
        windows.push(window.clone());
        Ok(window)
    }
}
