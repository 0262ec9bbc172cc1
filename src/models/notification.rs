// src/models/notification.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    OrderAlerts,
    DeliveryUpdates,
    CustomerNotifications,
    AdminAlerts,
}

impl ChannelId {
    pub const ALL: [ChannelId; 4] = [
        ChannelId::OrderAlerts,
        ChannelId::DeliveryUpdates,
        ChannelId::CustomerNotifications,
        ChannelId::AdminAlerts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::OrderAlerts => "order_alerts",
            ChannelId::DeliveryUpdates => "delivery_updates",
            ChannelId::CustomerNotifications => "customer_notifications",
            ChannelId::AdminAlerts => "admin_alerts",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ChannelId::ALL.into_iter().find(|id| id.as_str() == value)
    }

    pub fn descriptor(&self) -> &'static NotificationChannel {
        match self {
            ChannelId::OrderAlerts => &CHANNELS[0],
            ChannelId::DeliveryUpdates => &CHANNELS[1],
            ChannelId::CustomerNotifications => &CHANNELS[2],
            ChannelId::AdminAlerts => &CHANNELS[3],
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    High,
    Default,
    Low,
    Min,
}

impl Importance {
    /// Ordinal used when registering a channel with the platform.
    pub fn ordinal(&self) -> u8 {
        match self {
            Importance::High => 4,
            Importance::Default => 3,
            Importance::Low => 2,
            Importance::Min => 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Secret,
}

/// Static descriptor of a notification channel.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct NotificationChannel {
    pub id: ChannelId,
    pub name: &'static str,
    pub description: &'static str,
    pub importance: Importance,
    pub visibility: Visibility,
    pub sound: bool,
    pub vibration: bool,
    pub lights: bool,
}

pub static CHANNELS: [NotificationChannel; 4] = [
    NotificationChannel {
        id: ChannelId::OrderAlerts,
        name: "Order Alerts",
        description: "New orders waiting for review",
        importance: Importance::High,
        visibility: Visibility::Public,
        sound: true,
        vibration: true,
        lights: true,
    },
    NotificationChannel {
        id: ChannelId::DeliveryUpdates,
        name: "Delivery Updates",
        description: "Progress of orders out for delivery",
        importance: Importance::High,
        visibility: Visibility::Public,
        sound: true,
        vibration: true,
        lights: false,
    },
    NotificationChannel {
        id: ChannelId::CustomerNotifications,
        name: "Customer Notifications",
        description: "Offers and account messages",
        importance: Importance::Default,
        visibility: Visibility::Private,
        sound: true,
        vibration: false,
        lights: false,
    },
    NotificationChannel {
        id: ChannelId::AdminAlerts,
        name: "Admin Alerts",
        description: "Store operations that need attention",
        importance: Importance::High,
        visibility: Visibility::Private,
        sound: true,
        vibration: true,
        lights: true,
    },
];

/// What the platform receives when a channel is registered.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChannelRegistration {
    pub id: String,
    pub name: String,
    pub description: String,
    pub importance: u8,
    pub visibility: Visibility,
    pub sound: bool,
    pub vibration: bool,
    pub lights: bool,
}

impl From<&NotificationChannel> for ChannelRegistration {
    fn from(channel: &NotificationChannel) -> Self {
        Self {
            id: channel.id.as_str().to_string(),
            name: channel.name.to_string(),
            description: channel.description.to_string(),
            importance: channel.importance.ordinal(),
            visibility: channel.visibility,
            sound: channel.sound,
            vibration: channel.vibration,
            lights: channel.lights,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Granted,
    Denied,
    Default,
}

/// Envelope delivered by the push transport to the background worker.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PushPayload {
    #[serde(default)]
    pub notification: Option<PushNotificationBody>,
    #[serde(default)]
    pub data: PushData,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PushNotificationBody {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Routing data embedded in a push payload. Unknown keys are kept.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushData {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Caller-supplied options for a foreground notification.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub channel: Option<ChannelId>,
    #[serde(default)]
    pub data: Option<PushData>,
    #[serde(default)]
    pub require_interaction: bool,
    #[serde(default)]
    pub vibrate: Vec<u32>,
}

/// A notification as handed to the platform.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    /// Coalescing key: a notification with the same tag replaces the visible
    /// one instead of stacking.
    pub tag: Option<String>,
    pub icon: Option<String>,
    pub channel: ChannelId,
    pub importance: u8,
    pub visibility: Visibility,
    pub require_interaction: bool,
    pub vibrate: Vec<u32>,
    pub silent: bool,
    pub data: PushData,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Key under which the platform keeps the notification visible.
    pub fn display_key(&self) -> &str {
        self.tag.as_deref().unwrap_or(&self.id)
    }
}
