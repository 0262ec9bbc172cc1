// src/models/order.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ETA at or below which an order on the road is reported as nearby.
pub const NEARBY_ETA_MINUTES: u32 = 5;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Packed,
    OutForDelivery,
    Delivered,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// One order's state at a point in time, as pushed by the backend.
///
/// Snapshots are never edited on the client; a newer push replaces the old
/// value in whatever view holds it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    // backfilled from the node key when the payload omits it
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub eta_minutes: Option<u32>,
    #[serde(default)]
    pub item_count: u32,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub delivery_location: Option<Coordinates>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderSnapshot {
    pub fn last_changed(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.created_at)
    }
}

/// Coarse delivery status shown by the persistent tracking affordance.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPhase {
    Preparing,
    OnTheWay,
    Nearby,
}

impl DeliveryPhase {
    pub fn for_order(order: &OrderSnapshot) -> Option<Self> {
        match order.status {
            OrderStatus::Pending
            | OrderStatus::Confirmed
            | OrderStatus::Preparing
            | OrderStatus::Packed => Some(DeliveryPhase::Preparing),
            OrderStatus::OutForDelivery => match order.eta_minutes {
                Some(eta) if eta <= NEARBY_ETA_MINUTES => Some(DeliveryPhase::Nearby),
                _ => Some(DeliveryPhase::OnTheWay),
            },
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Unknown => None,
        }
    }
}

/// Derived view of the most relevant in-flight order. Never persisted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDeliverySummary {
    pub order_id: String,
    pub status: DeliveryPhase,
    pub eta_minutes: Option<u32>,
    pub item_count: u32,
}

impl ActiveDeliverySummary {
    /// Picks the most recently changed order that is still in flight.
    pub fn from_orders(orders: &[OrderSnapshot]) -> Option<Self> {
        let mut best: Option<(&OrderSnapshot, DeliveryPhase)> = None;
        for order in orders {
            let Some(phase) = DeliveryPhase::for_order(order) else {
                continue;
            };
            let newer = match best {
                Some((current, _)) => order.last_changed() > current.last_changed(),
                None => true,
            };
            if newer {
                best = Some((order, phase));
            }
        }

        best.map(|(order, status)| ActiveDeliverySummary {
            order_id: order.id.clone(),
            status,
            eta_minutes: order.eta_minutes,
            item_count: order.item_count,
        })
    }
}

/// The latest value published by a live subscription together with its
/// loading and error flags.
///
/// A transport error sets `error` without touching `data`, so the last good
/// value stays available next to the error.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LiveState<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T: Default> LiveState<T> {
    pub fn loading() -> Self {
        Self {
            data: T::default(),
            loading: true,
            error: None,
        }
    }

    pub fn idle() -> Self {
        Self {
            data: T::default(),
            loading: false,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order(id: &str, status: OrderStatus, eta: Option<u32>, minute: u32) -> OrderSnapshot {
        OrderSnapshot {
            id: id.to_string(),
            user_id: Some("usr-1".to_string()),
            status,
            eta_minutes: eta,
            item_count: 3,
            total_amount: Some(420.0),
            delivery_location: None,
            created_at: Some(Utc.with_ymd_and_hms(2025, 8, 28, 10, minute, 0).unwrap()),
            updated_at: None,
        }
    }

    #[test]
    fn test_deserializes_backend_order() {
        let json = r#"{
            "status": "out_for_delivery",
            "etaMinutes": 12,
            "itemCount": 4,
            "createdAt": "2025-08-28T10:00:00Z",
            "paymentMethod": "upi"
        }"#;
        let snapshot: OrderSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.id, "");
        assert_eq!(snapshot.status, OrderStatus::OutForDelivery);
        assert_eq!(snapshot.eta_minutes, Some(12));
        assert_eq!(snapshot.item_count, 4);
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let snapshot: OrderSnapshot = serde_json::from_str(r#"{"status":"refunded"}"#).unwrap();
        assert_eq!(snapshot.status, OrderStatus::Unknown);
        assert_eq!(DeliveryPhase::for_order(&snapshot), None);
    }

    #[test]
    fn test_phase_mapping() {
        assert_eq!(
            DeliveryPhase::for_order(&order("a", OrderStatus::Packed, None, 0)),
            Some(DeliveryPhase::Preparing)
        );
        assert_eq!(
            DeliveryPhase::for_order(&order("a", OrderStatus::OutForDelivery, Some(12), 0)),
            Some(DeliveryPhase::OnTheWay)
        );
        assert_eq!(
            DeliveryPhase::for_order(&order("a", OrderStatus::OutForDelivery, Some(5), 0)),
            Some(DeliveryPhase::Nearby)
        );
        assert_eq!(DeliveryPhase::for_order(&order("a", OrderStatus::Delivered, None, 0)), None);
    }

    #[test]
    fn test_summary_picks_most_recent_active_order() {
        let orders = vec![
            order("old", OrderStatus::Preparing, None, 1),
            order("done", OrderStatus::Delivered, None, 30),
            order("new", OrderStatus::OutForDelivery, Some(3), 20),
        ];

        let summary = ActiveDeliverySummary::from_orders(&orders).unwrap();
        assert_eq!(summary.order_id, "new");
        assert_eq!(summary.status, DeliveryPhase::Nearby);
        assert_eq!(summary.eta_minutes, Some(3));
        assert_eq!(summary.item_count, 3);
    }

    #[test]
    fn test_summary_absent_without_active_orders() {
        let orders = vec![
            order("a", OrderStatus::Delivered, None, 1),
            order("b", OrderStatus::Cancelled, None, 2),
        ];
        assert_eq!(ActiveDeliverySummary::from_orders(&orders), None);
        assert_eq!(ActiveDeliverySummary::from_orders(&[]), None);
    }
}
