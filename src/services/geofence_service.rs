// src/services/geofence_service.rs
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing;

use crate::{
    errors::SparrowError,
    models::geofence::{GeofenceConfig, GeofencePhase},
    services::{
        backend::ConfigSource,
        subscription::{self, SourceEvent, Subscription},
    },
};

/// Where a config or an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Fetch,
    Push,
}

#[derive(Debug, Clone)]
struct GeofenceState {
    phase: GeofencePhase,
    config: Option<GeofenceConfig>,
    revision: u64,
    // kept apart so a good fetch cannot hide a broken subscription
    fetch_error: Option<String>,
    push_error: Option<String>,
}

impl Default for GeofenceState {
    fn default() -> Self {
        Self {
            phase: GeofencePhase::Uninitialized,
            config: None,
            revision: 0,
            fetch_error: None,
            push_error: None,
        }
    }
}

/// Holds the delivery zone and answers zone-membership queries.
///
/// The cached config is replaced wholesale by whichever of the initial
/// fetch or a push event lands last; readers always see one complete
/// config, never a mix of two.
pub struct GeofenceStore {
    source: Arc<dyn ConfigSource>,
    state: Arc<watch::Sender<GeofenceState>>,
    subscription: Mutex<Option<Subscription>>,
}

impl GeofenceStore {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        let (state, _) = watch::channel(GeofenceState::default());
        Self {
            source,
            state: Arc::new(state),
            subscription: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches the current config and opens the change subscription
    /// concurrently. Failures are logged and kept as the last error; the
    /// store stays fail-open until some config arrives.
    ///
    /// The subscription handle is installed before anything is awaited, so
    /// a `deactivate` that races with activation still releases it.
    pub async fn activate(&self) {
        self.state.send_modify(|state| {
            if state.phase == GeofencePhase::Uninitialized {
                state.phase = GeofencePhase::Loading;
            }
        });
        tracing::info!("Activating geofence store");

        let state = self.state.clone();
        let (sink, subscription) = subscription::open(move |event| match event {
            SourceEvent::Data(config) => apply_config(&state, config, Origin::Push),
            SourceEvent::Error(e) => record_error(&state, e, Origin::Push),
        });
        let subscription_id = subscription.id().to_string();
        if let Some(previous) = self.slot().replace(subscription) {
            previous.cancel();
        }

        let (subscribed, fetched) = tokio::join!(
            self.source.subscribe_config(sink),
            self.source.fetch_config()
        );

        if let Err(e) = subscribed {
            tracing::error!("Geofence subscription failed: {}", e);
            let failed = {
                let mut slot = self.slot();
                if slot.as_ref().is_some_and(|current| current.id() == subscription_id) {
                    slot.take()
                } else {
                    None
                }
            };
            if let Some(failed) = failed {
                failed.cancel();
            }
            record_error(&self.state, e, Origin::Push);
        }

        match fetched {
            Ok(Some(config)) => apply_config(&self.state, config, Origin::Fetch),
            Ok(None) => tracing::warn!("No geofence configured yet, zone checks stay open"),
            Err(e) => {
                tracing::error!("Geofence fetch failed: {}", e);
                record_error(&self.state, e, Origin::Fetch);
            }
        }
    }

    /// Cancels the change subscription. Safe to call repeatedly, and before
    /// activation.
    pub fn deactivate(&self) {
        let subscription = self.slot().take();
        if let Some(subscription) = subscription {
            subscription.cancel();
            tracing::info!("Geofence store deactivated");
        }
    }

    /// `true` until a config is loaded, so delivery eligibility is never
    /// blocked by missing data. Boundary inclusive afterwards.
    pub fn is_within_zone(&self, lat: f64, lng: f64) -> bool {
        match self.state.borrow().config {
            Some(config) => config.contains(lat, lng),
            None => true,
        }
    }

    /// Kilometers from the zone center, `0.0` until a config is loaded.
    pub fn distance_from_center(&self, lat: f64, lng: f64) -> f64 {
        self.state
            .borrow()
            .config
            .map_or(0.0, |config| config.distance_from_center(lat, lng))
    }

    pub fn phase(&self) -> GeofencePhase {
        self.state.borrow().phase
    }

    /// Number of configs applied so far.
    pub fn revision(&self) -> u64 {
        self.state.borrow().revision
    }

    /// The subscription's error if it has one, else the fetch's.
    pub fn last_error(&self) -> Option<String> {
        let state = self.state.borrow();
        state.push_error.clone().or_else(|| state.fetch_error.clone())
    }

    /// `false` once the subscription was cancelled or its source gave up.
    pub fn is_subscribed(&self) -> bool {
        self.slot().as_ref().is_some_and(Subscription::is_active)
    }

    pub async fn wait_until_ready(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives as long as `self`, so this cannot observe a close
        let _ = rx.wait_for(|state| state.phase == GeofencePhase::Ready).await;
    }

    pub async fn wait_for_revision(&self, revision: u64) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| state.revision >= revision).await;
    }
}

impl Drop for GeofenceStore {
    fn drop(&mut self) {
        self.deactivate();
    }
}

fn apply_config(state: &watch::Sender<GeofenceState>, config: GeofenceConfig, origin: Origin) {
    if let Err(e) = config.validate() {
        tracing::warn!("Ignoring geofence config from {:?}: {}", origin, e);
        record_error(state, e, origin);
        return;
    }

    state.send_modify(|state| {
        state.config = Some(config);
        state.phase = GeofencePhase::Ready;
        state.revision += 1;
        state.fetch_error = None;
        // only a delivered push proves the subscription is healthy
        if origin == Origin::Push {
            state.push_error = None;
        }
    });
    tracing::info!(
        "Geofence updated from {:?}: center=({}, {}) radius={}km",
        origin,
        config.center_lat,
        config.center_lng,
        config.radius_km
    );
}

fn record_error(state: &watch::Sender<GeofenceState>, error: SparrowError, origin: Origin) {
    let message = Some(error.to_string());
    state.send_modify(|state| match origin {
        Origin::Fetch => state.fetch_error = message,
        Origin::Push => state.push_error = message,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend::MemoryBackend;
    use crate::services::subscription::EventSink;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Subscribes immediately but holds the fetch until released.
    struct SlowFetch {
        inner: Arc<MemoryBackend>,
        release: Notify,
    }

    #[async_trait]
    impl ConfigSource for SlowFetch {
        async fn fetch_config(&self) -> crate::errors::SparrowResult<Option<GeofenceConfig>> {
            self.release.notified().await;
            self.inner.fetch_config().await
        }

        async fn subscribe_config(&self, sink: EventSink<GeofenceConfig>) -> crate::errors::SparrowResult<()> {
            self.inner.subscribe_config(sink).await
        }
    }

    fn zone(radius_km: f64) -> GeofenceConfig {
        GeofenceConfig::new(13.20, 80.10, radius_km).unwrap()
    }

    #[test]
    fn test_fail_open_before_ready() {
        let store = GeofenceStore::new(Arc::new(MemoryBackend::with_config(zone(5.0))));
        assert_eq!(store.phase(), GeofencePhase::Uninitialized);
        assert!(store.is_within_zone(13.50, 80.10));
        assert!(store.is_within_zone(-45.0, 170.0));
        assert_eq!(store.distance_from_center(13.50, 80.10), 0.0);
    }

    #[tokio::test]
    async fn test_activation_loads_config() {
        let backend = Arc::new(MemoryBackend::with_config(zone(5.0)));
        let store = GeofenceStore::new(backend.clone());
        store.activate().await;

        assert_eq!(store.phase(), GeofencePhase::Ready);
        assert!(store.is_subscribed());
        assert!(store.is_within_zone(13.20, 80.10));
        assert!(!store.is_within_zone(13.50, 80.10));
        assert!((store.distance_from_center(13.50, 80.10) - 33.36).abs() < 0.05);
        assert_eq!(backend.subscriptions_opened(), 1);
    }

    #[tokio::test]
    async fn test_push_replaces_config_entirely() {
        let backend = Arc::new(MemoryBackend::with_config(zone(5.0)));
        let store = GeofenceStore::new(backend.clone());
        store.activate().await;
        let before = store.revision();

        backend.publish_config(GeofenceConfig::new(28.61, 77.20, 2.0).unwrap());
        store.wait_for_revision(before + 1).await;

        assert!(!store.is_within_zone(13.20, 80.10));
        assert!(store.is_within_zone(28.61, 77.21));
        assert_eq!(store.distance_from_center(28.61, 77.20), 0.0);
    }

    #[tokio::test]
    async fn test_push_before_any_fetch_reaches_ready() {
        let backend = Arc::new(MemoryBackend::new());
        let store = GeofenceStore::new(backend.clone());
        store.activate().await;
        assert_eq!(store.phase(), GeofencePhase::Loading);
        assert!(store.is_within_zone(0.0, 0.0));

        backend.publish_config(zone(5.0));
        store.wait_until_ready().await;
        assert!(!store.is_within_zone(13.50, 80.10));
    }

    #[tokio::test]
    async fn test_invalid_push_is_rejected() {
        let backend = Arc::new(MemoryBackend::with_config(zone(5.0)));
        let store = GeofenceStore::new(backend.clone());
        store.activate().await;
        let revision = store.revision();

        backend.publish_config(GeofenceConfig {
            center_lat: 0.0,
            center_lng: 0.0,
            radius_km: -3.0,
        });

        assert_eq!(store.revision(), revision);
        assert!(store.is_within_zone(13.20, 80.10));
        assert!(store.last_error().unwrap().contains("radius_km"));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_subscription() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next_fetch(SparrowError::FetchFailed("503".into()));
        let store = GeofenceStore::new(backend.clone());
        store.activate().await;

        assert_eq!(store.phase(), GeofencePhase::Loading);
        assert!(store.last_error().is_some());
        assert!(store.is_subscribed());

        backend.publish_config(zone(5.0));
        assert_eq!(store.phase(), GeofencePhase::Ready);
        assert!(store.last_error().is_none());
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent() {
        let backend = Arc::new(MemoryBackend::with_config(zone(5.0)));
        let store = GeofenceStore::new(backend.clone());
        store.deactivate();

        store.activate().await;
        store.deactivate();
        store.deactivate();
        assert!(!store.is_subscribed());
        assert_eq!(backend.live_subscriptions(), 0);

        let revision = store.revision();
        backend.publish_config(zone(1.0));
        assert_eq!(store.revision(), revision);
    }

    #[tokio::test]
    async fn test_reactivation_replaces_subscription() {
        let backend = Arc::new(MemoryBackend::with_config(zone(5.0)));
        let store = GeofenceStore::new(backend.clone());
        store.activate().await;
        store.activate().await;

        assert_eq!(backend.subscriptions_opened(), 2);
        assert_eq!(backend.live_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_good_fetch_keeps_subscription_failure_visible() {
        let backend = Arc::new(MemoryBackend::with_config(zone(5.0)));
        backend.fail_next_subscribe(SparrowError::SubscriptionFailed("stream refused".into()));
        let store = GeofenceStore::new(backend.clone());
        store.activate().await;

        assert_eq!(store.phase(), GeofencePhase::Ready);
        assert!(!store.is_subscribed());
        assert!(store.last_error().unwrap().contains("stream refused"));
    }

    #[tokio::test]
    async fn test_deactivate_during_slow_fetch_releases_subscription() {
        let backend = Arc::new(MemoryBackend::with_config(zone(5.0)));
        let source = Arc::new(SlowFetch {
            inner: backend.clone(),
            release: Notify::new(),
        });
        let store = Arc::new(GeofenceStore::new(source.clone()));

        let activating = tokio::spawn({
            let store = store.clone();
            async move { store.activate().await }
        });
        while backend.live_subscriptions() == 0 {
            tokio::task::yield_now().await;
        }

        store.deactivate();
        source.release.notify_one();
        activating.await.unwrap();

        assert!(!store.is_subscribed());
        assert_eq!(backend.live_subscriptions(), 0);
        // the fetched value still lands
        assert_eq!(store.phase(), GeofencePhase::Ready);
    }
}
