// src/services/backend.rs
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tracing;

use crate::{
    errors::{SparrowError, SparrowResult},
    models::{geofence::GeofenceConfig, order::OrderSnapshot},
    services::subscription::{EventSink, SourceEvent},
};

/// Backend-owned source of the geofence configuration.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// One-shot read of the current configuration.
    async fn fetch_config(&self) -> SparrowResult<Option<GeofenceConfig>>;

    /// Starts pushing configuration changes into `sink` until its
    /// subscription is cancelled.
    async fn subscribe_config(&self, sink: EventSink<GeofenceConfig>) -> SparrowResult<()>;
}

/// Backend-owned source of order snapshots.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Pushes the full order collection, newest first, on every change.
    async fn subscribe_orders(&self, sink: EventSink<Vec<OrderSnapshot>>) -> SparrowResult<()>;

    /// Pushes one order, or `None` while it does not exist.
    async fn subscribe_order(
        &self,
        order_id: &str,
        sink: EventSink<Option<OrderSnapshot>>,
    ) -> SparrowResult<()>;
}

/// Newest first by creation time; orders without a timestamp sink to the end.
pub fn sort_newest_first(orders: &mut [OrderSnapshot]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process backend. Every mutation is delivered synchronously to the
/// live sinks before the mutating call returns.
#[derive(Default)]
pub struct MemoryBackend {
    config: RwLock<Option<GeofenceConfig>>,
    orders: RwLock<BTreeMap<String, OrderSnapshot>>,
    config_sinks: Mutex<Vec<EventSink<GeofenceConfig>>>,
    order_list_sinks: Mutex<Vec<EventSink<Vec<OrderSnapshot>>>>,
    order_sinks: Mutex<Vec<(String, EventSink<Option<OrderSnapshot>>)>>,
    fetch_error: Mutex<Option<SparrowError>>,
    subscribe_error: Mutex<Option<SparrowError>>,
    subscriptions_opened: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GeofenceConfig) -> Self {
        let backend = Self::default();
        *backend.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
        backend
    }

    /// Replaces the stored configuration and pushes it to subscribers.
    pub fn publish_config(&self, config: GeofenceConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
        let sinks = lock(&self.config_sinks).clone();
        for sink in &sinks {
            sink.data(config);
        }
        lock(&self.config_sinks).retain(|sink| !sink.is_closed());
    }

    pub fn upsert_order(&self, order: OrderSnapshot) {
        let id = order.id.clone();
        self.orders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), order);
        self.broadcast_order(&id);
    }

    pub fn remove_order(&self, order_id: &str) {
        self.orders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(order_id);
        self.broadcast_order(order_id);
    }

    /// Delivers a transport error to every live order subscriber.
    pub fn fail_orders(&self, error: SparrowError) {
        let lists = lock(&self.order_list_sinks).clone();
        for sink in &lists {
            sink.error(error.clone());
        }
        let singles = lock(&self.order_sinks).clone();
        for (_, sink) in &singles {
            sink.error(error.clone());
        }
    }

    pub fn fail_config(&self, error: SparrowError) {
        let sinks = lock(&self.config_sinks).clone();
        for sink in &sinks {
            sink.error(error.clone());
        }
    }

    /// Makes the next one-shot fetch fail with `error`.
    pub fn fail_next_fetch(&self, error: SparrowError) {
        *lock(&self.fetch_error) = Some(error);
    }

    /// Makes the next subscription attempt fail with `error`.
    pub fn fail_next_subscribe(&self, error: SparrowError) {
        *lock(&self.subscribe_error) = Some(error);
    }

    /// Total subscriptions ever opened, including cancelled ones.
    pub fn subscriptions_opened(&self) -> usize {
        self.subscriptions_opened.load(Ordering::SeqCst)
    }

    /// Subscriptions that have not been cancelled yet.
    pub fn live_subscriptions(&self) -> usize {
        let config = lock(&self.config_sinks).iter().filter(|s| !s.is_closed()).count();
        let lists = lock(&self.order_list_sinks).iter().filter(|s| !s.is_closed()).count();
        let singles = lock(&self.order_sinks).iter().filter(|(_, s)| !s.is_closed()).count();
        config + lists + singles
    }

    pub fn orders(&self) -> Vec<OrderSnapshot> {
        let mut orders: Vec<OrderSnapshot> = self
            .orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sort_newest_first(&mut orders);
        orders
    }

    pub fn order(&self, order_id: &str) -> Option<OrderSnapshot> {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(order_id)
            .cloned()
    }

    fn broadcast_order(&self, order_id: &str) {
        let lists = lock(&self.order_list_sinks).clone();
        if !lists.is_empty() {
            let orders = self.orders();
            for sink in &lists {
                sink.data(orders.clone());
            }
        }

        let singles = lock(&self.order_sinks).clone();
        let current = self.order(order_id);
        for (id, sink) in &singles {
            if id == order_id {
                sink.data(current.clone());
            }
        }

        lock(&self.order_list_sinks).retain(|sink| !sink.is_closed());
        lock(&self.order_sinks).retain(|(_, sink)| !sink.is_closed());
    }

    fn begin_subscribe(&self) -> SparrowResult<()> {
        if let Some(error) = lock(&self.subscribe_error).take() {
            return Err(error);
        }
        self.subscriptions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ConfigSource for MemoryBackend {
    async fn fetch_config(&self) -> SparrowResult<Option<GeofenceConfig>> {
        if let Some(error) = lock(&self.fetch_error).take() {
            return Err(error);
        }
        Ok(*self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    async fn subscribe_config(&self, sink: EventSink<GeofenceConfig>) -> SparrowResult<()> {
        self.begin_subscribe()?;
        tracing::debug!("[MEMORY] Config subscription {} opened", sink.subscription_id());

        let current = *self.config.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(config) = current {
            sink.send(SourceEvent::Data(config));
        }
        lock(&self.config_sinks).push(sink);
        Ok(())
    }
}

#[async_trait]
impl OrderSource for MemoryBackend {
    async fn subscribe_orders(&self, sink: EventSink<Vec<OrderSnapshot>>) -> SparrowResult<()> {
        self.begin_subscribe()?;
        tracing::debug!("[MEMORY] Order list subscription {} opened", sink.subscription_id());

        sink.data(self.orders());
        lock(&self.order_list_sinks).push(sink);
        Ok(())
    }

    async fn subscribe_order(
        &self,
        order_id: &str,
        sink: EventSink<Option<OrderSnapshot>>,
    ) -> SparrowResult<()> {
        self.begin_subscribe()?;
        tracing::debug!(
            "[MEMORY] Order {} subscription {} opened",
            order_id,
            sink.subscription_id()
        );

        sink.data(self.order(order_id));
        lock(&self.order_sinks).push((order_id.to_string(), sink));
        Ok(())
    }
}
