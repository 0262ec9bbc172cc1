// src/services/order_service.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing;

use crate::{
    errors::{SparrowError, SparrowResult},
    models::order::{ActiveDeliverySummary, LiveState, OrderSnapshot},
    services::{
        backend::OrderSource,
        subscription::{self, EventSink, SourceEvent, Subscription},
    },
};

type LiveSender<T> = Arc<watch::Sender<LiveState<T>>>;

/// Builds the sink that folds source events into a published `LiveState`.
fn live_sink<T>(state: LiveSender<T>, label: String) -> (EventSink<T>, Subscription)
where
    T: Send + Sync + 'static,
{
    subscription::open(move |event| match event {
        SourceEvent::Data(data) => {
            tracing::debug!("{} updated", label);
            state.send_modify(|state| {
                state.data = data;
                state.loading = false;
                state.error = None;
            });
        }
        SourceEvent::Error(e) => {
            if e.is_transport() {
                tracing::warn!("{} transport error: {}", label, e);
            } else {
                tracing::error!("{} failed: {}", label, e);
            }
            state.send_modify(|state| {
                state.loading = false;
                state.error = Some(e.to_string());
            });
        }
    })
}

fn fail_setup<T>(state: &watch::Sender<LiveState<T>>, label: &str, error: SparrowError) {
    tracing::error!("{} subscription failed: {}", label, error);
    state.send_modify(|state| {
        state.loading = false;
        state.error = Some(error.to_string());
    });
}

/// A live view onto one subscription: the latest `LiveState` plus the
/// handle that keeps the subscription open. Dropping the feed cancels it.
pub struct LiveFeed<T> {
    state: watch::Receiver<LiveState<T>>,
    // keeps the publisher alive for feeds that never subscribed
    _publisher: LiveSender<T>,
    subscription: Option<Subscription>,
}

impl<T: Clone> LiveFeed<T> {
    pub fn current(&self) -> LiveState<T> {
        self.state.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<LiveState<T>> {
        self.state.clone()
    }

    /// Waits for the next published state.
    pub async fn changed(&mut self) -> SparrowResult<LiveState<T>> {
        self.state
            .changed()
            .await
            .map_err(|_| SparrowError::ChannelClosed)?;
        Ok(self.state.borrow_and_update().clone())
    }

    /// Waits until the feed has stopped loading, or `timeout` elapses.
    pub async fn settled(&mut self, timeout: Duration) -> SparrowResult<LiveState<T>> {
        let waited = tokio::time::timeout(timeout, self.state.wait_for(|state| !state.loading)).await;
        match waited {
            Ok(Ok(state)) => Ok((*state).clone()),
            Ok(Err(_)) => Err(SparrowError::ChannelClosed),
            Err(_) => Err(SparrowError::NetworkTimeout),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_ref().map(Subscription::id)
    }

    /// Idempotent.
    pub fn cancel(&self) {
        if let Some(subscription) = &self.subscription {
            subscription.cancel();
        }
    }
}

impl LiveFeed<Vec<OrderSnapshot>> {
    pub fn active_delivery(&self) -> Option<ActiveDeliverySummary> {
        ActiveDeliverySummary::from_orders(&self.state.borrow().data)
    }
}

/// Entry point for live order state. One instance per session, shared by
/// every view that needs orders.
pub struct OrderChannel {
    source: Arc<dyn OrderSource>,
}

impl OrderChannel {
    pub fn new(source: Arc<dyn OrderSource>) -> Self {
        Self { source }
    }

    /// Opens one subscription over the full order set.
    pub async fn subscribe_all(&self) -> LiveFeed<Vec<OrderSnapshot>> {
        let (state, receiver) = watch::channel(LiveState::loading());
        let state = Arc::new(state);
        let (sink, subscription) = live_sink(state.clone(), "Order list".to_string());

        let subscription = match self.source.subscribe_orders(sink).await {
            Ok(()) => Some(subscription),
            Err(e) => {
                fail_setup(&state, "Order list", e);
                None
            }
        };

        LiveFeed {
            state: receiver,
            _publisher: state,
            subscription,
        }
    }

    /// Opens one subscription for `order_id`. Without an id nothing is
    /// opened and the feed settles immediately with no data.
    pub async fn subscribe_one(&self, order_id: Option<&str>) -> LiveFeed<Option<OrderSnapshot>> {
        let Some(order_id) = order_id.filter(|id| !id.is_empty()) else {
            let (state, receiver) = watch::channel(LiveState::idle());
            return LiveFeed {
                state: receiver,
                _publisher: Arc::new(state),
                subscription: None,
            };
        };

        let (state, receiver) = watch::channel(LiveState::loading());
        let state = Arc::new(state);
        let label = format!("Order {}", order_id);
        let (sink, subscription) = live_sink(state.clone(), label.clone());

        let subscription = match self.source.subscribe_order(order_id, sink).await {
            Ok(()) => Some(subscription),
            Err(e) => {
                fail_setup(&state, &label, e);
                None
            }
        };

        LiveFeed {
            state: receiver,
            _publisher: state,
            subscription,
        }
    }

    pub fn tracker(&self) -> OrderTracker {
        OrderTracker::new(self.source.clone())
    }
}

/// A single consumer following one order at a time, e.g. an order-detail
/// view whose id can change.
///
/// Switching ids cancels the previous subscription before the next one is
/// opened, so at most one order is live and no event for the old id is
/// published after the switch.
pub struct OrderTracker {
    source: Arc<dyn OrderSource>,
    state: LiveSender<Option<OrderSnapshot>>,
    current: Mutex<Option<(String, Subscription)>>,
}

impl OrderTracker {
    pub fn new(source: Arc<dyn OrderSource>) -> Self {
        let (state, _) = watch::channel(LiveState::idle());
        Self {
            source,
            state: Arc::new(state),
            current: Mutex::new(None),
        }
    }

    pub async fn track(&self, order_id: Option<&str>) {
        let order_id = order_id.filter(|id| !id.is_empty());
        let mut current = self.current.lock().await;

        if let (Some((tracked, subscription)), Some(requested)) = (current.as_ref(), order_id) {
            if tracked == requested && subscription.is_active() {
                return;
            }
        }

        if let Some((previous, subscription)) = current.take() {
            subscription.cancel();
            tracing::debug!("Stopped tracking order {}", previous);
        }

        let Some(order_id) = order_id else {
            self.state.send_replace(LiveState::idle());
            return;
        };

        self.state.send_replace(LiveState::loading());
        let label = format!("Order {}", order_id);
        let (sink, subscription) = live_sink(self.state.clone(), label.clone());

        match self.source.subscribe_order(order_id, sink).await {
            Ok(()) => {
                tracing::debug!("Tracking order {}", order_id);
                *current = Some((order_id.to_string(), subscription));
            }
            Err(e) => fail_setup(&self.state, &label, e),
        }
    }

    /// Stops tracking. Idempotent; safe to race with `track`.
    pub async fn teardown(&self) {
        if let Some((order_id, subscription)) = self.current.lock().await.take() {
            subscription.cancel();
            tracing::debug!("Tracker for order {} torn down", order_id);
        }
    }

    pub async fn tracked_order(&self) -> Option<String> {
        self.current.lock().await.as_ref().map(|(id, _)| id.clone())
    }

    pub fn current(&self) -> LiveState<Option<OrderSnapshot>> {
        self.state.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<LiveState<Option<OrderSnapshot>>> {
        self.state.subscribe()
    }
}
