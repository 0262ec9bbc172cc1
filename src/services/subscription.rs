// src/services/subscription.rs
//! Cancellation handles for live backend subscriptions.
//!
//! A source delivers into an [`EventSink`]; the consumer keeps the paired
//! [`Subscription`]. Both share a gate: delivery holds it while the callback
//! runs and cancellation closes it, so once [`Subscription::cancel`] returns
//! no further callback can start.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

use crate::errors::SparrowError;
use crate::utils::id_generator::generate_subscription_id;

/// What a push source hands to a subscriber.
#[derive(Debug, Clone)]
pub enum SourceEvent<T> {
    /// A complete replacement value.
    Data(T),
    /// Out-of-band transport failure. Carries no data.
    Error(SparrowError),
}

type Callback<T> = Arc<dyn Fn(SourceEvent<T>) + Send + Sync>;

struct Gate {
    id: String,
    open: Mutex<bool>,
    pump: Mutex<Option<AbortHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Producer side of a subscription.
pub struct EventSink<T> {
    gate: Arc<Gate>,
    callback: Callback<T>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            callback: self.callback.clone(),
        }
    }
}

impl<T> fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("subscription_id", &self.gate.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> EventSink<T> {
    /// Delivers `event` to the subscriber. Returns `false` once the
    /// subscription has been cancelled; the event is then dropped.
    pub fn send(&self, event: SourceEvent<T>) -> bool {
        let open = lock(&self.gate.open);
        if !*open {
            return false;
        }
        (self.callback)(event);
        true
    }

    pub fn data(&self, value: T) -> bool {
        self.send(SourceEvent::Data(value))
    }

    pub fn error(&self, error: SparrowError) -> bool {
        self.send(SourceEvent::Error(error))
    }

    pub fn is_closed(&self) -> bool {
        !*lock(&self.gate.open)
    }

    pub fn subscription_id(&self) -> &str {
        &self.gate.id
    }

    /// Delivers a last error and closes the subscription from the source
    /// side, for streams that cannot be resumed. The consumer then sees
    /// `is_active() == false`. Returns `false` if it was already closed.
    pub fn finish(&self, error: SparrowError) -> bool {
        let mut open = lock(&self.gate.open);
        if !*open {
            return false;
        }
        (self.callback)(SourceEvent::Error(error));
        *open = false;
        drop(open);

        // the caller is the pump itself; let it return on its own
        lock(&self.gate.pump).take();
        tracing::debug!("Subscription {} closed by its source", self.gate.id);
        true
    }

    /// Ties a pump task to the subscription so cancelling aborts it.
    pub fn attach(&self, pump: AbortHandle) {
        let open = lock(&self.gate.open);
        if *open {
            *lock(&self.gate.pump) = Some(pump);
        } else {
            pump.abort();
        }
    }
}

/// Consumer side of a subscription. Dropping it cancels.
pub struct Subscription {
    gate: Arc<Gate>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.gate.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.gate.id
    }

    pub fn is_active(&self) -> bool {
        *lock(&self.gate.open)
    }

    /// Unsubscribes. Safe to call any number of times; only the first call
    /// has an effect and its return value is `true`.
    ///
    /// Must not be called from inside the subscription's own callback.
    pub fn cancel(&self) -> bool {
        let mut open = lock(&self.gate.open);
        if !*open {
            return false;
        }
        *open = false;
        drop(open);

        if let Some(pump) = lock(&self.gate.pump).take() {
            pump.abort();
        }
        tracing::debug!("Subscription {} cancelled", self.gate.id);
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Creates a connected sink/subscription pair around `callback`.
pub fn open<T, F>(callback: F) -> (EventSink<T>, Subscription)
where
    F: Fn(SourceEvent<T>) + Send + Sync + 'static,
{
    let gate = Arc::new(Gate {
        id: generate_subscription_id(),
        open: Mutex::new(true),
        pump: Mutex::new(None),
    });
    let sink = EventSink {
        gate: gate.clone(),
        callback: Arc::new(callback),
    };
    (sink, Subscription { gate })
}
