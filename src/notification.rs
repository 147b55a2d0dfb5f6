use crate::telemetry::TelemetryItem;
use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
};

/// Why telemetry items were discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DiscardReason {
    /// The item failed structural validation in `track`.
    InvalidEvent,
}

/// What caused a channel to send a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SendRequestReason {
    /// The batch interval (or retry delay) elapsed.
    NormalSchedule,
    /// The host asked for a flush.
    ManualFlush,
    /// Adding the next item would exceed the maximum batch size.
    MaxBatchSize,
    /// The host is going away.
    Unload,
}

/// Observer of pipeline events.
pub trait NotificationListener: Debug + Send + Sync {
    /// Items were dropped before reaching any channel.
    fn events_discarded(&self, _items: &[TelemetryItem], _reason: DiscardReason) {}

    /// A channel is about to send a batch.
    fn events_send_request(&self, _reason: SendRequestReason) {}
}

/// Fans notifications out to the registered listeners.
#[derive(Debug, Default)]
pub struct NotificationManager {
    listeners: Mutex<Vec<Arc<dyn NotificationListener>>>,
}

impl NotificationManager {
    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.lock().push(listener);
    }

    /// Unregister a listener previously added with [`add_listener`](Self::add_listener).
    pub fn remove_listener(&self, listener: &Arc<dyn NotificationListener>) {
        self.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub(crate) fn events_discarded(&self, items: &[TelemetryItem], reason: DiscardReason) {
        for listener in self.snapshot() {
            listener.events_discarded(items, reason);
        }
    }

    pub(crate) fn events_send_request(&self, reason: SendRequestReason) {
        for listener in self.snapshot() {
            listener.events_send_request(reason);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn NotificationListener>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn NotificationListener>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}
