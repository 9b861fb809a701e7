//! Per-category subscription fan-out.
//!
//! Consumers subscribe callbacks for one or more categories and receive every
//! coalesced notification matching their set. Delivery happens on the
//! monitor's single dispatch thread, so consumers never need their own
//! synchronization and a notification fired during dispatch is queued, never
//! delivered re-entrantly.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{Category, CategorySet, Notification};

/// Callback invoked with each matching notification.
pub type NotificationCallback = dyn Fn(&Notification) + Send + Sync;

/// Identity of one subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

struct Subscriber {
    categories: CategorySet,
    callback: Arc<NotificationCallback>,
}

struct BusInner {
    next_id: u64,
    subscribers: HashMap<SubscriptionId, Subscriber>,
}

/// Subscriber table keyed by subscription id.
///
/// `dispatch` is not re-entrant with respect to ordering guarantees and is
/// intended to be driven by one thread; subscription management is safe from
/// any thread, including from inside a callback.
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                next_id: 1,
                subscribers: HashMap::new(),
            }),
        }
    }

    /// Subscribe a callback to a single category.
    pub fn subscribe<F>(&self, category: Category, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.subscribe_set(category.into(), callback)
    }

    /// Subscribe a callback to a set of categories.
    pub fn subscribe_set<F>(&self, categories: CategorySet, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.insert(
            id,
            Subscriber {
                categories,
                callback: Arc::new(callback),
            },
        );
        id
    }

    /// Remove a subscription. Returns false when the id is unknown or
    /// already removed; other subscriptions are unaffected.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock().subscribers.remove(&id).is_some()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Deliver a notification to every matching subscriber.
    ///
    /// Callbacks run outside the table lock, so a callback may subscribe or
    /// unsubscribe without deadlocking. A panicking callback is caught and
    /// logged; it never blocks delivery to other subscribers or later
    /// notifications.
    pub fn dispatch(&self, notification: &Notification) {
        let matching: Vec<(SubscriptionId, Arc<NotificationCallback>)> = {
            let inner = self.inner.lock();
            inner
                .subscribers
                .iter()
                .filter(|(_, s)| s.categories.contains(notification.category.into()))
                .map(|(id, s)| (*id, Arc::clone(&s.callback)))
                .collect()
        };

        for (id, callback) in matching {
            if catch_unwind(AssertUnwindSafe(|| callback(notification))).is_err() {
                tracing::error!(
                    "[bus] subscriber {} panicked during {} dispatch",
                    id.value(),
                    notification.category
                );
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
