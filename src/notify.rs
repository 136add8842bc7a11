//! Publish/subscribe feed of projection changes.
//!
//! The [`Notifier`] keeps the last published [`Projection`] and a list of
//! subscriber callbacks. [`Notifier::publish`] stores the new projection and
//! then calls every subscriber synchronously, in registration order. A
//! subscriber registered late is immediately handed the current projection
//! with [`Notification::Invalidate`].

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::trace;

use crate::model::projection::Projection;
use crate::model::types::SnapshotId;

/// One entry a mutation changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChangedEntry {
    /// A snapshot was added to the active timeline.
    Snapshot { id: SnapshotId },
    /// A section marker was created on this snapshot.
    Annotation { id: SnapshotId },
    /// Head moved.
    Head {
        previous: Option<SnapshotId>,
        current: SnapshotId,
    },
}

/// What subscribers are told after a publish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "entries", rename_all = "kebab-case")]
pub enum Notification {
    /// Everything may have changed; re-read the whole projection.
    Invalidate,
    /// Only these entries changed.
    Changed(Vec<ChangedEntry>),
}

type Callback = Arc<dyn Fn(&Projection, &Notification) + Send + Sync>;

/// Handle returned by [`Notifier::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

/// Single-producer, multi-consumer feed of published projections.
#[derive(Default)]
pub struct Notifier {
    current: RwLock<Arc<Projection>>,
    subscribers: Mutex<Subscribers>,
}

impl Notifier {
    /// A notifier whose current projection is `initial`.
    #[must_use]
    pub fn new(initial: Projection) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            subscribers: Mutex::new(Subscribers::default()),
        }
    }

    /// The last published projection.
    #[must_use]
    pub fn current(&self) -> Arc<Projection> {
        Arc::clone(&self.current.read())
    }

    /// Register `callback`. It is called once right away with the current
    /// projection and [`Notification::Invalidate`], then on every publish.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Projection, &Notification) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let id = {
            let mut subs = self.subscribers.lock();
            let id = SubscriptionId(subs.next_id);
            subs.next_id += 1;
            subs.callbacks.push((id, Arc::clone(&callback)));
            id
        };
        let current = self.current();
        callback(&current, &Notification::Invalidate);
        id
    }

    /// Remove a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.callbacks.len();
        subs.callbacks.retain(|(sub, _)| *sub != id);
        subs.callbacks.len() != before
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().callbacks.len()
    }

    /// Store `projection` as current and notify every subscriber in order.
    ///
    /// Callbacks run without any notifier lock held, so they may read
    /// [`Notifier::current`] or subscribe further listeners.
    pub fn publish(&self, projection: Projection, notification: &Notification) {
        let projection = Arc::new(projection);
        *self.current.write() = Arc::clone(&projection);

        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        trace!(subscribers = callbacks.len(), ?notification, "publishing projection");
        for callback in callbacks {
            callback(&projection, notification);
        }
    }
}
