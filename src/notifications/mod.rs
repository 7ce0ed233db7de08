//! Notification hub: fans job changes out to connected observers.
//!
//! Subscribers receive a full snapshot on registration followed by deltas.
//! Non-essential deltas with the same fingerprint are throttled to one per
//! dedup window.

mod message;

pub use message::{jobs_payload, HubMessage, MessageType};

use crate::state::{Job, JobStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default interval during which same-shaped updates are suppressed.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(2);

/// Receiving half handed to a subscriber's writer task.
pub type HubReceiver = mpsc::UnboundedReceiver<Arc<HubMessage>>;

#[derive(Default)]
struct HubInner {
    subscribers: HashMap<Uuid, mpsc::UnboundedSender<Arc<HubMessage>>>,
    last_sent: HashMap<String, Instant>,
}

pub struct Hub {
    inner: Mutex<HubInner>,
    store: Arc<JobStore>,
    window: Duration,
}

/// A registered subscriber. Dropping it does not unregister; call
/// [`Hub::unsubscribe`] or let the next broadcast prune the closed channel.
pub struct Subscription {
    pub id: Uuid,
    pub rx: HubReceiver,
}

impl Hub {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self::with_window(store, DEDUP_WINDOW)
    }

    pub fn with_window(store: Arc<JobStore>, window: Duration) -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
            store,
            window,
        }
    }

    /// Register a subscriber and queue the RefreshFiles snapshot.
    ///
    /// The snapshot is taken under the hub lock, so no delta can slip in
    /// between it and the registration.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut inner = self.inner.lock();
        let jobs = self.store.snapshot();
        let refresh = HubMessage::new(MessageType::RefreshFiles, true, jobs_payload(&jobs));
        // The receiver is still in hand, so this cannot fail.
        let _ = tx.send(Arc::new(refresh));
        inner.subscribers.insert(id, tx);

        tracing::debug!(subscriber = %id, jobs = jobs.len(), "Subscriber registered");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        if self.inner.lock().subscribers.remove(&id).is_some() {
            tracing::debug!(subscriber = %id, "Subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Deliver a message to every subscriber.
    ///
    /// Returns `false` when the message was throttled.
    pub fn broadcast(&self, kind: MessageType, must_send: bool, data: Value) -> bool {
        let message = HubMessage::new(kind, must_send, data);
        let fingerprint = message.fingerprint();
        let now = Instant::now();

        let mut inner = self.inner.lock();
        if !must_send {
            if let Some(last) = inner.last_sent.get(&fingerprint) {
                if now.duration_since(*last) < self.window {
                    tracing::trace!(kind = kind.as_str(), "Throttled duplicate notification");
                    return false;
                }
            }
        }

        let window = self.window;
        inner
            .last_sent
            .retain(|_, sent| now.duration_since(*sent) < window);
        inner.last_sent.insert(fingerprint, now);

        let message = Arc::new(message);
        inner.subscribers.retain(|id, tx| {
            let alive = tx.send(Arc::clone(&message)).is_ok();
            if !alive {
                tracing::debug!(subscriber = %id, "Dropping closed subscriber");
            }
            alive
        });

        if inner.subscribers.is_empty() {
            tracing::trace!(kind = kind.as_str(), "No subscribers for notification");
        }
        true
    }

    /// Broadcast a single-job delta keyed by the job's ID.
    pub fn publish_job(&self, kind: MessageType, must_send: bool, job: &Job) -> bool {
        self.broadcast(kind, must_send, jobs_payload([job]))
    }
}
