//! Best-effort topic publish/subscribe.
//!
//! Every subscriber owns a bounded queue. `publish` never waits: when a
//! subscriber's queue is full the message being published is dropped for that
//! subscriber only (drop-newest), leaving its backlog intact and in order.
//!
//! Topic matching is two-level: an event on `kind:scope` reaches subscribers
//! of `kind:scope` and of `kind`. An empty topic set receives everything.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use easel_core::error::EaselError;

/// Whether an event published on `topic` should reach a subscriber of `topics`.
pub fn topic_matches(topics: &HashSet<String>, topic: &str) -> bool {
    if topics.is_empty() || topics.contains(topic) {
        return true;
    }
    topic
        .split_once(':')
        .is_some_and(|(kind, _)| topics.contains(kind))
}

/// A published message as seen by subscribers.
#[derive(Debug)]
pub struct Envelope<M> {
    pub topic: String,
    pub payload: M,
}

/// Counters exposed for health and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub subscribers: usize,
    pub published: u64,
    pub dropped: u64,
}

/// Fan-out bus shared by every producer and connection. Cheap to clone.
pub struct TopicBus<M> {
    inner: Arc<BusInner<M>>,
}

impl<M> Clone for TopicBus<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct BusInner<M> {
    name: &'static str,
    capacity: usize,
    next_id: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    subscribers: RwLock<HashMap<u64, SubscriberEntry<M>>>,
}

struct SubscriberEntry<M> {
    topics: HashSet<String>,
    tx: mpsc::Sender<Arc<Envelope<M>>>,
}

impl<M> BusInner<M> {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<u64, SubscriberEntry<M>>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u64, SubscriberEntry<M>>> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_topics(&self, id: u64, topics: &HashSet<String>) {
        if let Some(entry) = self.write().get_mut(&id) {
            entry.topics = topics.clone();
        }
    }
}

impl<M: Send + Sync + 'static> TopicBus<M> {
    /// Create a bus whose subscribers each buffer up to `capacity` messages.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                name,
                capacity: capacity.max(1),
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                subscribers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a subscriber. An empty topic list receives everything.
    pub fn subscribe<I, S>(&self, topics: I) -> Subscription<M>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let topics: HashSet<String> = topics.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(self.inner.capacity);

        self.inner.write().insert(
            id,
            SubscriberEntry {
                topics: topics.clone(),
                tx,
            },
        );
        debug!(bus = self.inner.name, subscriber = id, ?topics, "Subscribed");

        Subscription {
            id,
            topics,
            rx,
            bus: self.inner.clone(),
        }
    }

    /// Deliver `payload` to every matching subscriber without waiting.
    ///
    /// Returns how many subscribers accepted the message. This is a
    /// diagnostic count, not a delivery guarantee.
    pub fn publish(&self, topic: &str, payload: M) -> usize {
        let envelope = Arc::new(Envelope {
            topic: topic.to_string(),
            payload,
        });
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let mut reached = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self.inner.read();
            for (id, entry) in subscribers.iter() {
                if !topic_matches(&entry.topics, topic) {
                    continue;
                }
                match entry.tx.try_send(envelope.clone()) {
                    Ok(()) => reached += 1,
                    Err(TrySendError::Full(_)) => {
                        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                        let err = EaselError::SlowConsumer {
                            subscriber: *id,
                            topic: topic.to_string(),
                        };
                        warn!(bus = self.inner.name, error = %err, "Dropped message");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.inner.write();
            for id in &closed {
                subscribers.remove(id);
            }
            debug!(bus = self.inner.name, pruned = closed.len(), "Pruned closed subscribers");
        }

        debug!(bus = self.inner.name, topic, reached, "Published");
        reached
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().len()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            subscribers: self.subscriber_count(),
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }
}

/// A live registration on a [`TopicBus`]. Dropping it unregisters.
pub struct Subscription<M> {
    id: u64,
    topics: HashSet<String>,
    rx: mpsc::Receiver<Arc<Envelope<M>>>,
    bus: Arc<BusInner<M>>,
}

impl<M> Subscription<M> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topics(&self) -> &HashSet<String> {
        &self.topics
    }

    /// Add topics. Returns how many were newly added.
    pub fn add_topics<I, S>(&mut self, topics: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.topics.len();
        self.topics.extend(topics.into_iter().map(Into::into));
        self.bus.set_topics(self.id, &self.topics);
        self.topics.len() - before
    }

    /// Remove topics. Returns how many were actually removed.
    ///
    /// Removing the last topic makes this a wildcard subscription.
    pub fn remove_topics<I, S>(&mut self, topics: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.topics.len();
        for t in topics {
            self.topics.remove(t.as_ref());
        }
        self.bus.set_topics(self.id, &self.topics);
        before - self.topics.len()
    }

    /// Next matching message, or `None` once the bus is gone.
    ///
    /// Messages queued before an unsubscribe are filtered with the same rule
    /// the publisher applies.
    pub async fn recv(&mut self) -> Option<Arc<Envelope<M>>> {
        loop {
            let envelope = self.rx.recv().await?;
            if topic_matches(&self.topics, &envelope.topic) {
                return Some(envelope);
            }
        }
    }

    /// Non-waiting variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Arc<Envelope<M>>> {
        while let Ok(envelope) = self.rx.try_recv() {
            if topic_matches(&self.topics, &envelope.topic) {
                return Some(envelope);
            }
        }
        None
    }
}

impl<M> Drop for Subscription<M> {
    fn drop(&mut self) {
        self.bus.write().remove(&self.id);
        debug!(bus = self.bus.name, subscriber = self.id, "Unsubscribed");
    }
}
