//! One record kind with its set of subscribers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ctsd_types::{LimitsEvent, PacketSnapshot, ServerMessage};
use parking_lot::RwLock;
use tracing::debug;

use super::queue::SubscriberQueue;
use crate::error::{Error, NotFoundKind, Result};

/// Opaque subscriber handle. Unique across every channel of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record that can travel through a hub channel.
pub trait Record: Clone + Send + Sync + 'static {
    /// `(target, packet)` the record belongs to, if any. Used by filters.
    fn topic(&self) -> Option<(&str, &str)> {
        None
    }
}

impl Record for LimitsEvent {
    fn topic(&self) -> Option<(&str, &str)> {
        Some((&self.target, &self.packet))
    }
}

impl Record for PacketSnapshot {
    fn topic(&self) -> Option<(&str, &str)> {
        Some((&self.target, &self.packet))
    }
}

impl Record for ServerMessage {}

/// Restricts a subscription to records of the listed packets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    packets: Vec<(String, String)>,
}

impl Filter {
    /// A filter that accepts everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn packet(mut self, target: impl Into<String>, packet: impl Into<String>) -> Self {
        self.packets.push((target.into(), packet.into()));
        self
    }

    fn accepts<T: Record>(&self, record: &T) -> bool {
        if self.packets.is_empty() {
            return true;
        }
        match record.topic() {
            Some((target, packet)) => self
                .packets
                .iter()
                .any(|(t, p)| t == target && p == packet),
            None => true,
        }
    }
}

struct Subscriber<T> {
    queue: SubscriberQueue<T>,
    filter: Filter,
}

pub struct Channel<T> {
    kind: &'static str,
    default_depth: usize,
    subscribers: RwLock<BTreeMap<SubscriberId, Arc<Subscriber<T>>>>,
}

impl<T: Record> Channel<T> {
    pub(crate) fn new(kind: &'static str, default_depth: usize) -> Self {
        Self {
            kind,
            default_depth,
            subscribers: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn subscribe(&self, id: SubscriberId, filter: Filter, depth: Option<usize>) -> Result<SubscriberId> {
        let depth = depth.unwrap_or(self.default_depth);
        if depth == 0 {
            return Err(Error::invalid("queue depth must be at least 1"));
        }
        let subscriber = Arc::new(Subscriber {
            queue: SubscriberQueue::new(depth),
            filter,
        });
        self.subscribers.write().insert(id, subscriber);
        debug!(channel = self.kind, %id, depth, "Subscribed");
        Ok(id)
    }

    /// Remove a subscriber and discard its unread records.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<()> {
        let subscriber = self
            .subscribers
            .write()
            .remove(&id)
            .ok_or_else(|| Error::not_found(NotFoundKind::Subscriber, id.to_string()))?;
        subscriber.queue.close();
        debug!(channel = self.kind, %id, "Unsubscribed");
        Ok(())
    }

    fn subscriber(&self, id: SubscriberId) -> Result<Arc<Subscriber<T>>> {
        self.subscribers
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(NotFoundKind::Subscriber, id.to_string()))
    }

    /// Deliver a record to every matching subscriber. Returns how many received it.
    pub fn publish(&self, record: T) -> usize {
        let subscribers = self.subscribers.read();
        let mut delivered = 0;
        for (id, subscriber) in subscribers.iter() {
            if !subscriber.filter.accepts(&record) {
                continue;
            }
            if subscriber.queue.push(record.clone()) {
                debug!(channel = self.kind, %id, "Subscriber queue full, dropped oldest record");
            }
            delivered += 1;
        }
        delivered
    }

    /// Oldest record for `id`, waiting up to `timeout`. `None` on timeout.
    pub async fn get(&self, id: SubscriberId, timeout: Duration) -> Result<Option<T>> {
        let subscriber = self.subscriber(id)?;
        Ok(subscriber.queue.pop(timeout).await)
    }

    /// Records dropped from `id`'s queue because it was full.
    pub fn dropped(&self, id: SubscriberId) -> Result<u64> {
        Ok(self.subscriber(id)?.queue.dropped())
    }

    /// Unread records waiting for `id`.
    pub fn backlog(&self, id: SubscriberId) -> Result<usize> {
        Ok(self.subscriber(id)?.queue.len())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Dispose every subscriber, waking blocked readers.
    pub(crate) fn clear(&self) {
        let subscribers = std::mem::take(&mut *self.subscribers.write());
        for subscriber in subscribers.values() {
            subscriber.queue.close();
        }
    }
}
