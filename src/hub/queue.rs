//! Bounded drop-oldest queue owned by one subscriber.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) struct SubscriberQueue<T> {
    records: Mutex<VecDeque<T>>,
    depth: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl<T> SubscriberQueue<T> {
    pub fn new(depth: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(depth.min(1024))),
            depth,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a record, evicting the oldest when full. Never blocks on readers.
    ///
    /// Returns `true` when a record was evicted.
    pub fn push(&self, record: T) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let evicted = {
            let mut records = self.records.lock();
            let evicted = if records.len() >= self.depth {
                records.pop_front();
                true
            } else {
                false
            };
            records.push_back(record);
            evicted
        };
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<T> {
        self.records.lock().pop_front()
    }

    /// Dequeue the oldest record, waiting up to `timeout` for one to arrive.
    ///
    /// A timeout too large to represent as a deadline waits indefinitely.
    pub async fn pop(&self, timeout: Duration) -> Option<T> {
        if let Some(record) = self.try_pop() {
            return Some(record);
        }
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if let Some(record) = self.try_pop() {
                return Some(record);
            }
            if self.is_closed() {
                return None;
            }
            // notify_one leaves a permit when nobody waits, so a push that
            // lands between the check above and this await is not missed.
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                        return self.try_pop();
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Discard the backlog and wake any blocked reader.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.records.lock().clear();
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}
