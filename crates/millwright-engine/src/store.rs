//! Priority store (spec §4.B — the maintenance issue queue, and cron block
//! scheduling candidates).
//!
//! Holds arbitrary items ordered by `(priority, insertion_sequence)`; `get`
//! suspends until an item is available and then returns the lowest-priority
//! one, FIFO among ties. Unlike [`crate::mutex::PreemptiveMutex`] there is no
//! notion of a "holder" to preempt — items are simply consumed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use tokio::sync::Notify;

struct Entry<T> {
    priority: i64,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}
impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct PriorityStore<T> {
    pub name: String,
    heap: Mutex<BinaryHeap<Entry<T>>>,
    seq: AtomicU64,
    notify: Notify,
}

impl<T> PriorityStore<T> {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            notify: Notify::new(),
        })
    }

    pub fn put(&self, priority: i64, item: T) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(Entry { priority, seq, item });
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Wait for and remove the lowest-priority item, FIFO among ties.
    pub async fn get(&self) -> T {
        loop {
            if let Some(entry) = self.heap.lock().pop() {
                return entry.item;
            }
            self.notify.notified().await;
        }
    }

    /// Non-suspending variant used by code that wants to poll without
    /// yielding (e.g. a dispatcher deciding whether any work is ready).
    pub fn try_get(&self) -> Option<T> {
        self.heap.lock().pop().map(|entry| entry.item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_lowest_priority_fifo_among_ties() {
        let store = PriorityStore::new("issues");
        store.put(5, "late-but-urgent-equal-a");
        store.put(5, "late-but-urgent-equal-b");
        store.put(1, "most-urgent");

        assert_eq!(store.get().await, "most-urgent");
        assert_eq!(store.get().await, "late-but-urgent-equal-a");
        assert_eq!(store.get().await, "late-but-urgent-equal-b");
    }

    #[tokio::test]
    async fn get_suspends_until_an_item_is_put() {
        let store = PriorityStore::new("issues");
        let s = store.clone();
        let waiter = tokio::spawn(async move { s.get().await });

        tokio::task::yield_now().await;
        store.put(3, "arrives-later");

        assert_eq!(waiter.await.unwrap(), "arrives-later");
    }
}
