//! Counted priority semaphore (spec §4.B — maintenance worker pool).
//!
//! `PriorityResource::acquire(priority, count)` queues until `count` of the
//! `capacity` slots are free, granting to the lowest-priority-number waiter
//! first (FIFO within ties), same ordering rule as [`crate::mutex::PreemptiveMutex`].
//! Unlike the mutex this resource is never preempted: a low-priority holder
//! keeps its slots until it releases them.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

struct Waiter {
    priority: i64,
    seq: u64,
    count: u32,
    grant: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Waiter {}
impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    capacity: u32,
    in_use: u32,
    waiters: BinaryHeap<Waiter>,
}

pub struct PriorityResource {
    pub name: String,
    inner: Mutex<Inner>,
    seq: AtomicU64,
}

impl PriorityResource {
    pub fn new(name: impl Into<String>, capacity: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                capacity,
                in_use: 0,
                waiters: BinaryHeap::new(),
            }),
            seq: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.inner.lock().capacity
    }

    pub fn available(&self) -> u32 {
        let inner = self.inner.lock();
        inner.capacity - inner.in_use
    }

    /// Acquire `count` slots at `priority`. Waits until that many slots are
    /// simultaneously free for this waiter (no partial grants).
    pub async fn acquire(self: &Arc<Self>, priority: i64, count: u32) -> ResourceGuard {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            inner.waiters.push(Waiter {
                priority,
                seq,
                count,
                grant: tx,
            });
            dispatch(&mut inner);
        }
        let _ = rx.await;
        ResourceGuard {
            resource: self.clone(),
            count,
        }
    }

    fn release(&self, count: u32) {
        let mut inner = self.inner.lock();
        inner.in_use = inner.in_use.saturating_sub(count);
        dispatch(&mut inner);
    }
}

fn dispatch(inner: &mut Inner) {
    while let Some(waiter) = inner.waiters.peek() {
        if inner.capacity - inner.in_use < waiter.count {
            break;
        }
        let waiter = inner.waiters.pop().unwrap();
        inner.in_use += waiter.count;
        let _ = waiter.grant.send(());
    }
}

pub struct ResourceGuard {
    resource: Arc<PriorityResource>,
    count: u32,
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.resource.release(self.count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grants_up_to_capacity_then_queues() {
        let pool = PriorityResource::new("technicians", 2);
        let g1 = pool.acquire(0, 1).await;
        let g2 = pool.acquire(0, 1).await;
        assert_eq!(pool.available(), 0);

        let p = pool.clone();
        let waiter = tokio::spawn(async move {
            let _g = p.acquire(0, 1).await;
        });
        tokio::task::yield_now().await;
        drop(g1);
        waiter.await.unwrap();
        assert_eq!(pool.available(), 1);
        drop(g2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn higher_priority_waiter_jumps_the_queue() {
        let pool = PriorityResource::new("technicians", 1);
        let g1 = pool.acquire(0, 1).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let p1 = pool.clone();
        let o1 = order.clone();
        let low = tokio::spawn(async move {
            let _g = p1.acquire(10, 1).await;
            o1.lock().push("low-priority-request");
        });
        tokio::task::yield_now().await;

        let p2 = pool.clone();
        let o2 = order.clone();
        let high = tokio::spawn(async move {
            let _g = p2.acquire(1, 1).await;
            o2.lock().push("high-priority-request");
        });
        tokio::task::yield_now().await;

        drop(g1);
        high.await.unwrap();
        low.await.unwrap();

        assert_eq!(
            order.lock().clone(),
            vec!["high-priority-request", "low-priority-request"]
        );
    }
}
