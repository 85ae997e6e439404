//! Prioritised, preemptible mutex (spec §4.B, §5).
//!
//! `acquire(priority)` grants the resource to whichever waiter has the
//! lowest `priority` value (FIFO within ties). If a strictly
//! lower-priority-number request arrives while the mutex is held, the
//! current holder is sent `Cause::Preempted` on its interrupt channel (if
//! it registered one), but the resource itself is only handed over once
//! the holder actually releases it — preemption is a notification, not a
//! forced revocation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::cause::Cause;
use crate::process::InterruptSender;

struct Waiter {
    priority: i64,
    seq: u64,
    interrupts: Option<InterruptSender>,
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
        // Reversed: BinaryHeap pops the *lowest* priority number first,
        // FIFO (lowest seq) within equal priorities.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct HolderInfo {
    priority: i64,
    interrupts: Option<InterruptSender>,
}

struct Inner {
    holder: Option<HolderInfo>,
    waiters: BinaryHeap<Waiter>,
}

pub struct PreemptiveMutex {
    pub name: String,
    inner: Mutex<Inner>,
    seq: AtomicU64,
}

impl PreemptiveMutex {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                holder: None,
                waiters: BinaryHeap::new(),
            }),
            seq: AtomicU64::new(0),
        })
    }

    /// Current holder's priority, if any (used by `Machine` to decide
    /// whether a transition attempt would even be granted before queueing).
    pub fn holder_priority(&self) -> Option<i64> {
        self.inner.lock().holder.as_ref().map(|h| h.priority)
    }

    pub fn is_held(&self) -> bool {
        self.inner.lock().holder.is_some()
    }

    /// Acquire the mutex at `priority`, optionally registering `interrupts`
    /// so a stronger request can notify us to yield early. Returns a guard
    /// that releases on drop.
    pub async fn acquire(
        self: &Arc<Self>,
        priority: i64,
        interrupts: Option<InterruptSender>,
    ) -> MutexGuard {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            if let Some(holder) = &inner.holder {
                if priority < holder.priority {
                    if let Some(tx) = &holder.interrupts {
                        tx.interrupt(Cause::Preempted);
                    }
                }
            }
            inner.waiters.push(Waiter {
                priority,
                seq,
                interrupts: interrupts.clone(),
                grant: tx,
            });
            dispatch(&mut inner);
        }
        // The grant channel only fires once this waiter has become the
        // holder, so losing the race here just means we are still queued.
        let _ = rx.await;
        MutexGuard {
            mutex: self.clone(),
        }
    }

    /// Like [`Self::acquire`], but gives up (dropping the queued waiter)
    /// once `deadline` resolves, returning `None`. Used by transitions that
    /// must not queue indefinitely (spec §4.F: "if it cannot be acquired
    /// within `max_wait`, the transition is dropped").
    pub async fn acquire_before<D>(
        self: &Arc<Self>,
        priority: i64,
        interrupts: Option<InterruptSender>,
        deadline: D,
    ) -> Option<MutexGuard>
    where
        D: std::future::Future<Output = ()>,
    {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            if let Some(holder) = &inner.holder {
                if priority < holder.priority {
                    if let Some(tx) = &holder.interrupts {
                        tx.interrupt(Cause::Preempted);
                    }
                }
            }
            inner.waiters.push(Waiter {
                priority,
                seq,
                interrupts,
                grant: tx,
            });
            dispatch(&mut inner);
        }

        tokio::pin!(deadline);
        tokio::select! {
            biased;
            granted = rx => {
                granted.ok()?;
                Some(MutexGuard { mutex: self.clone() })
            }
            _ = &mut deadline => None,
        }
    }

    fn release(&self) {
        let mut inner = self.inner.lock();
        inner.holder = None;
        dispatch(&mut inner);
    }
}

fn dispatch(inner: &mut Inner) {
    // A waiter whose `grant` receiver has already been dropped gave up
    // (e.g. a `Machine` transition that timed out waiting, spec §4.F's
    // "max_wait" drop rule). Skip it rather than handing it the mutex,
    // since nothing will ever release a guard nobody is holding.
    while inner.holder.is_none() {
        let Some(waiter) = inner.waiters.pop() else {
            break;
        };
        let priority = waiter.priority;
        let interrupts = waiter.interrupts;
        if waiter.grant.send(()).is_ok() {
            inner.holder = Some(HolderInfo {
                priority,
                interrupts,
            });
        }
    }
}

/// RAII guard returned by [`PreemptiveMutex::acquire`]; releasing happens
/// on drop, handing the mutex to the next-highest-priority waiter.
pub struct MutexGuard {
    mutex: Arc<PreemptiveMutex>,
}

impl Drop for MutexGuard {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn lowest_priority_number_wins_among_queued_waiters() {
        let mutex = PreemptiveMutex::new("test");
        let first_guard = mutex.acquire(10, None).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let m1 = mutex.clone();
        let o1 = order.clone();
        let weak_waiter = tokio::spawn(async move {
            let _g = m1.acquire(5, None).await;
            o1.lock().push("weak(prio=5)");
        });

        tokio::task::yield_now().await;

        let m2 = mutex.clone();
        let o2 = order.clone();
        let strong_waiter = tokio::spawn(async move {
            let _g = m2.acquire(1, None).await;
            o2.lock().push("strong(prio=1)");
        });

        tokio::task::yield_now().await;
        drop(first_guard);

        strong_waiter.await.unwrap();
        weak_waiter.await.unwrap();

        assert_eq!(order.lock().clone(), vec!["strong(prio=1)", "weak(prio=5)"]);
    }

    #[tokio::test]
    async fn stronger_request_preempts_the_holder() {
        let mutex = PreemptiveMutex::new("ui");
        let (tx, mut rx) = crate::process::interrupt_channel();
        let guard = mutex.acquire(0, Some(tx)).await;

        let m = mutex.clone();
        tokio::spawn(async move {
            let _g = m.acquire(-9999, None).await;
        });

        let cause = tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .expect("holder should have been notified of preemption");
        assert_eq!(cause, Cause::Preempted);
        drop(guard);
    }
}
