//! Virtual clock and event queue (spec §4.A).
//!
//! The clock owns a min-heap of pending timers ordered by `(fire_at,
//! insertion_sequence)`, giving FIFO tie-breaking by insertion order for
//! equal times (spec §4.A). [`Clock::drive`] is the event loop: it
//! repeatedly advances virtual time to the next timer, fires every timer
//! due at that instant (in insertion order), then yields to the executor so
//! woken processes can run before the loop looks at the heap again.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant as TokioInstant;

/// How the clock relates virtual time to wall time.
#[derive(Debug, Clone, Copy)]
pub enum RunMode {
    /// Advance virtual time as fast as events fire (spec: "Fast mode").
    Fast,
    /// Block wall time so that firing event at virtual time `t` happens at
    /// `start_wall + t / factor` (spec: "Real-time mode").
    RealTime { factor: f64 },
}

struct TimerEntry {
    at: Duration,
    seq: u64,
    waker: oneshot::Sender<()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the *smallest*
        // `(at, seq)` pair first.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct ClockState {
    now: Duration,
    seq: u64,
    heap: BinaryHeap<TimerEntry>,
}

/// The simulation's virtual clock and event queue.
pub struct Clock {
    state: Mutex<ClockState>,
    mode: RunMode,
    start_wall: TokioInstant,
    /// When `true`, randomised draws across the simulation collapse to
    /// their mean (spec-supplement: `original_source`'s `env.randomize`
    /// flag, inverted). See SPEC_FULL.md "Deterministic mode".
    deterministic: AtomicBool,
}

impl Clock {
    pub fn new(mode: RunMode) -> Self {
        Self {
            state: Mutex::new(ClockState {
                now: Duration::ZERO,
                seq: 0,
                heap: BinaryHeap::new(),
            }),
            mode,
            start_wall: TokioInstant::now(),
            deterministic: AtomicBool::new(false),
        }
    }

    pub fn fast() -> Self {
        Self::new(RunMode::Fast)
    }

    pub fn real_time(factor: f64) -> Self {
        Self::new(RunMode::RealTime { factor })
    }

    /// Current virtual time since the simulation started.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    pub fn is_deterministic(&self) -> bool {
        self.deterministic.load(AtomicOrdering::Relaxed)
    }

    /// Force every randomised draw in the simulation to its mean. Used by
    /// scenario tests that need reproducible outcomes (spec §8).
    pub fn set_deterministic(&self, deterministic: bool) {
        self.deterministic.store(deterministic, AtomicOrdering::Relaxed);
    }

    /// Returns a future that resolves once virtual time has advanced by
    /// `dt`. A `dt` of zero resolves on the next drive-loop tick.
    pub fn timeout(&self, dt: Duration) -> TimeoutFuture {
        let mut state = self.state.lock();
        let at = state.now + dt;
        let seq = state.seq;
        state.seq += 1;
        let (tx, rx) = oneshot::channel();
        state.heap.push(TimerEntry { at, seq, waker: tx });
        TimeoutFuture { rx }
    }

    /// Whether any timer is still pending. `Clock::drive` uses this to know
    /// when the simulation has run out of events.
    pub fn has_pending(&self) -> bool {
        !self.state.lock().heap.is_empty()
    }

    /// Drive the event loop until no timers remain pending. Call this from
    /// a single task (typically the simulation's `main`); every other
    /// process is spawned as its own task and suspends via
    /// [`Clock::timeout`] or the interrupt/event primitives in this crate.
    pub async fn drive(&self) {
        loop {
            let next_at = { self.state.lock().heap.peek().map(|e| e.at) };
            let Some(at) = next_at else {
                break;
            };

            if let RunMode::RealTime { factor } = self.mode {
                let target = self.start_wall + Duration::from_secs_f64(at.as_secs_f64() / factor);
                let now = TokioInstant::now();
                if target > now {
                    tokio::time::sleep(target - now).await;
                }
            }

            let due = {
                let mut state = self.state.lock();
                let mut due = Vec::new();
                while let Some(entry) = state.heap.peek() {
                    if entry.at == at {
                        due.push(state.heap.pop().unwrap());
                    } else {
                        break;
                    }
                }
                state.now = at;
                due
            };

            for entry in due {
                let _ = entry.waker.send(());
            }

            // Give every task woken by the timers above a chance to run
            // (and possibly register new timers, spawn children, or
            // release resources) before we look at the heap again. This
            // is a pragmatic approximation of "drain everything ready at
            // this instant": it is sufficient for the await-chain depths
            // this simulator produces per tick, but is not a formally
            // exhaustive drain under adversarial task graphs.
            for _ in 0..32 {
                tokio::task::yield_now().await;
            }
        }
    }
}

/// Future returned by [`Clock::timeout`].
pub struct TimeoutFuture {
    rx: oneshot::Receiver<()>,
}

impl std::future::Future for TimeoutFuture {
    type Output = ();

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        match std::pin::Pin::new(&mut self.rx).poll(cx) {
            std::task::Poll::Ready(_) => std::task::Poll::Ready(()),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn timers_fire_in_time_then_sequence_order() {
        let clock = Arc::new(Clock::fast());
        let order = Arc::new(Mutex::new(Vec::new()));

        let c1 = clock.clone();
        let o1 = order.clone();
        tokio::spawn(async move {
            c1.timeout(Duration::from_secs(2)).await;
            o1.lock().push("b-at-2s-first-registered");
        });

        let c2 = clock.clone();
        let o2 = order.clone();
        tokio::spawn(async move {
            c2.timeout(Duration::from_secs(1)).await;
            o2.lock().push("a-at-1s");
        });

        let c3 = clock.clone();
        let o3 = order.clone();
        tokio::spawn(async move {
            c3.timeout(Duration::from_secs(2)).await;
            o3.lock().push("c-at-2s-second-registered");
        });

        // Let the three spawned tasks register their timers before driving
        // the loop; otherwise `drive` would see an empty heap on its first
        // (synchronous) peek and return immediately.
        tokio::task::yield_now().await;
        clock.drive().await;

        let recorded = order.lock().clone();
        assert_eq!(
            recorded,
            vec!["a-at-1s", "b-at-2s-first-registered", "c-at-2s-second-registered"]
        );
        assert_eq!(clock.now(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn drive_returns_once_queue_is_empty() {
        let clock = Arc::new(Clock::fast());
        let c = clock.clone();
        tokio::spawn(async move {
            c.timeout(Duration::from_millis(10)).await;
        });
        tokio::task::yield_now().await;
        clock.drive().await;
        assert!(!clock.has_pending());
    }
}
