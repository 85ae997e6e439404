//! Cooperative process spawning and interrupt delivery (spec §4.A, §5).
//!
//! A "process" here is just a tokio task paired with an unbounded
//! [`Cause`] channel: `interrupt(process, cause)` delivers at the target's
//! next suspension point because the target is expected to `tokio::select!`
//! between its current await and `InterruptReceiver::recv`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cause::Cause;

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub u64);

impl ProcessId {
    pub fn next() -> Self {
        Self(NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The sending half of a process's interrupt channel, handed to whoever
/// needs to be able to interrupt it.
#[derive(Clone)]
pub struct InterruptSender(mpsc::UnboundedSender<Cause>);

impl InterruptSender {
    /// Deliver `cause` to the owning process's next suspension point. A
    /// closed receiver (process already finished) is not an error: the
    /// interrupt is simply moot.
    pub fn interrupt(&self, cause: Cause) {
        let _ = self.0.send(cause);
    }
}

/// The receiving half, held by the process itself and polled at every
/// suspension point via `tokio::select!`.
pub struct InterruptReceiver(mpsc::UnboundedReceiver<Cause>);

impl InterruptReceiver {
    /// Resolves to the next delivered cause. If every sender has been
    /// dropped this future never resolves, which is the correct behaviour
    /// for a process nobody can interrupt any more: callers always race it
    /// against other events via `tokio::select!`.
    pub async fn recv(&mut self) -> Cause {
        match self.0.recv().await {
            Some(cause) => cause,
            None => std::future::pending().await,
        }
    }

    /// Non-blocking poll used by code that wants to check for a pending
    /// interrupt without suspending (e.g. a loop body between batches).
    pub fn try_recv(&mut self) -> Option<Cause> {
        self.0.try_recv().ok()
    }
}

pub fn interrupt_channel() -> (InterruptSender, InterruptReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InterruptSender(tx), InterruptReceiver(rx))
}

/// A handle to a spawned process, carrying the id and the way to interrupt
/// it. Dropping the handle does not stop the process; call [`ProcessHandle::abort`]
/// explicitly (used by forced transitions and schedule-block deletion).
pub struct ProcessHandle<T = ()> {
    pub id: ProcessId,
    pub interrupts: InterruptSender,
    join: JoinHandle<T>,
}

impl<T: Send + 'static> ProcessHandle<T> {
    pub fn abort(&self) {
        self.join.abort();
    }

    pub async fn join(self) -> Result<T, tokio::task::JoinError> {
        self.join.await
    }
}

/// Spawn an async routine as a process, returning a handle the caller can
/// use to interrupt or abort it. The routine receives its own
/// [`InterruptReceiver`] so it can race it against timeouts and other
/// events at each suspension point.
pub fn spawn_process<F, Fut, T>(f: F) -> ProcessHandle<T>
where
    F: FnOnce(InterruptReceiver) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let id = ProcessId::next();
    let (tx, rx) = interrupt_channel();
    let join = tokio::spawn(f(rx));
    ProcessHandle {
        id,
        interrupts: tx,
        join,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::clock::Clock;

    #[tokio::test]
    async fn interrupt_wakes_a_pending_timeout() {
        let clock = Arc::new(Clock::fast());
        let observed = Arc::new(parking_lot::Mutex::new(None));

        let c = clock.clone();
        let o = observed.clone();
        let handle = spawn_process(move |mut interrupts| async move {
            tokio::select! {
                _ = c.timeout(Duration::from_secs(100)) => {
                    *o.lock() = Some(Cause::Unknown);
                }
                cause = interrupts.recv() => {
                    *o.lock() = Some(cause);
                }
            }
        });

        tokio::task::yield_now().await;
        handle
            .interrupts
            .interrupt(Cause::ManualSwitchOff { force: true });
        handle.join().await.unwrap();

        assert_eq!(
            *observed.lock(),
            Some(Cause::ManualSwitchOff { force: true })
        );
    }
}
