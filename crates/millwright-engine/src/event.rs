//! Named, edge-triggered events (spec §5, §9 Open Question #1).
//!
//! `EdgeEvent::emit` wakes only processes that are already awaiting it;
//! anyone not yet waiting misses the edge — named events here are
//! edge-only rather than latched (spec §5, §9 Open Question #1).

use tokio::sync::Notify;

#[derive(Default)]
pub struct EdgeEvent {
    notify: Notify,
}

impl EdgeEvent {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
        }
    }

    /// Wake every process currently awaiting this event. Equivalent to the
    /// source's `self.events[name].succeed(); self.events[name] = env.event()`
    /// pair: `Notify::notify_waiters` never leaves a stored permit behind,
    /// so the event is immediately "fresh" again for the next `wait`.
    pub fn emit(&self) {
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}
