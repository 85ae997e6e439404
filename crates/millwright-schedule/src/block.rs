//! `CronBlock` lifecycle (spec §4.G).
//!
//! Each block drives its own start/stop edges off a [`CronSchedule`] and
//! reports transitions straight to its owning [`crate::schedule::Schedule`]
//! via async method calls rather than through another layer of edge-
//! triggered events: an edge-triggered event only works if the listener is
//! already re-armed by the time it fires, and under tokio's real
//! concurrency that ordering isn't guaranteed, so a direct call replaces it
//! here. Deletion and priority-preemption both use a small dedicated
//! control channel rather than the engine's `Cause`-typed interrupt
//! machinery, since neither is a machine-routine interrupt in the sense
//! `Cause` models.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use millwright_engine::clock::Clock;
use millwright_engine::event::EdgeEvent;
use millwright_ops::calendar::now_dt;

use crate::action::Action;
use crate::cron::CronSchedule;
use crate::schedule::Schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockSignal {
    /// Arbitration is preempting this block; stop now and reschedule on
    /// its own cron as usual.
    Stop,
    /// Terminal: stop now and never reschedule.
    Delete,
}

/// The sending half of a block's control channel, used by `Schedule` to
/// preempt or delete a block from outside its own run loop.
#[derive(Clone)]
pub struct BlockControl(mpsc::UnboundedSender<BlockSignal>);

impl BlockControl {
    pub fn request_stop(&self) {
        let _ = self.0.send(BlockSignal::Stop);
    }

    pub fn delete(&self) {
        let _ = self.0.send(BlockSignal::Delete);
    }
}

#[derive(Default)]
pub struct BlockEvents {
    pub started: EdgeEvent,
    pub stopped: EdgeEvent,
    pub deleted: EdgeEvent,
}

pub struct CronBlock {
    pub uid: String,
    pub name: String,
    pub priority: i64,
    pub cron: CronSchedule,
    pub duration: Duration,
    pub action: Action,
    is_active: AtomicBool,
    pub events: BlockEvents,
}

impl CronBlock {
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        cron: CronSchedule,
        duration: Duration,
        priority: i64,
        action: Action,
    ) -> Arc<Self> {
        Arc::new(Self {
            uid: uid.into(),
            name: name.into(),
            priority,
            cron,
            duration,
            action,
            is_active: AtomicBool::new(false),
            events: BlockEvents::default(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    /// Spawns the block's self-scheduling loop and returns the control
    /// handle `Schedule` uses to preempt or delete it.
    pub(crate) fn spawn(self: Arc<Self>, schedule: Arc<Schedule>, clock: Arc<Clock>, epoch: DateTime<Utc>) -> BlockControl {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let now = now_dt(&clock, epoch);
                let next_start = match self.cron.next_after(now) {
                    Ok(t) => t,
                    Err(err) => {
                        warn!(block = %self.name, error = %err, "cron can never fire again, block is dormant");
                        return;
                    }
                };
                let next_end = next_start
                    + ChronoDuration::from_std(self.duration).unwrap_or_default()
                    - ChronoDuration::seconds(1);

                if !wait_until(&clock, epoch, next_start, &mut rx).await {
                    self.events.deleted.emit();
                    schedule.handle_block_deleted(self.clone()).await;
                    return;
                }

                self.is_active.store(true, Ordering::SeqCst);
                self.events.started.emit();
                info!(block = %self.name, "cron block started");
                schedule.handle_block_started(self.clone()).await;

                if !wait_until(&clock, epoch, next_end, &mut rx).await {
                    self.is_active.store(false, Ordering::SeqCst);
                    self.events.deleted.emit();
                    schedule.handle_block_deleted(self.clone()).await;
                    return;
                }

                self.is_active.store(false, Ordering::SeqCst);
                self.events.stopped.emit();
                info!(block = %self.name, "cron block stopped");
                schedule.handle_block_finished(self.clone()).await;
            }
        });
        BlockControl(tx)
    }
}

/// Sleeps until `target`, racing a pending `BlockSignal`. Returns `true` if
/// the sleep completed naturally or was preempted (`Stop`), `false` if the
/// block was deleted.
async fn wait_until(
    clock: &Clock,
    epoch: DateTime<Utc>,
    target: DateTime<Utc>,
    rx: &mut mpsc::UnboundedReceiver<BlockSignal>,
) -> bool {
    let remaining = (target - now_dt(clock, epoch)).num_milliseconds().max(0) as u64;
    tokio::select! {
        _ = clock.timeout(Duration::from_millis(remaining)) => true,
        signal = rx.recv() => !matches!(signal, Some(BlockSignal::Delete)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    use millwright_model::Rng;

    use crate::action::Action;
    use crate::cron::CronSchedule;
    use crate::schedule::Schedule;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn block_runs_its_own_loop_and_reports_started_and_stopped_to_schedule() {
        let clock = Arc::new(Clock::fast());
        clock.set_deterministic(true);
        let rng = Arc::new(Rng::from_seed(3));

        let block = CronBlock::new(
            "a",
            "every-minute",
            CronSchedule::parse("* * * * *").unwrap(),
            Duration::from_secs(30),
            5,
            Action::SwitchProgram { program_uid: "p1".to_string() },
        );
        let schedule = Schedule::new("ops", vec![block.clone()], None, Vec::new(), clock.clone(), rng, epoch());

        let drive_clock = clock.clone();
        let driver = tokio::spawn(async move {
            loop {
                drive_clock.drive().await;
                tokio::task::yield_now().await;
            }
        });

        schedule.start();

        block.events.started.wait().await;
        assert!(block.is_active());
        assert_eq!(schedule.active_block_name(), Some("every-minute".to_string()));

        block.events.stopped.wait().await;
        assert!(!block.is_active());
        assert_eq!(schedule.active_block_name(), None);

        driver.abort();
    }
}
