//! Block arbitration and the machine-bound `OperatingSchedule` (spec §4.G).
//!
//! Grounded on `original_source/src/simulator/schedules.py::Schedule` and
//! `OperatingSchedule`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use millwright_engine::clock::Clock;
use millwright_engine::process::ProcessHandle;
use millwright_model::{ContainerRef, Rng};

use millwright_machine::Machine;
use millwright_ops::Maintenance;

use crate::action::{self, ActionContext};
use crate::block::{BlockControl, CronBlock};

pub struct Schedule {
    pub name: String,
    blocks: Vec<Arc<CronBlock>>,
    controls: Mutex<Vec<BlockControl>>,
    active_blocks: Mutex<Vec<Arc<CronBlock>>>,
    active_block: Mutex<Option<Arc<CronBlock>>>,
    /// The currently-adopted block's action, running detached in its own
    /// task — never joined here, since the action's own lifetime is
    /// governed by its block's `stopped` edge, not by `Schedule`.
    running_action: Mutex<Option<tokio::task::JoinHandle<()>>>,
    machine: Mutex<Option<Arc<Machine>>>,
    maintenance: Option<Arc<Maintenance>>,
    containers: Vec<ContainerRef>,
    clock: Arc<Clock>,
    rng: Arc<Rng>,
    epoch: DateTime<Utc>,
}

impl Schedule {
    pub fn new(
        name: impl Into<String>,
        blocks: Vec<Arc<CronBlock>>,
        maintenance: Option<Arc<Maintenance>>,
        containers: Vec<ContainerRef>,
        clock: Arc<Clock>,
        rng: Arc<Rng>,
        epoch: DateTime<Utc>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            blocks,
            controls: Mutex::new(Vec::new()),
            active_blocks: Mutex::new(Vec::new()),
            active_block: Mutex::new(None),
            running_action: Mutex::new(None),
            machine: Mutex::new(None),
            maintenance,
            containers,
            clock,
            rng,
            epoch,
        })
    }

    /// Starts every block's self-scheduling loop. Call once after
    /// constructing the `Arc<Schedule>` (and, for an operating schedule,
    /// before or after `bind_machine` — both orders are safe).
    pub fn start(self: &Arc<Self>) {
        let blocks = self.blocks.clone();
        let mut controls = self.controls.lock();
        for block in blocks {
            controls.push(block.spawn(self.clone(), self.clock.clone(), self.epoch));
        }
    }

    pub fn active_block_name(&self) -> Option<String> {
        self.active_block.lock().as_ref().map(|b| b.name.clone())
    }

    pub fn active_block_count(&self) -> usize {
        self.active_blocks.lock().len()
    }

    fn context(&self) -> ActionContext {
        ActionContext {
            machine: self.machine.lock().clone(),
            maintenance: self.maintenance.clone(),
            containers: self.containers.clone(),
            clock: self.clock.clone(),
            rng: self.rng.clone(),
        }
    }

    /// Bookkeeping + arbitration for `block_started` (spec §4.G): add to
    /// `active_blocks`; if no block is currently active, adopt this one and
    /// run its action; if this one's priority beats the current active
    /// block's, stop the current one (which will itself call
    /// `handle_block_finished` once its `stopped` edge fires) and adopt
    /// this one; otherwise leave it active-but-not-running.
    pub(crate) async fn handle_block_started(self: &Arc<Self>, block: Arc<CronBlock>) {
        {
            let mut active = self.active_blocks.lock();
            if active.iter().any(|b| Arc::ptr_eq(b, &block)) {
                warn!(schedule = %self.name, block = %block.name, "block already in active_blocks");
            } else {
                active.push(block.clone());
            }
        }

        let mut needs_to_run = true;
        let current = self.active_block.lock().clone();
        match current {
            None => {
                *self.active_block.lock() = Some(block.clone());
            }
            Some(current) if block.priority <= current.priority => {
                if current.is_active() {
                    warn!(schedule = %self.name, losing = %current.name, winning = %block.name, "stopping currently active block due to priority");
                    self.request_stop(&current);
                }
                *self.active_block.lock() = Some(block.clone());
            }
            Some(current) => {
                warn!(schedule = %self.name, block = %block.name, current = %current.name, "will not activate block: outranked by current active block");
                needs_to_run = false;
            }
        }

        if needs_to_run {
            self.run_action(block).await;
        }
    }

    /// Bookkeeping for `block_finished`: drop from `active_blocks`; if that
    /// empties the list, clear `active_block` too.
    pub(crate) async fn handle_block_finished(&self, block: Arc<CronBlock>) {
        let mut active = self.active_blocks.lock();
        if let Some(pos) = active.iter().position(|b| Arc::ptr_eq(b, &block)) {
            active.remove(pos);
        } else {
            warn!(schedule = %self.name, block = %block.name, "block finished but was not in active_blocks");
        }
        if active.is_empty() {
            *self.active_block.lock() = None;
        }
    }

    pub(crate) async fn handle_block_deleted(&self, block: Arc<CronBlock>) {
        self.handle_block_finished(block).await;
    }

    fn request_stop(&self, block: &Arc<CronBlock>) {
        if let Some(control) = self.controls.lock().get(
            self.blocks
                .iter()
                .position(|b| Arc::ptr_eq(b, block))
                .unwrap_or(usize::MAX),
        ) {
            control.request_stop();
        }
    }

    async fn run_action(self: &Arc<Self>, block: Arc<CronBlock>) {
        let ctx = self.context();
        let action = block.action.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = action::run(&action, &block, &ctx).await {
                warn!(block = %block.name, error = %err, "schedule action failed");
            }
        });
        // Swap rather than join: the previous action (if any) is expected
        // to have already unwound via its own block's `stopped` edge by
        // the time a new one is adopted.
        let _ = self.running_action.lock().replace(handle);
    }
}

/// A schedule bound to exactly one machine, driving its `program`
/// attribute. Adds "re-run the active block's action after a power cycle"
/// behaviour on top of plain arbitration.
pub struct OperatingSchedule {
    schedule: Arc<Schedule>,
    machine_monitor: Mutex<Option<ProcessHandle<()>>>,
}

impl OperatingSchedule {
    pub fn new(schedule: Arc<Schedule>) -> Arc<Self> {
        Arc::new(Self {
            schedule,
            machine_monitor: Mutex::new(None),
        })
    }

    pub fn schedule(&self) -> &Arc<Schedule> {
        &self.schedule
    }

    /// `assign_schedule(machine)`: binds the target machine and starts the
    /// power-cycle monitor. Call once, after `Schedule::start`.
    pub fn bind_machine(self: &Arc<Self>, machine: Arc<Machine>) {
        *self.schedule.machine.lock() = Some(machine.clone());

        let this = self.clone();
        let handle = millwright_engine::process::spawn_process(move |mut interrupts| async move {
            loop {
                tokio::select! {
                    _ = machine.events.switched_on_from_off.wait() => {
                        if let Some(block) = this.schedule.active_block.lock().clone() {
                            this.schedule.run_action(block).await;
                        }
                    }
                    cause = interrupts.recv() => {
                        if cause.is_work_stopped() {
                            return;
                        }
                    }
                }
            }
        });
        *self.machine_monitor.lock() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::time::Duration as StdDuration;

    use chrono::TimeZone;
    use millwright_model::{Bom, NullRecorder};

    use crate::action::Action;
    use crate::cron::CronSchedule;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap()
    }

    fn idle_machine(clock: Arc<Clock>, rng: Arc<Rng>, program_uid: &str) -> Arc<Machine> {
        let program = Arc::new(millwright_machine::Program::new(program_uid, Bom::default(), 0.1, 1.0));
        let mut programs = HashMap::new();
        programs.insert(program.uid.clone(), program);
        Machine::new(
            "press-1",
            Vec::new(),
            HashMap::new(),
            programs,
            clock,
            rng,
            Arc::new(NullRecorder),
            StdDuration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn higher_priority_block_preempts_the_active_one() {
        let clock = Arc::new(Clock::fast());
        clock.set_deterministic(true);
        let rng = Arc::new(Rng::from_seed(7));
        let machine = idle_machine(clock.clone(), rng.clone(), "p1");

        let low = CronBlock::new(
            "a",
            "block-a",
            CronSchedule::parse("0 8 * * *").unwrap(),
            StdDuration::from_secs(4 * 3600),
            5,
            Action::SwitchProgram { program_uid: "p1".to_string() },
        );
        let high = CronBlock::new(
            "b",
            "block-b",
            CronSchedule::parse("0 10 * * *").unwrap(),
            StdDuration::from_secs(1800),
            1,
            Action::Maintenance,
        );

        let maintenance = Maintenance::new("crew", clock.clone(), rng.clone());
        let schedule = Schedule::new(
            "press-1-ops",
            vec![low.clone(), high.clone()],
            Some(maintenance),
            Vec::new(),
            clock.clone(),
            rng.clone(),
            epoch(),
        );
        *schedule.machine.lock() = Some(machine);

        // Directly drive arbitration rather than the real cron timers, which
        // keeps this test independent of wall-clock simulation speed.
        schedule.handle_block_started(low.clone()).await;
        assert_eq!(schedule.active_block_name(), Some("block-a".to_string()));

        schedule.handle_block_started(high.clone()).await;
        assert_eq!(schedule.active_block_name(), Some("block-b".to_string()));
        assert_eq!(schedule.active_block_count(), 2);

        schedule.handle_block_finished(high).await;
        assert_eq!(schedule.active_block_count(), 1);

        schedule.handle_block_finished(low).await;
        assert_eq!(schedule.active_block_count(), 0);
        assert_eq!(schedule.active_block_name(), None);
    }

    #[tokio::test]
    async fn lower_priority_block_does_not_displace_the_active_one() {
        let clock = Arc::new(Clock::fast());
        clock.set_deterministic(true);
        let rng = Arc::new(Rng::from_seed(7));

        let high = CronBlock::new(
            "a",
            "block-a",
            CronSchedule::parse("0 8 * * *").unwrap(),
            StdDuration::from_secs(3600),
            1,
            Action::Maintenance,
        );
        let low = CronBlock::new(
            "b",
            "block-b",
            CronSchedule::parse("0 9 * * *").unwrap(),
            StdDuration::from_secs(3600),
            5,
            Action::Maintenance,
        );

        let maintenance = Maintenance::new("crew", clock.clone(), rng.clone());
        let schedule = Schedule::new("ops", vec![high.clone(), low.clone()], Some(maintenance), Vec::new(), clock, rng, epoch());

        schedule.handle_block_started(high.clone()).await;
        schedule.handle_block_started(low).await;
        assert_eq!(schedule.active_block_name(), Some("block-a".to_string()));
        assert_eq!(schedule.active_block_count(), 2);
    }
}
