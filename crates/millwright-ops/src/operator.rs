//! Operator daily cycle and issue response (spec §4.I).
//!
//! The operator's day is a fixed sequence — home, work, lunch, work, home —
//! each transition gated by a time-of-day window and, for the two
//! work-leaving transitions, by a single `attention` mutex that also
//! serialises issue handling. Grounded on
//! `original_source/src/simulator/operator.py`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use parking_lot::Mutex;
use tracing::{info, warn};

use millwright_engine::cause::Cause;
use millwright_engine::clock::Clock;
use millwright_engine::event::EdgeEvent;
use millwright_engine::mutex::PreemptiveMutex;
use millwright_engine::process::{spawn_process, InterruptReceiver, ProcessHandle};
use millwright_model::{ContainerRef, MaterialBatch, Rng};

use millwright_machine::{Issue, Machine, MachineState};

use crate::calendar::{next_time, next_workday_time, now_dt};
use crate::error::{OpsError, Result};
use crate::maintenance::Maintenance;

/// Priority the operator acquires `ui`/`executor` and `attention` at.
/// Weaker than a schedule's automated actions (`-2`) and far weaker than
/// error recovery (`-9999`), per the ordering in spec §5.
pub const OPERATOR_PRIORITY: i64 = 0;

/// Fixed delay rather than drawn from a distribution.
/// TODO: draw from a distribution instead of a fixed delay.
const ISSUE_PERCEPTION_DELAY_SECS: u64 = 10 * 60;

const OVERHEAT_COOLDOWN_MEAN_SECS: f64 = 600.0;
const OVERHEAT_COOLDOWN_STD_SECS: f64 = 120.0;
const MINOR_REPAIR_MEAN_SECS: f64 = 300.0;
const MINOR_REPAIR_STD_SECS: f64 = 60.0;
const ARRIVAL_JITTER_SECS: f64 = 600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Home,
    Work,
    Lunch,
}

#[derive(Default)]
pub struct OperatorEvents {
    pub work_started: EdgeEvent,
    pub work_stopped: EdgeEvent,
}

pub struct OperatorSchedule {
    pub epoch: DateTime<Utc>,
    pub workdays: Vec<Weekday>,
    pub work_start_desired_at: NaiveTime,
    pub work_end_desired_at: NaiveTime,
    pub work_end_latest_at: NaiveTime,
    pub lunch_desired_at: NaiveTime,
    pub lunch_latest_at: NaiveTime,
    pub lunch_duration: Duration,
}

impl OperatorSchedule {
    pub fn standard(epoch: DateTime<Utc>) -> Self {
        use crate::calendar::parse_time_of_day;
        Self {
            epoch,
            workdays: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
            work_start_desired_at: parse_time_of_day("08:00"),
            work_end_desired_at: parse_time_of_day("17:00"),
            work_end_latest_at: parse_time_of_day("22:00"),
            lunch_desired_at: parse_time_of_day("11:30"),
            lunch_latest_at: parse_time_of_day("14:00"),
            lunch_duration: Duration::from_secs(30 * 60),
        }
    }
}

pub struct Operator {
    pub uid: String,
    machine: Arc<Machine>,
    maintenance: Arc<Maintenance>,
    clock: Arc<Clock>,
    rng: Arc<Rng>,
    schedule: OperatorSchedule,
    attention: Arc<PreemptiveMutex>,
    state: Mutex<OperatorState>,
    monitors: Mutex<Vec<ProcessHandle<()>>>,
    pub events: OperatorEvents,
}

impl Operator {
    pub fn new(
        uid: impl Into<String>,
        machine: Arc<Machine>,
        maintenance: Arc<Maintenance>,
        clock: Arc<Clock>,
        rng: Arc<Rng>,
        schedule: OperatorSchedule,
    ) -> Arc<Self> {
        let uid = uid.into();
        Arc::new(Self {
            attention: PreemptiveMutex::new(format!("{uid}.attention")),
            uid,
            machine,
            maintenance,
            clock,
            rng,
            schedule,
            state: Mutex::new(OperatorState::Home),
            monitors: Mutex::new(Vec::new()),
            events: OperatorEvents::default(),
        })
    }

    pub fn state(&self) -> OperatorState {
        *self.state.lock()
    }

    fn now(&self) -> DateTime<Utc> {
        now_dt(&self.clock, self.schedule.epoch)
    }

    /// Drives the daily cycle forever: home, to work, lunch, back to work,
    /// home. Meant to be spawned as its own long-lived process.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.home_phase().await;
            self.enter_work().await;
            self.lunch_phase().await;
            self.leave_work(Cause::WorkStopped).await;
            self.clock.timeout(self.schedule.lunch_duration).await;
            self.enter_work().await;
            self.home_leave_phase().await;
        }
    }

    async fn home_phase(&self) {
        let target = next_workday_time(self.now(), self.schedule.work_start_desired_at, &self.schedule.workdays);
        let jitter = self.rng.uni(self.clock.is_deterministic(), -ARRIVAL_JITTER_SECS, ARRIVAL_JITTER_SECS);
        let wait = (target - self.now()).num_seconds() as f64 + jitter;
        self.clock.timeout(Duration::from_secs_f64(wait.max(0.0))).await;
    }

    async fn enter_work(self: &Arc<Self>) {
        *self.state.lock() = OperatorState::Work;
        self.machine.set_planned_operating_time(true);
        self.events.work_started.emit();
        info!(operator = %self.uid, "arrived at work");

        let mut monitors = self.monitors.lock();
        monitors.push(spawn_process({
            let op = self.clone();
            move |interrupts| async move { op.monitor_issues(interrupts).await }
        }));
        monitors.push(spawn_process({
            let op = self.clone();
            move |interrupts| async move { op.monitor_production(interrupts).await }
        }));
    }

    async fn leave_work(&self, cause: Cause) {
        let attention_guard = self.attention.acquire(OPERATOR_PRIORITY, None).await;
        self.machine.set_planned_operating_time(false);
        self.machine.press_off(OPERATOR_PRIORITY, cause).await;
        drop(attention_guard);

        let handles: Vec<ProcessHandle<()>> = self.monitors.lock().drain(..).collect();
        for monitor in handles {
            monitor.interrupts.interrupt(Cause::WorkStopped);
            let _ = monitor.join().await;
        }
        self.events.work_stopped.emit();
    }

    async fn lunch_phase(&self) {
        let desired = next_time(self.now(), self.schedule.lunch_desired_at);
        let latest = next_time(self.now(), self.schedule.lunch_latest_at);
        let desired_wait = (desired - self.now()).num_seconds().max(0) as u64;
        let latest_wait = (latest - self.now()).num_seconds().max(0) as u64;

        self.clock.timeout(Duration::from_secs(desired_wait)).await;
        tokio::select! {
            guard = self.attention.acquire(OPERATOR_PRIORITY, None) => { drop(guard); }
            _ = self.clock.timeout(Duration::from_secs(latest_wait.saturating_sub(desired_wait))) => {
                warn!(operator = %self.uid, "lunch window reached its latest time while attention was held elsewhere");
            }
        }
        *self.state.lock() = OperatorState::Lunch;
    }

    async fn home_leave_phase(&self) {
        let desired = next_time(self.now(), self.schedule.work_end_desired_at);
        let latest = next_time(self.now(), self.schedule.work_end_latest_at);
        let desired_wait = (desired - self.now()).num_seconds().max(0) as u64;
        let latest_wait = (latest - self.now()).num_seconds().max(0) as u64;

        self.clock.timeout(Duration::from_secs(desired_wait)).await;
        let latest_passed = tokio::select! {
            guard = self.attention.acquire(OPERATOR_PRIORITY, None) => { drop(guard); false }
            _ = self.clock.timeout(Duration::from_secs(latest_wait.saturating_sub(desired_wait))) => {
                warn!(operator = %self.uid, "home time reached its latest bound, forcing off");
                true
            }
        };
        *self.state.lock() = OperatorState::Home;
        self.leave_work(Cause::ManualSwitchOff { force: latest_passed }).await;
    }

    /// Reacts to `issue_occurred`: wait a perception delay, take `attention`,
    /// dispatch a fix per issue kind, and (if nobody else is waiting) bring
    /// production back up.
    async fn monitor_issues(self: Arc<Self>, mut interrupts: InterruptReceiver) {
        loop {
            tokio::select! {
                _ = self.machine.events.issue_occurred.wait() => {}
                cause = interrupts.recv() => {
                    if cause.is_work_stopped() { return; }
                    continue;
                }
            }

            tokio::select! {
                _ = self.clock.timeout(Duration::from_secs(ISSUE_PERCEPTION_DELAY_SECS)) => {}
                cause = interrupts.recv() => {
                    if cause.is_work_stopped() { return; }
                    continue;
                }
            }

            let attention_guard = self.attention.acquire(OPERATOR_PRIORITY, None).await;
            let Some(issue) = self.machine.current_issue() else {
                drop(attention_guard);
                continue;
            };

            let outcome = self.fix_issue(&issue).await;
            drop(attention_guard);

            match outcome {
                Ok(()) => {
                    if self.machine.state() != MachineState::Production {
                        self.machine.start_production(OPERATOR_PRIORITY).await;
                    }
                }
                Err(err) => warn!(operator = %self.uid, error = %err, "could not fix issue"),
            }
        }
    }

    /// Ensures the machine is on while at work; re-presses it once an issue
    /// clears.
    async fn monitor_production(self: Arc<Self>, mut interrupts: InterruptReceiver) {
        loop {
            if self.machine.current_issue().is_some() {
                tokio::select! {
                    _ = self.machine.events.issue_cleared.wait() => {}
                    cause = interrupts.recv() => { if cause.is_work_stopped() { return; } continue; }
                }
            } else if self.machine.state() == MachineState::Off {
                self.machine.press_on(OPERATOR_PRIORITY).await;
            }

            tokio::select! {
                _ = self.machine.events.issue_occurred.wait() => {}
                _ = self.machine.events.issue_cleared.wait() => {}
                cause = interrupts.recv() => { if cause.is_work_stopped() { return; } }
            }
        }
    }

    async fn fix_issue(&self, issue: &Issue) -> Result<()> {
        let deterministic = self.clock.is_deterministic();
        match issue {
            Issue::LowContainerLevel => {
                self.refill_containers().await;
                self.machine.clear_issue().await;
                Ok(())
            }
            Issue::Overheat { .. } => {
                let cooldown = self
                    .rng
                    .pnorm(deterministic, OVERHEAT_COOLDOWN_MEAN_SECS, OVERHEAT_COOLDOWN_STD_SECS);
                self.clock.timeout(Duration::from_secs_f64(cooldown)).await;
                self.machine.clear_issue().await;
                Ok(())
            }
            Issue::PartBroken { needs_maintenance: true, .. } => {
                self.maintenance
                    .add_issue(issue.priority(), Some(self.machine.clone()), issue.clone())
                    .await;
                self.machine.events.issue_cleared.wait().await;
                Ok(())
            }
            Issue::PartBroken { needs_maintenance: false, .. } => {
                let repair = self.rng.pnorm(deterministic, MINOR_REPAIR_MEAN_SECS, MINOR_REPAIR_STD_SECS);
                self.clock.timeout(Duration::from_secs_f64(repair)).await;
                self.machine.clear_issue().await;
                Ok(())
            }
            other => Err(OpsError::UnknownIssue(format!("{other:?}"))),
        }
    }

    /// Tops every attached container back up to capacity (spec §4.I:
    /// "refill containers for LowContainerLevel").
    async fn refill_containers(&self) {
        let deterministic = self.clock.is_deterministic();
        for container in self.machine.containers() {
            match container {
                ContainerRef::Material(c) => {
                    let free = c.free();
                    if free > 0.0 {
                        let batch = MaterialBatch::new(&c.material, free, Utc::now());
                        c.put(&self.clock, &self.rng, deterministic, batch).await;
                    }
                }
                ContainerRef::Consumable(c) => {
                    let free = c.free();
                    if free > 0.0 {
                        c.put(&self.clock, free).await;
                    }
                }
            }
        }
    }
}
