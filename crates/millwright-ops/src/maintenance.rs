//! Maintenance backlog (spec §4.H).
//!
//! A [`PriorityStore`] of tickets ordered by the priority the ticket was
//! enqueued with (lower is more urgent) feeds a capped worker pool. The
//! `repair` loop is meant to be driven as a long-lived process per worker
//! slot is irrelevant to it — a single loop acquires one worker slot per
//! ticket and releases it when that ticket's fix routine returns. Grounded
//! on `original_source/src/simulator/maintenance.py`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use millwright_engine::clock::Clock;
use millwright_engine::event::EdgeEvent;
use millwright_engine::semaphore::PriorityResource;
use millwright_engine::store::PriorityStore;
use millwright_model::Rng;

use millwright_machine::{Issue, Machine};

/// `_fix_issue`'s `ScheduledMaintenanceIssue`/`PartBrokenIssue` transitions
/// lock the machine at this priority, strictly weaker than error recovery's
/// `-9999` but strictly stronger than any schedule-driven action.
pub const MAINTENANCE_PRIORITY: i64 = -99;

const DEFAULT_WORKERS: u32 = 2;
const UNKNOWN_ISSUE_FALLBACK_HOURS_LOW: i64 = 3;
const UNKNOWN_ISSUE_FALLBACK_HOURS_HIGH: i64 = 6;
const PRODUCER_INTERVAL_HOURS_LOW: i64 = 12;
const PRODUCER_INTERVAL_HOURS_HIGH: i64 = 48;
const PRODUCER_PRIORITY_LOW: i64 = 3;
const PRODUCER_PRIORITY_HIGH: i64 = 5;
const PRODUCER_PRIORITY_WEIGHTS: [f64; 3] = [0.8, 0.1, 0.1];
const ADD_ISSUE_DELAY_SECS: f64 = 300.0;

/// A queued unit of maintenance work. `machine` is `None` for issues that
/// don't belong to any particular cell (e.g. `OtherCustomer`, a competing
/// demand on the same crew).
#[derive(Clone)]
pub struct MaintenanceTicket {
    pub machine: Option<Arc<Machine>>,
    pub issue: Issue,
}

#[derive(Default)]
pub struct MaintenanceEvents {
    pub added_issue: EdgeEvent,
}

pub struct Maintenance {
    pub name: String,
    issues: Arc<PriorityStore<MaintenanceTicket>>,
    workers: Arc<PriorityResource>,
    clock: Arc<Clock>,
    rng: Arc<Rng>,
    pub events: MaintenanceEvents,
}

impl Maintenance {
    pub fn new(name: impl Into<String>, clock: Arc<Clock>, rng: Arc<Rng>) -> Arc<Self> {
        Self::with_workers(name, clock, rng, DEFAULT_WORKERS)
    }

    pub fn with_workers(name: impl Into<String>, clock: Arc<Clock>, rng: Arc<Rng>, workers: u32) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            issues: PriorityStore::new(format!("{name}.issues")),
            workers: PriorityResource::new(format!("{name}.workers"), workers),
            name,
            clock,
            rng,
            events: MaintenanceEvents::default(),
        })
    }

    pub fn backlog_len(&self) -> usize {
        self.issues.len()
    }

    pub fn available_workers(&self) -> u32 {
        self.workers.available()
    }

    /// Enqueues `issue` at `priority` after a short, jittered reporting
    /// delay (spec §4.H: `wnorm(minutes(5))` before the ticket lands on the
    /// store), then emits `added_issue`.
    pub async fn add_issue(&self, priority: i64, machine: Option<Arc<Machine>>, issue: Issue) {
        let deterministic = self.clock.is_deterministic();
        let delay = self.rng.wnorm(deterministic, ADD_ISSUE_DELAY_SECS, None, 1.0);
        self.clock.timeout(delay).await;

        self.issues.put(priority, MaintenanceTicket { machine, issue });
        self.events.added_issue.emit();
    }

    /// The repair loop: take the next ticket, hold a worker slot for the
    /// duration of its fix, repeat forever. Meant to be driven as its own
    /// long-lived process (spawned once per crew, not per ticket).
    pub async fn repair(self: &Arc<Self>) {
        loop {
            let ticket = self.issues.get().await;
            let priority = ticket.issue.priority();
            let _worker = self.workers.acquire(priority, 1).await;
            self.fix_issue(&ticket).await;
        }
    }

    /// Background producer: every `12..48` simulated hours, raises an
    /// `OtherCustomer` issue with priority weighted `3:5:5 => 0.8:0.1:0.1`
    /// odds, competing for the same worker pool (spec §4.H).
    pub async fn issue_producer(self: &Arc<Self>) {
        loop {
            let deterministic = self.clock.is_deterministic();
            let interval_hours = self
                .rng
                .iuni(deterministic, PRODUCER_INTERVAL_HOURS_LOW, PRODUCER_INTERVAL_HOURS_HIGH, None);
            self.clock
                .timeout(Duration::from_secs_f64(interval_hours as f64 * 3600.0))
                .await;

            let priority = self.rng.iuni(
                deterministic,
                PRODUCER_PRIORITY_LOW,
                PRODUCER_PRIORITY_HIGH,
                Some(&PRODUCER_PRIORITY_WEIGHTS),
            );
            info!(maintenance = %self.name, priority, "other-customer issue competing for the crew");
            self.add_issue(priority, None, Issue::OtherCustomer).await;
        }
    }

    async fn fix_issue(self: &Arc<Self>, ticket: &MaintenanceTicket) {
        let deterministic = self.clock.is_deterministic();
        match (&ticket.issue, &ticket.machine) {
            (Issue::ScheduledMaintenance { duration }, Some(machine)) => {
                let jitter_minutes = self.rng.iuni(deterministic, -60, 60, None);
                let real_duration = add_minutes(*duration, jitter_minutes);
                machine
                    .perform_scheduled_maintenance(MAINTENANCE_PRIORITY, real_duration)
                    .await;
            }
            (Issue::PartBroken { difficulty, .. }, Some(machine)) => {
                let base_hours = difficulty * 3600.0;
                let jittered = self
                    .rng
                    .cnorm(deterministic, base_hours * 0.9, base_hours * 1.1)
                    .max(0.0);
                self.clock.timeout(Duration::from_secs_f64(jittered)).await;
                machine.clear_issue().await;
            }
            (issue, machine) => {
                warn!(
                    maintenance = %self.name,
                    issue = ?issue,
                    machine = machine.as_ref().map(|m| m.uid.as_str()),
                    "no specific repair routine, sleeping a fallback window",
                );
                let hours = self.rng.iuni(
                    deterministic,
                    UNKNOWN_ISSUE_FALLBACK_HOURS_LOW,
                    UNKNOWN_ISSUE_FALLBACK_HOURS_HIGH,
                    None,
                );
                self.clock.timeout(Duration::from_secs_f64(hours as f64 * 3600.0)).await;
            }
        }
    }
}

fn add_minutes(duration: Duration, minutes: i64) -> Duration {
    let delta = Duration::from_secs(minutes.unsigned_abs() * 60);
    if minutes >= 0 {
        duration + delta
    } else {
        duration.saturating_sub(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use millwright_engine::clock::Clock;
    use millwright_model::{Bom, NullRecorder};

    fn deterministic_fixture() -> (Arc<Clock>, Arc<Rng>) {
        let clock = Arc::new(Clock::fast());
        clock.set_deterministic(true);
        (clock, Arc::new(Rng::from_seed(3)))
    }

    fn idle_machine(clock: Arc<Clock>, rng: Arc<Rng>) -> Arc<Machine> {
        let program = Arc::new(millwright_machine::Program::new("idle", Bom::default(), 0.01, 1.0));
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
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn scheduled_maintenance_outranks_other_customer_for_the_same_worker() {
        let (clock, rng) = deterministic_fixture();
        let maintenance = Maintenance::with_workers("crew", clock.clone(), rng.clone(), 1);

        maintenance.issues.put(5, MaintenanceTicket {
            machine: None,
            issue: Issue::OtherCustomer,
        });
        maintenance.issues.put(1, MaintenanceTicket {
            machine: None,
            issue: Issue::ScheduledMaintenance {
                duration: Duration::from_secs(60),
            },
        });

        let first = maintenance.issues.get().await;
        assert!(matches!(first.issue, Issue::ScheduledMaintenance { .. }));
    }

    #[tokio::test]
    async fn fix_issue_cycles_the_machine_off_and_back_on() {
        let (clock, rng) = deterministic_fixture();
        let machine = idle_machine(clock.clone(), rng.clone());
        machine.press_on(0).await;
        assert_eq!(machine.state(), millwright_machine::MachineState::On);

        let maintenance = Maintenance::with_workers("crew", clock.clone(), rng.clone(), 1);
        let ticket = MaintenanceTicket {
            machine: Some(machine.clone()),
            issue: Issue::ScheduledMaintenance {
                duration: Duration::from_secs(600),
            },
        };

        let drive_clock = clock.clone();
        let driver = tokio::spawn(async move { drive_clock.drive().await });
        maintenance.fix_issue(&ticket).await;
        driver.await.unwrap();

        assert_eq!(machine.state(), millwright_machine::MachineState::On);
    }
}
