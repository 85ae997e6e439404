//! The machine state machine (spec §4.F).
//!
//! Every transition is a routine that first acquires `executor` (and, for
//! production transitions, `ui` as well) at a caller-supplied priority; if
//! the acquire doesn't complete within `max_wait` the transition is dropped,
//! not queued, and a warning is logged. Error transitions bypass this and
//! acquire both mutexes unconditionally at [`ERROR_PRIORITY`], preempting
//! whoever holds them. Grounded on `original_source/src/simulator/machine.py`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use millwright_engine::cause::Cause;
use millwright_engine::clock::Clock;
use millwright_engine::event::EdgeEvent;
use millwright_engine::mutex::{MutexGuard, PreemptiveMutex};
use millwright_engine::process::{spawn_process, InterruptSender, ProcessHandle};
use millwright_model::{AttributeRecorder, ContainerRef, Product, ProductContainer, Rng};

use crate::error::{MachineError, Result};
use crate::issue::Issue;
use crate::program::{Program, RunContext, RunOutcome};

/// Priority at which an issue-driven error transition acquires `ui` and
/// `executor`, preempting any lower-urgency holder (spec §4.F).
pub const ERROR_PRIORITY: i64 = -9_999;

const REBOOT_RECOVERY_MEAN_SECS: f64 = 120.0;
const REBOOT_RECOVERY_STD_SECS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Off,
    On,
    Production,
    Error,
}

impl MachineState {
    /// Numeric code recorded to the monitored `state` attribute, matching
    /// `machine.py`'s `self.states = ["off", "on", "production", "error"]`
    /// ordering.
    pub fn code(&self) -> u32 {
        match self {
            MachineState::Off => 0,
            MachineState::On => 1,
            MachineState::Production => 2,
            MachineState::Error => 3,
        }
    }
}

/// Every named, edge-triggered event a machine emits (spec §4.F, §9 Open
/// Question #1). `Machine::events` is the subscription point: callers
/// `await` the field they care about.
#[derive(Default)]
pub struct MachineEvents {
    pub switching_on: EdgeEvent,
    pub switched_on: EdgeEvent,
    pub switched_on_from_off: EdgeEvent,
    pub switching_off: EdgeEvent,
    pub switched_off: EdgeEvent,
    pub switching_production: EdgeEvent,
    pub switched_production: EdgeEvent,
    pub production_started: EdgeEvent,
    pub production_interrupted: EdgeEvent,
    pub production_stopped: EdgeEvent,
    pub production_stopped_from_error: EdgeEvent,
    pub switching_program: EdgeEvent,
    pub switched_program: EdgeEvent,
    pub switching_error: EdgeEvent,
    pub switched_error: EdgeEvent,
    pub issue_occurred: EdgeEvent,
    pub issue_cleared: EdgeEvent,
    pub clearing_issue: EdgeEvent,
    pub switching_program_automatically: EdgeEvent,
    pub switched_program_automatically: EdgeEvent,
}

struct ProductionHandle {
    interrupts: InterruptSender,
    handle: ProcessHandle<Result<RunOutcome>>,
}

pub struct Machine {
    pub uid: String,
    state: Mutex<MachineState>,
    ui: Arc<PreemptiveMutex>,
    executor: Arc<PreemptiveMutex>,
    clock: Arc<Clock>,
    rng: Arc<Rng>,
    recorder: Arc<dyn AttributeRecorder>,
    containers: Arc<[ContainerRef]>,
    products: Arc<HashMap<String, (Arc<Product>, Arc<ProductContainer>)>>,
    programs: HashMap<String, Arc<Program>>,
    current_program: Mutex<Option<Arc<Program>>>,
    current_issue: Mutex<Option<Issue>>,
    error_code: AtomicU32,
    is_planned_operating_time: AtomicBool,
    production: Mutex<Option<ProductionHandle>>,
    production_interruption_ongoing: AtomicBool,
    error_guards: Mutex<Option<(MutexGuard, MutexGuard)>>,
    last_quality: Mutex<Option<f64>>,
    pub events: MachineEvents,
    max_wait: Duration,
}

impl Machine {
    pub fn new(
        uid: impl Into<String>,
        containers: Vec<ContainerRef>,
        products: HashMap<String, (Arc<Product>, Arc<ProductContainer>)>,
        programs: HashMap<String, Arc<Program>>,
        clock: Arc<Clock>,
        rng: Arc<Rng>,
        recorder: Arc<dyn AttributeRecorder>,
        max_wait: Duration,
    ) -> Arc<Self> {
        let uid = uid.into();
        recorder.record(&uid, "state", MachineState::Off.code() as f64);
        recorder.record(&uid, "error_code", 0.0);
        recorder.record(&uid, "production_interrupt_code", 0.0);
        Arc::new(Self {
            ui: PreemptiveMutex::new(format!("{uid}.ui")),
            executor: PreemptiveMutex::new(format!("{uid}.executor")),
            uid,
            state: Mutex::new(MachineState::Off),
            clock,
            rng,
            recorder,
            containers: containers.into(),
            products: Arc::new(products),
            programs,
            current_program: Mutex::new(None),
            current_issue: Mutex::new(None),
            error_code: AtomicU32::new(0),
            is_planned_operating_time: AtomicBool::new(false),
            production: Mutex::new(None),
            production_interruption_ongoing: AtomicBool::new(false),
            error_guards: Mutex::new(None),
            last_quality: Mutex::new(None),
            events: MachineEvents::default(),
            max_wait,
        })
    }

    pub fn state(&self) -> MachineState {
        *self.state.lock()
    }

    pub fn current_issue(&self) -> Option<Issue> {
        self.current_issue.lock().clone()
    }

    pub fn error_code(&self) -> u32 {
        self.error_code.load(Ordering::Relaxed)
    }

    pub fn is_planned_operating_time(&self) -> bool {
        self.is_planned_operating_time.load(Ordering::Relaxed)
    }

    pub fn set_planned_operating_time(&self, value: bool) {
        self.is_planned_operating_time.store(value, Ordering::Relaxed);
    }

    /// The program currently selected by `switch_program`, if any.
    pub fn current_program(&self) -> Option<Arc<Program>> {
        self.current_program.lock().clone()
    }

    /// Containers attached to this machine, used by operator fix routines to
    /// refill a `LowContainerLevel` issue.
    pub fn containers(&self) -> &[ContainerRef] {
        &self.containers
    }

    /// Quality realised by the most recently finished production batch, if
    /// any has run yet. Feeds `MachineTemperatureSensor`'s heating-rate
    /// calculation (spec §4.J: worse quality runs hotter).
    pub fn last_quality(&self) -> Option<f64> {
        *self.last_quality.lock()
    }

    /// Writes the monitored `state` attribute, appending to the time series
    /// on every call (spec §4.C: `state` is an `AttributeMonitor`).
    fn set_state(&self, state: MachineState) {
        *self.state.lock() = state;
        self.recorder.record(&self.uid, "state", state.code() as f64);
    }

    /// Writes the monitored `error_code` attribute, appending to the time
    /// series on every call (spec §4.C: `error_code` is an
    /// `AttributeMonitor`).
    fn set_error_code(&self, code: u32) {
        self.error_code.store(code, Ordering::Relaxed);
        self.recorder.record(&self.uid, "error_code", code as f64);
    }

    /// Writes the monitored `production_interrupt_code` attribute (spec
    /// §4.C), recording the cause that most recently tore down a
    /// production run.
    fn set_production_interrupt_code(&self, code: u32) {
        self.recorder.record(&self.uid, "production_interrupt_code", code as f64);
    }

    async fn try_executor(
        self: &Arc<Self>,
        priority: i64,
        interrupts: Option<InterruptSender>,
    ) -> Option<MutexGuard> {
        self.executor
            .acquire_before(priority, interrupts, self.clock.timeout(self.max_wait))
            .await
    }

    async fn try_ui(
        self: &Arc<Self>,
        priority: i64,
        interrupts: Option<InterruptSender>,
    ) -> Option<MutexGuard> {
        self.ui
            .acquire_before(priority, interrupts, self.clock.timeout(self.max_wait))
            .await
    }

    /// Turns the machine on from `off` (spec §4.F row "off"). No-op from
    /// any other state.
    pub async fn press_on(self: &Arc<Self>, priority: i64) {
        if *self.state.lock() != MachineState::Off {
            return;
        }
        let Some(exec) = self.try_executor(priority, None).await else {
            warn!(machine = %self.uid, "press_on dropped: executor busy past max_wait");
            return;
        };
        self.internal_switch_on().await;
        drop(exec);
    }

    /// Turns the machine fully off, gracefully stopping production first if
    /// it is running (spec §4.F row "production", column "off").
    pub async fn press_off(self: &Arc<Self>, priority: i64, cause: Cause) {
        let Some(ui) = self.try_ui(priority, None).await else {
            warn!(machine = %self.uid, "press_off dropped: ui busy past max_wait");
            return;
        };
        let Some(exec) = self.try_executor(priority, None).await else {
            warn!(machine = %self.uid, "press_off dropped: executor busy past max_wait");
            drop(ui);
            return;
        };

        if *self.state.lock() == MachineState::Production {
            self._interrupt_production(cause, false).await;
        }
        self.internal_switch_off().await;

        drop(exec);
        drop(ui);
    }

    /// Stops production without powering the machine off (spec §4.F row
    /// "production", column "on").
    pub async fn stop_production(self: &Arc<Self>, priority: i64, cause: Cause) {
        let Some(exec) = self.try_executor(priority, None).await else {
            warn!(machine = %self.uid, "stop_production dropped: executor busy past max_wait");
            return;
        };
        if *self.state.lock() == MachineState::Production {
            self._interrupt_production(cause, false).await;
            self.set_state(MachineState::On);
        }
        drop(exec);
    }

    /// Selects the program the next `start_production` will run.
    pub async fn switch_program(self: &Arc<Self>, priority: i64, program_uid: &str) -> Result<()> {
        let program = self
            .programs
            .get(program_uid)
            .cloned()
            .ok_or_else(|| MachineError::UnknownProgram(program_uid.to_string()))?;

        let Some(exec) = self.try_executor(priority, None).await else {
            warn!(machine = %self.uid, program_uid, "switch_program dropped: executor busy past max_wait");
            return Ok(());
        };
        self._switch_program(program).await;
        drop(exec);
        Ok(())
    }

    /// Starts production with the currently selected program (spec §4.F
    /// row "on", column "production").
    pub async fn start_production(self: &Arc<Self>, priority: i64) {
        let Some(ui) = self.try_ui(priority, None).await else {
            warn!(machine = %self.uid, "start_production dropped: ui busy past max_wait");
            return;
        };
        let Some(exec) = self.try_executor(priority, None).await else {
            warn!(machine = %self.uid, "start_production dropped: executor busy past max_wait");
            drop(ui);
            return;
        };

        if self.current_program.lock().is_none() {
            warn!(machine = %self.uid, "start_production dropped: no program selected");
        } else if *self.state.lock() != MachineState::On {
            warn!(machine = %self.uid, state = ?self.state(), "start_production dropped: machine not on");
        } else {
            self._switch_production().await;
        }

        drop(exec);
        drop(ui);
    }

    /// `_automated_program_switch`: sequentially presses on, switches
    /// program, then starts production, each step under the same priority
    /// (spec §4.F "Production control"). No-op from `off`/`error` (spec §8:
    /// "Automated program switch from a schedule completes only if the
    /// machine state ∉ {off, error} at action start").
    pub async fn automated_program_switch(
        self: &Arc<Self>,
        priority: i64,
        program_uid: &str,
    ) -> Result<()> {
        let state = self.state();
        if state == MachineState::Off || state == MachineState::Error {
            warn!(machine = %self.uid, ?state, "automated_program_switch dropped: machine is off/error");
            return Ok(());
        }

        self.events.switching_program_automatically.emit();
        self.press_on(priority).await;
        self.switch_program(priority, program_uid).await?;
        self.start_production(priority).await;
        self.events.switched_program_automatically.emit();
        Ok(())
    }

    /// Drives the machine into `error` over `issue`, forcibly interrupting
    /// any running production. Always succeeds: priority [`ERROR_PRIORITY`]
    /// preempts whoever currently holds `ui`/`executor` rather than waiting
    /// on `max_wait`.
    pub async fn switch_error(self: &Arc<Self>, issue: Issue) {
        info!(machine = %self.uid, code = issue.code(), "machine entering error state");

        let ui_guard = self.ui.acquire(ERROR_PRIORITY, None).await;
        let exec_guard = self.executor.acquire(ERROR_PRIORITY, None).await;

        if *self.state.lock() == MachineState::Production {
            self._interrupt_production(Cause::IssueOccurred, true).await;
        }

        *self.current_issue.lock() = Some(issue.clone());
        self.set_error_code(issue.code());

        self.events.switching_error.emit();
        self.set_state(MachineState::Error);
        self.events.switched_error.emit();
        self.events.issue_occurred.emit();

        *self.error_guards.lock() = Some((ui_guard, exec_guard));
    }

    /// Retires the current issue: releases `executor` immediately, sleeps a
    /// reboot cooldown, cycles the machine off then on, then releases `ui`
    /// and zeroes `error_code` (spec §4.F "Clear issue").
    pub async fn clear_issue(self: &Arc<Self>) {
        if *self.state.lock() != MachineState::Error {
            warn!(machine = %self.uid, "clear_issue called outside the error state");
            return;
        }
        let Some((ui_guard, exec_guard)) = self.error_guards.lock().take() else {
            warn!(machine = %self.uid, "clear_issue called with no held guards");
            return;
        };

        self.events.clearing_issue.emit();
        drop(exec_guard);

        let deterministic = self.clock.is_deterministic();
        let recovery = self
            .rng
            .pnorm(deterministic, REBOOT_RECOVERY_MEAN_SECS, REBOOT_RECOVERY_STD_SECS)
            .max(0.0);
        self.clock.timeout(Duration::from_secs_f64(recovery)).await;

        self.reboot().await;

        *self.current_issue.lock() = None;
        self.set_error_code(0);
        self.events.issue_cleared.emit();
        drop(ui_guard);
    }

    /// Forces the machine off for a scheduled maintenance window, holding
    /// `ui` and `executor` at `priority` for the whole window so no other
    /// transition can intervene, then brings it back on (spec §4.H:
    /// "locks ui and executor at priority -99").
    pub async fn perform_scheduled_maintenance(self: &Arc<Self>, priority: i64, duration: Duration) {
        info!(machine = %self.uid, ?duration, "scheduled maintenance starting");
        let ui_guard = self.ui.acquire(priority, None).await;
        let exec_guard = self.executor.acquire(priority, None).await;

        if *self.state.lock() == MachineState::Production {
            self._interrupt_production(Cause::AutomatedStopProduction { force: true }, false)
                .await;
        }
        self.internal_switch_off().await;

        self.clock.timeout(duration).await;

        self.internal_switch_on().await;

        drop(exec_guard);
        drop(ui_guard);
        info!(machine = %self.uid, "scheduled maintenance finished");
    }

    /// Off then on, without touching `ui`/`executor`: the caller (only
    /// `clear_issue`) already holds both at the priority that got it here
    /// (spec §4.F "Reboot": "already locked at priority by the caller").
    async fn reboot(self: &Arc<Self>) {
        self.internal_switch_off().await;
        self.internal_switch_on().await;
    }

    async fn internal_switch_on(self: &Arc<Self>) {
        let from_off = *self.state.lock() == MachineState::Off;
        self.events.switching_on.emit();
        self.set_state(MachineState::On);
        self.events.switched_on.emit();
        if from_off {
            self.events.switched_on_from_off.emit();
        }
    }

    async fn internal_switch_off(self: &Arc<Self>) {
        self.events.switching_off.emit();
        self.set_state(MachineState::Off);
        self.events.switched_off.emit();
    }

    async fn _switch_program(self: &Arc<Self>, program: Arc<Program>) {
        self.events.switching_program.emit();
        *self.current_program.lock() = Some(program);
        self.events.switched_program.emit();
    }

    /// Spawns the program-run routine as a detached process and records
    /// its handle (spec §4.F "Production control").
    async fn _switch_production(self: &Arc<Self>) {
        let Some(program) = self.current_program.lock().clone() else {
            return;
        };

        self.events.switching_production.emit();
        self.set_state(MachineState::Production);

        let ctx = RunContext {
            machine_uid: Arc::from(self.uid.as_str()),
            containers: self.containers.clone(),
            products: self.products.clone(),
            clock: self.clock.clone(),
            rng: self.rng.clone(),
            deterministic: self.clock.is_deterministic(),
            recorder: self.recorder.clone(),
        };

        let handle = spawn_process(move |interrupts| async move { program.run(ctx, interrupts).await });
        let interrupts = handle.interrupts.clone();
        *self.production.lock() = Some(ProductionHandle { interrupts, handle });

        self.events.switched_production.emit();
        self.events.production_started.emit();
    }

    /// Interrupts the running production process and waits for it to
    /// finish, guarded by `production_interruption_ongoing` so a second
    /// interrupt racing in (e.g. press_off arriving while switch_error is
    /// already tearing production down) is a silent no-op rather than a
    /// double-join.
    async fn _interrupt_production(self: &Arc<Self>, cause: Cause, from_error: bool) {
        if self.production_interruption_ongoing.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(prod) = self.production.lock().take() {
            prod.interrupts.interrupt(cause);
            self.set_production_interrupt_code(cause.code());
            self.events.production_interrupted.emit();

            match prod.handle.join().await {
                Ok(Ok(outcome)) => {
                    debug!(machine = %self.uid, batch = %outcome.batch_id, "production batch finished");
                    *self.last_quality.lock() = Some(outcome.quality);
                }
                Ok(Err(err)) => {
                    warn!(machine = %self.uid, error = %err, "program run returned an error");
                }
                Err(join_err) => {
                    warn!(machine = %self.uid, error = %join_err, "production task panicked");
                }
            }

            if from_error {
                self.events.production_stopped_from_error.emit();
            } else {
                self.events.production_stopped.emit();
            }
        }

        self.production_interruption_ongoing.store(false, Ordering::Release);
    }
}
