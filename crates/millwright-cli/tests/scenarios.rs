//! End-to-end scenario tests (spec §8 "Testable properties"). Each test
//! wires real domain objects across crates rather than going through the
//! TOML-loading path in `millwright_cli::build`, matching the direct-
//! construction style already used by the lower crates' own `#[tokio::test]`
//! suites. No round-trip fuzz grids here, just the six named scenarios.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use millwright_engine::cause::Cause;
use millwright_engine::clock::Clock;
use millwright_engine::process::interrupt_channel;
use millwright_engine::store::PriorityStore;

use millwright_machine::program::{Program, RunContext};
use millwright_machine::{Issue, Machine, MachineState};
use millwright_model::{
    Bom, ContainerRef, Material, MaterialContainer, NullRecorder, Product, ProductContainer, Rng,
};
use millwright_ops::maintenance::{Maintenance, MaintenanceTicket};
use millwright_ops::sensors::{monitor_overheat, MachineTemperatureSensor, SensorRegistry};

use millwright_schedule::action::Action;
use millwright_schedule::block::CronBlock;
use millwright_schedule::cron::CronSchedule;
use millwright_schedule::schedule::{OperatingSchedule, Schedule};

fn deterministic_fixture(seed: u64) -> (Arc<Clock>, Arc<Rng>) {
    let clock = Arc::new(Clock::fast());
    clock.set_deterministic(true);
    (clock, Arc::new(Rng::from_seed(seed)))
}

/// Drives `clock` forever in the background, yielding between sweeps so
/// processes it wakes get a chance to register their own new timers
/// before the next sweep (matches the driver loop `millwright-schedule`'s
/// own block tests already use).
fn spawn_driver(clock: Arc<Clock>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            clock.drive().await;
            tokio::task::yield_now().await;
        }
    })
}

/// Scenario 1: a single run against a well-stocked container consumes
/// roughly `rate * duration` and emits exactly one product batch.
#[tokio::test]
async fn empty_startup_consumes_material_and_emits_one_batch() {
    let (clock, rng) = deterministic_fixture(42);

    let material = Material::new("feedstock");
    let material_container = Arc::new(MaterialContainer::new(
        "feedstock-tank",
        material.clone(),
        1_000.0,
        0.0,
        None,
    ));

    let product = Product::new("widget");
    let product_container = Arc::new(ProductContainer::new("widget-out", product.clone()));

    let bom = Bom::new()
        .with_material(material.uid.clone(), 1.0)
        .with_product(product.uid.clone(), 1.0);
    let program = Arc::new(Program::new("nominal", bom, 15.0, 1.0));

    let containers: Arc<[ContainerRef]> = vec![ContainerRef::Material(material_container.clone())].into();
    let mut products = HashMap::new();
    products.insert(product.uid.clone(), (Arc::new(product.clone()), product_container.clone()));

    let ctx = RunContext {
        machine_uid: Arc::from("press-1"),
        containers,
        products: Arc::new(products),
        clock: clock.clone(),
        rng,
        deterministic: true,
        recorder: Arc::new(NullRecorder),
    };

    let (_tx, rx) = interrupt_channel();
    let driver = spawn_driver(clock.clone());

    let outcome = program.run(ctx, rx).await.expect("run should succeed");
    driver.abort();

    // Nominal duration is 900s plus a sub-second jitter; the run isn't
    // interrupted, so time_spent should land right around it.
    assert!(outcome.time_spent >= Duration::from_secs(895));
    assert!(outcome.time_spent <= Duration::from_secs(905));

    let consumed = 1_000.0 - material_container.level();
    assert!((850.0..950.0).contains(&consumed), "consumed {consumed}");

    assert_eq!(outcome.products.len(), 1);
    assert!(outcome.products[0].quantity >= 1);
    assert_eq!(product_container.level(), outcome.products[0].quantity);
}

fn idle_machine(clock: Arc<Clock>, rng: Arc<Rng>, containers: Vec<ContainerRef>, program: Arc<Program>) -> Arc<Machine> {
    let mut programs = HashMap::new();
    programs.insert(program.uid.clone(), program);
    Machine::new(
        "press-1",
        containers,
        HashMap::new(),
        programs,
        clock,
        rng,
        Arc::new(NullRecorder),
        Duration::from_millis(50),
    )
}

/// Scenario 2: a graceful stop mid-run (`force: false`) lets the program
/// finish out its full nominal duration before the machine settles on `on`.
#[tokio::test]
async fn graceful_stop_mid_run_finishes_the_batch_before_settling_on() {
    let (clock, rng) = deterministic_fixture(7);

    let material = Material::new("feedstock");
    let container = Arc::new(MaterialContainer::new("tank", material.clone(), 10_000.0, 0.0, None));
    let bom = Bom::new().with_material(material.uid.clone(), 1.0);
    let program = Arc::new(Program::new("nominal", bom, 15.0, 1.0));

    let machine = idle_machine(clock.clone(), rng, vec![ContainerRef::Material(container)], program.clone());
    let driver = spawn_driver(clock.clone());

    machine.press_on(0).await;
    machine.switch_program(0, &program.uid).await.unwrap();
    machine.start_production(0).await;
    assert_eq!(machine.state(), MachineState::Production);

    clock.timeout(Duration::from_secs(400)).await;
    let start = clock.now();
    machine
        .stop_production(0, Cause::ManualStopProduction { force: false })
        .await;
    let elapsed = clock.now() - start;

    driver.abort();

    assert_eq!(machine.state(), MachineState::On);
    // Graceful: the program ran out its remaining ~500s before returning.
    assert!(elapsed >= Duration::from_secs(450), "elapsed {elapsed:?}");
}

/// Scenario 3: a forced stop (`force: true`) interrupts immediately rather
/// than waiting for the batch to finish.
#[tokio::test]
async fn forced_stop_mid_run_returns_on_immediately() {
    let (clock, rng) = deterministic_fixture(7);

    let material = Material::new("feedstock");
    let container = Arc::new(MaterialContainer::new("tank", material.clone(), 10_000.0, 0.0, None));
    let bom = Bom::new().with_material(material.uid.clone(), 1.0);
    let program = Arc::new(Program::new("nominal", bom, 15.0, 1.0));

    let machine = idle_machine(clock.clone(), rng, vec![ContainerRef::Material(container)], program.clone());
    let driver = spawn_driver(clock.clone());

    machine.press_on(0).await;
    machine.switch_program(0, &program.uid).await.unwrap();
    machine.start_production(0).await;

    clock.timeout(Duration::from_secs(400)).await;
    let start = clock.now();
    machine
        .stop_production(0, Cause::ManualStopProduction { force: true })
        .await;
    let elapsed = clock.now() - start;

    driver.abort();

    assert_eq!(machine.state(), MachineState::On);
    // Forced: no waiting for the remaining ~500s of the nominal run.
    assert!(elapsed < Duration::from_secs(60), "elapsed {elapsed:?}");
}

/// Scenario 4: a lower-priority-number block preempts an overlapping
/// higher-priority-number one, and the preempted block does not resume
/// once the interloper ends (its own cron won't fire again until tomorrow).
#[tokio::test]
async fn schedule_priority_preemption() {
    let (clock, rng) = deterministic_fixture(3);
    let epoch = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();

    let program = Arc::new(Program::new("p1", Bom::default(), 0.1, 1.0));
    let machine = idle_machine(clock.clone(), rng.clone(), Vec::new(), program.clone());

    let low_priority_block = CronBlock::new(
        "a",
        "block-a",
        CronSchedule::parse("0 8 * * *").unwrap(),
        Duration::from_secs(4 * 3600),
        5,
        Action::SwitchProgram { program_uid: program.uid.clone() },
    );
    let high_priority_block = CronBlock::new(
        "b",
        "block-b",
        CronSchedule::parse("0 10 * * *").unwrap(),
        Duration::from_secs(1800),
        1,
        Action::Maintenance,
    );

    let maintenance = Maintenance::new("crew", clock.clone(), rng.clone());
    let schedule = Schedule::new(
        "press-1-ops",
        vec![low_priority_block.clone(), high_priority_block.clone()],
        Some(maintenance),
        Vec::new(),
        clock.clone(),
        rng,
        epoch,
    );
    let operating = OperatingSchedule::new(schedule.clone());
    schedule.start();
    operating.bind_machine(machine);

    let driver = spawn_driver(clock);

    low_priority_block.events.started.wait().await;
    assert_eq!(schedule.active_block_name(), Some("block-a".to_string()));

    high_priority_block.events.started.wait().await;
    low_priority_block.events.stopped.wait().await;
    assert_eq!(schedule.active_block_name(), Some("block-b".to_string()));

    high_priority_block.events.stopped.wait().await;
    assert_eq!(schedule.active_block_name(), None);
    assert!(!low_priority_block.is_active());

    driver.abort();
}

/// Scenario 5: sustained heat under production with a high `temp_factor`
/// crosses the overheat limit, forcing the machine into `error`; clearing
/// the issue returns it to `on`.
#[tokio::test]
async fn overheat_path_forces_error_and_clear_issue_recovers() {
    let (clock, rng) = deterministic_fixture(9);

    let program = Arc::new(Program::new("hot-run", Bom::default(), 0.01, 3.0));
    let machine = idle_machine(clock.clone(), rng.clone(), Vec::new(), program.clone());
    let driver = spawn_driver(clock.clone());

    machine.press_on(0).await;
    machine.switch_program(0, &program.uid).await.unwrap();
    machine.start_production(0).await;

    let registry = SensorRegistry::new();
    let sensor = MachineTemperatureSensor::new(
        machine.clone(),
        clock.clone(),
        rng,
        Arc::new(NullRecorder),
        registry,
        Duration::from_secs(3600),
    );
    tokio::spawn(monitor_overheat(sensor.clone()));
    tokio::spawn(sensor.run());

    machine.events.issue_occurred.wait().await;
    assert_eq!(machine.state(), MachineState::Error);
    assert!(matches!(machine.current_issue(), Some(Issue::Overheat { .. })));

    machine.clear_issue().await;
    assert_eq!(machine.state(), MachineState::On);
    assert_eq!(machine.error_code(), 0);

    driver.abort();
}

/// Scenario 6: the maintenance backlog is a strict priority queue — a
/// lower-priority-number ticket is always handed to the next free worker
/// before a higher-priority-number one, regardless of enqueue order.
#[tokio::test]
async fn maintenance_queue_orders_scheduled_maintenance_ahead_of_other_customer() {
    let store: Arc<PriorityStore<MaintenanceTicket>> = PriorityStore::new("crew.issues");

    store.put(5, MaintenanceTicket { machine: None, issue: Issue::OtherCustomer });
    store.put(
        1,
        MaintenanceTicket {
            machine: None,
            issue: Issue::ScheduledMaintenance { duration: Duration::from_secs(600) },
        },
    );

    let first = store.get().await;
    assert!(matches!(first.issue, Issue::ScheduledMaintenance { .. }));

    let second = store.get().await;
    assert!(matches!(second.issue, Issue::OtherCustomer));
}
