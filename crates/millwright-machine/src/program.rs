//! Program execution (spec §4.E).
//!
//! A `Program` is an immutable definition; `run` is the ephemeral routine
//! that drives one production batch on behalf of a [`crate::machine::Machine`].
//! Grounded on `original_source/src/simulator/program.py`, generalised to
//! the exact input-check / lock / timed-run / consume / emit sequence in
//! spec §4.E.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use millwright_engine::clock::Clock;
use millwright_engine::mutex::MutexGuard;
use millwright_engine::process::InterruptReceiver;
use millwright_model::{
    containers_for, get_from_containers, quantity_exists_in_containers, AttributeRecorder, Bom,
    ContainerRef, Product, ProductBatch, ProductContainer, Rng,
};

use crate::error::{MachineError, Result};

/// A safety margin applied to the planned consumption check (spec §4.E
/// step 2: "needed = duration · rate · safety_margin (2.0)").
const SAFETY_MARGIN: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct Program {
    pub uid: String,
    pub bom: Bom,
    pub duration_minutes: f64,
    pub temp_factor: f64,
}

impl Program {
    pub fn new(uid: impl Into<String>, bom: Bom, duration_minutes: f64, temp_factor: f64) -> Self {
        Self {
            uid: uid.into(),
            bom,
            duration_minutes,
            temp_factor,
        }
    }
}

/// What a completed (or gracefully/force-stopped) run produced.
pub struct RunOutcome {
    pub batch_id: String,
    pub time_spent: Duration,
    pub output_factor: f64,
    pub quality: f64,
    pub consumption: HashMap<String, f64>,
    pub latest_material_batch_id: HashMap<String, String>,
    pub products: Vec<ProductBatch>,
}

/// Everything `run` needs to resolve BOM lines against the machine it is
/// running on, without owning a `Machine` directly (`millwright-machine`
/// would otherwise have a self-referential dependency between `Machine` and
/// `Program`). Cloning is cheap: every field is itself an `Arc` or a plain
/// `Copy`/shared value, which lets `Machine::_switch_production` move a
/// context into a detached process.
#[derive(Clone)]
pub struct RunContext {
    pub machine_uid: Arc<str>,
    pub containers: Arc<[ContainerRef]>,
    pub products: Arc<HashMap<String, (Arc<Product>, Arc<ProductContainer>)>>,
    pub clock: Arc<Clock>,
    pub rng: Arc<Rng>,
    pub deterministic: bool,
    pub recorder: Arc<dyn AttributeRecorder>,
}

impl Program {
    /// Runs one production batch. Returns `Ok` on both a graceful finish and
    /// a force-stopped finish — consumption and output emission always
    /// happen (spec §4.E step 5: "Consume (always, even on graceful
    /// interrupt)"). `Err` only covers the pre-flight input check (spec §4.E
    /// step 2).
    pub async fn run(
        self: Arc<Self>,
        ctx: RunContext,
        mut interrupts: InterruptReceiver,
    ) -> Result<RunOutcome> {
        info!(program = %self.uid, machine = %ctx.machine_uid, "program_started");

        let duration = Duration::from_secs_f64(
            self.duration_minutes * 60.0 + ctx.rng.pnorm(ctx.deterministic, 0.0, 1.0),
        );

        let resolved = self.check_inputs(&ctx, duration)?;
        let lock_futures = self.lock_containers(&resolved);
        let guards = lock_all(lock_futures, 0).await;

        let start = ctx.clock.now();
        tokio::select! {
            _ = ctx.clock.timeout(duration) => {}
            cause = interrupts.recv() => {
                info!(cause = ?cause, "program interrupted");
                if !cause.force() {
                    let elapsed = ctx.clock.now() - start;
                    let remaining = duration.saturating_sub(elapsed);
                    debug!(?remaining, "waiting for current batch to finish");
                    ctx.clock.timeout(remaining).await;
                }
            }
        }
        let time_spent = ctx.clock.now() - start;

        let (consumption, latest_material_batch_id, output_factor, input_quality) =
            self.consume_inputs(&ctx, &resolved, time_spent);
        drop(guards);

        let products = self.emit_products(&ctx, output_factor, input_quality);

        info!(program = %self.uid, "program_stopped");

        Ok(RunOutcome {
            batch_id: uuid_batch_id(),
            time_spent,
            output_factor,
            quality: input_quality,
            consumption,
            latest_material_batch_id,
            products,
        })
    }

    fn check_inputs(
        &self,
        ctx: &RunContext,
        duration: Duration,
    ) -> Result<HashMap<String, Vec<ContainerRef>>> {
        let mut resolved = HashMap::new();
        for (content_uid, rate) in self.bom.materials.iter().chain(self.bom.consumables.iter()) {
            let containers = containers_for(content_uid, ctx.containers);
            if containers.is_empty() {
                return Err(MachineError::ContainerMissing(content_uid.clone()));
            }

            let needed = duration.as_secs_f64() * rate * SAFETY_MARGIN;
            if !quantity_exists_in_containers(needed, &containers) {
                warn!(content_uid, "will not produce due to low container level");
                return Err(MachineError::LowContainerLevel);
            }

            resolved.insert(content_uid.clone(), containers);
        }
        Ok(resolved)
    }

    fn lock_containers(&self, resolved: &HashMap<String, Vec<ContainerRef>>) -> Vec<LockFuture> {
        // Locks are acquired in FIFO order over every resolved container
        // (spec §4.E step 3); the futures are polled to completion by the
        // caller via `lock_all`.
        let mut futures = Vec::new();
        for containers in resolved.values() {
            for container in containers {
                futures.push(LockFuture {
                    mutex: container.lock(),
                });
            }
        }
        futures
    }

    fn consume_inputs(
        &self,
        ctx: &RunContext,
        resolved: &HashMap<String, Vec<ContainerRef>>,
        time_spent: Duration,
    ) -> (HashMap<String, f64>, HashMap<String, String>, f64, f64) {
        let mut consumption = HashMap::new();
        let mut latest_material_batch_id = HashMap::new();
        let mut output_factor = 1.0;
        let mut quality_weighted_sum = 0.0;
        let mut quality_weight_total = 0.0;

        for (content_uid, rate) in self.bom.materials.iter().chain(self.bom.consumables.iter()) {
            let containers = &resolved[content_uid];
            let base = rate * time_spent.as_secs_f64();
            let requested = ctx
                .rng
                .cnorm(ctx.deterministic, 0.99 * base, 1.01 * base)
                .max(0.0);

            let (batches, total_effective) = match get_from_containers(requested, containers) {
                Ok(result) => result,
                Err(err) => {
                    warn!(content_uid, %err, "consumption fetch failed, treating as zero");
                    (Vec::new(), 0.0)
                }
            };

            *consumption.entry(content_uid.clone()).or_insert(0.0) += total_effective;
            ctx.recorder
                .record(&ctx.machine_uid, &format!("consumption.{content_uid}"), total_effective);

            if requested > 0.0 {
                output_factor *= total_effective / requested;
            }

            if let Some(last) = batches.last() {
                latest_material_batch_id.insert(content_uid.clone(), last.batch_id.clone());
            }
            for batch in &batches {
                quality_weighted_sum += batch.quality * batch.quantity;
                quality_weight_total += batch.quantity;
            }
        }

        let quality = if quality_weight_total > 0.0 {
            quality_weighted_sum / quality_weight_total
        } else {
            1.0
        };

        (consumption, latest_material_batch_id, output_factor, quality)
    }

    fn emit_products(
        &self,
        ctx: &RunContext,
        output_factor: f64,
        quality: f64,
    ) -> Vec<ProductBatch> {
        let mut produced = Vec::new();
        for (product_uid, base_quantity) in &self.bom.products {
            let Some((product, container)) = ctx.products.get(product_uid) else {
                warn!(product_uid, "no product container attached, dropping output");
                continue;
            };

            let jittered = ctx
                .rng
                .cnorm(ctx.deterministic, 0.99 * base_quantity, 1.01 * base_quantity);
            let quantity = ((output_factor * jittered).floor() as i64).max(1) as u64;

            let batch = ProductBatch::new(product, uuid_batch_id(), quantity, quality);
            container.put(batch.clone());
            ctx.recorder
                .record(&ctx.machine_uid, &format!("product_quantity.{product_uid}"), quantity as f64);
            produced.push(batch);
        }
        produced
    }
}

struct LockFuture {
    mutex: Arc<millwright_engine::mutex::PreemptiveMutex>,
}

/// Acquires every lock in `futures` in order, at the given priority,
/// returning the guards (held until dropped by the caller).
async fn lock_all(resolved_locks: Vec<LockFuture>, priority: i64) -> Vec<MutexGuard> {
    let mut guards = Vec::with_capacity(resolved_locks.len());
    for lock in resolved_locks {
        guards.push(lock.mutex.acquire(priority, None).await);
    }
    guards
}

fn uuid_batch_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    use millwright_engine::process::interrupt_channel;
    use millwright_model::{
        Bom, Consumable, ConsumableContainer, Material, MaterialContainer, NullRecorder, Product,
        ProductContainer,
    };

    fn deterministic_fixture() -> (Arc<Clock>, Arc<Rng>) {
        let clock = Arc::new(Clock::fast());
        clock.set_deterministic(true);
        (clock, Arc::new(Rng::from_seed(7)))
    }

    #[tokio::test]
    async fn run_consumes_inputs_and_emits_a_product_batch() {
        let (clock, rng) = deterministic_fixture();

        let material = Material::new("steel");
        let material_container = Arc::new(MaterialContainer::new(
            "steel-tank",
            material.clone(),
            1_000.0,
            500.0,
            None,
        ));

        let consumable = Consumable::new("coolant");
        let consumable_container = Arc::new(ConsumableContainer::new(
            "coolant-tank",
            consumable.uid.clone(),
            1_000.0,
            500.0,
            None,
        ));

        let product = Product::new("widget");
        let product_container = Arc::new(ProductContainer::new("widget-out", product.clone()));

        let bom = Bom::new()
            .with_material(material.uid.clone(), 1.0)
            .with_consumable(consumable.uid.clone(), 0.5)
            .with_product(product.uid.clone(), 10.0);
        let program = Arc::new(Program::new("make-widget", bom, 0.05, 1.0));

        let containers: Arc<[ContainerRef]> = vec![
            ContainerRef::Material(material_container.clone()),
            ContainerRef::Consumable(consumable_container.clone()),
        ]
        .into();

        let mut products = Map::new();
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

        let drive_clock = clock.clone();
        let driver = tokio::spawn(async move { drive_clock.drive().await });

        let outcome = program.run(ctx, rx).await.expect("run should succeed");
        driver.await.unwrap();

        assert_eq!(outcome.products.len(), 1);
        assert!(outcome.products[0].quantity >= 1);
        assert!(outcome.consumption.contains_key(&material.uid));
        assert!(outcome.consumption.contains_key(&consumable.uid));
        assert_eq!(product_container.level(), outcome.products[0].quantity);
    }

    #[tokio::test]
    async fn check_inputs_fails_when_no_container_is_attached() {
        let (clock, rng) = deterministic_fixture();

        let bom = Bom::new().with_material("ghost-material", 1.0);
        let program = Program::new("phantom", bom, 1.0, 1.0);

        let ctx = RunContext {
            machine_uid: Arc::from("press-1"),
            containers: Arc::from(Vec::<ContainerRef>::new()),
            products: Arc::new(Map::new()),
            clock,
            rng,
            deterministic: true,
            recorder: Arc::new(NullRecorder),
        };

        let err = program
            .check_inputs(&ctx, Duration::from_secs(10))
            .expect_err("no container should attached for the material");
        assert!(matches!(err, MachineError::ContainerMissing(_)));
    }
}
