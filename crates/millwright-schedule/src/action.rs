//! Built-in block actions (spec §4.G): `switch-program`, `maintenance`,
//! `procurement`. Grounded on `original_source/src/simulator/actions.py`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use millwright_engine::cause::Cause;
use millwright_engine::clock::Clock;
use millwright_model::{containers_for, Consumable, ContainerRef, Material, MaterialBatch, Rng};

use millwright_machine::{Issue, Machine};
use millwright_ops::Maintenance;

use crate::block::CronBlock;
use crate::error::{Result, ScheduleError};

/// Schedule-driven automated transitions acquire `ui`/`executor` at this
/// priority: strictly weaker than error recovery's `-9999`, strictly
/// stronger than the operator's `0` (spec §9 deadlock-avoidance note).
pub const SCHEDULE_PRIORITY: i64 = -2;

/// What a `procurement` action is replenishing.
#[derive(Clone)]
pub enum ProcurementContent {
    Material(Material),
    Consumable(Consumable),
}

impl ProcurementContent {
    fn uid(&self) -> &str {
        match self {
            ProcurementContent::Material(m) => &m.uid,
            ProcurementContent::Consumable(c) => &c.uid,
        }
    }
}

#[derive(Clone)]
pub enum Action {
    SwitchProgram {
        program_uid: String,
    },
    Maintenance,
    Procurement {
        content: ProcurementContent,
        quantity: f64,
        quality_mean: f64,
        quality_std: f64,
        consumption_factor_mean: f64,
        consumption_factor_std: f64,
        fail_proba: f64,
        batch_size: f64,
    },
}

/// Everything a running action may need, gathered in one place so `Action`
/// itself stays data-only.
pub struct ActionContext {
    pub machine: Option<Arc<Machine>>,
    pub maintenance: Option<Arc<Maintenance>>,
    pub containers: Vec<ContainerRef>,
    pub clock: Arc<Clock>,
    pub rng: Arc<Rng>,
}

/// Jitter applied around a ScheduledMaintenance block's nominal duration,
/// matching `maintenance.py`'s repair-side `±60 min`; the action itself
/// just reports the nominal duration, the maintenance crew re-jitters it.
pub async fn run(action: &Action, block: &Arc<CronBlock>, ctx: &ActionContext) -> Result<()> {
    match action {
        Action::SwitchProgram { program_uid } => run_switch_program(program_uid, block, ctx).await,
        Action::Maintenance => run_maintenance(block, ctx).await,
        Action::Procurement {
            content,
            quantity,
            quality_mean,
            quality_std,
            consumption_factor_mean,
            consumption_factor_std,
            fail_proba,
            batch_size,
        } => {
            run_procurement(
                content,
                *quantity,
                *quality_mean,
                *quality_std,
                *consumption_factor_mean,
                *consumption_factor_std,
                *fail_proba,
                *batch_size,
                ctx,
            )
            .await
        }
    }
}

async fn run_switch_program(program_uid: &str, block: &Arc<CronBlock>, ctx: &ActionContext) -> Result<()> {
    let machine = ctx.machine.clone().ok_or(ScheduleError::NoMachineBound)?;

    machine.set_planned_operating_time(true);
    machine.automated_program_switch(SCHEDULE_PRIORITY, program_uid).await?;

    block.events.stopped.wait().await;

    machine.set_planned_operating_time(false);
    machine
        .stop_production(SCHEDULE_PRIORITY, Cause::AutomatedStopProduction { force: true })
        .await;
    Ok(())
}

async fn run_maintenance(block: &Arc<CronBlock>, ctx: &ActionContext) -> Result<()> {
    let machine = ctx.machine.clone().ok_or(ScheduleError::NoMachineBound)?;
    let maintenance = ctx.maintenance.clone().ok_or(ScheduleError::NoMaintenanceBound)?;

    machine.set_planned_operating_time(false);
    info!(block = %block.name, duration = ?block.duration, "maintenance block enqueuing scheduled maintenance");
    let issue = Issue::ScheduledMaintenance { duration: block.duration };
    maintenance.add_issue(issue.priority(), Some(machine), issue).await;

    block.events.stopped.wait().await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_procurement(
    content: &ProcurementContent,
    quantity: f64,
    quality_mean: f64,
    quality_std: f64,
    consumption_factor_mean: f64,
    consumption_factor_std: f64,
    fail_proba: f64,
    batch_size: f64,
    ctx: &ActionContext,
) -> Result<()> {
    let deterministic = ctx.clock.is_deterministic();

    if ctx.rng.uni(deterministic, 0.0, 1.0) < fail_proba {
        info!(content = content.uid(), "procurement failed this cycle");
        return Ok(());
    }

    ctx.clock.timeout(Duration::from_secs(60)).await;

    let matching = containers_for(content.uid(), &ctx.containers);
    if matching.is_empty() {
        return Err(ScheduleError::UnknownContent(content.uid().to_string()));
    }

    match content {
        ProcurementContent::Material(material) => {
            let batch_count = (quantity / batch_size).ceil().max(1.0) as u64;
            let mut remaining = quantity;
            for _ in 0..batch_count {
                let this_batch = remaining.min(batch_size);
                remaining -= this_batch;

                let created_ts = Utc::now() - chrono::Duration::hours(ctx.rng.iuni(deterministic, 7, 90, None));
                let mut batch = MaterialBatch::new(material, this_batch, created_ts);
                batch.quality = ctx.rng.pnorm(deterministic, quality_mean, quality_std).clamp(0.0, 1.0);
                batch.consumption_factor = ctx
                    .rng
                    .pnorm(deterministic, consumption_factor_mean, consumption_factor_std)
                    .max(0.01);

                put_into_first_available(&matching, &ctx.clock, &ctx.rng, deterministic, batch).await;
            }
        }
        ProcurementContent::Consumable(_) => {
            let mut remaining = quantity;
            for container in &matching {
                if remaining <= 0.0 {
                    break;
                }
                if let ContainerRef::Consumable(c) = container {
                    let put = c.put(&ctx.clock, remaining.min(c.free())).await;
                    remaining -= put;
                }
            }
        }
    }

    Ok(())
}

/// Puts `batch` into the first container (in attachment order) with any
/// free capacity. `MaterialContainer::put` itself clips to free space
/// rather than spilling a batch's remainder into a second container, so
/// this never splits one batch across containers — reasonable given
/// procurement already chunks by `batch_size`.
async fn put_into_first_available(containers: &[ContainerRef], clock: &Clock, rng: &Rng, deterministic: bool, batch: MaterialBatch) {
    for container in containers {
        if let ContainerRef::Material(c) = container {
            if c.free() > 0.0 {
                c.put(clock, rng, deterministic, batch).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use millwright_model::{ConsumableContainer, MaterialContainer};

    fn ctx(containers: Vec<ContainerRef>) -> ActionContext {
        let clock = Arc::new(Clock::fast());
        clock.set_deterministic(true);
        ActionContext {
            machine: None,
            maintenance: None,
            containers,
            clock,
            rng: Arc::new(Rng::from_seed(11)),
        }
    }

    #[tokio::test]
    async fn procurement_tops_up_a_material_container_in_batches() {
        let material = Material::new("steel-coil");
        let container = Arc::new(MaterialContainer::new("mc-1", material.clone(), 100.0, 10.0, Some(Vec::new())));
        let ctx = ctx(vec![ContainerRef::Material(container.clone())]);

        let drive_clock = ctx.clock.clone();
        let driver = tokio::spawn(async move { drive_clock.drive().await });

        run_procurement(
            &ProcurementContent::Material(material),
            60.0,
            0.9,
            0.02,
            1.0,
            0.05,
            0.0,
            25.0,
            &ctx,
        )
        .await
        .unwrap();

        driver.await.unwrap();
        assert!((container.level() - 60.0).abs() < 1e-6);
        assert_eq!(container.n_batches(), 3);
    }

    #[tokio::test]
    async fn procurement_tops_up_a_consumable_container() {
        let consumable = Consumable::new("lubricant");
        let container = Arc::new(ConsumableContainer::new("cc-1", consumable.uid.clone(), 50.0, 5.0, Some(10.0)));
        let ctx = ctx(vec![ContainerRef::Consumable(container.clone())]);

        let drive_clock = ctx.clock.clone();
        let driver = tokio::spawn(async move { drive_clock.drive().await });

        run_procurement(
            &ProcurementContent::Consumable(consumable),
            30.0,
            0.9,
            0.02,
            1.0,
            0.05,
            0.0,
            10.0,
            &ctx,
        )
        .await
        .unwrap();

        driver.await.unwrap();
        assert!((container.level() - 40.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn procurement_can_fail_before_ever_touching_a_container() {
        let material = Material::new("steel-coil");
        let container = Arc::new(MaterialContainer::new("mc-1", material.clone(), 100.0, 10.0, Some(Vec::new())));
        let ctx = ctx(vec![ContainerRef::Material(container.clone())]);

        run_procurement(&ProcurementContent::Material(material), 60.0, 0.9, 0.02, 1.0, 0.05, 1.0, 25.0, &ctx)
            .await
            .unwrap();

        assert_eq!(container.level(), 0.0);
    }
}
