//! Translates a loaded [`millwright_config::SimulationConfig`] into the live
//! domain objects the other crates define, and spawns every long-running
//! process (operators, sensors, maintenance crews, exporters). This crate is
//! the boundary `millwright-config` explicitly doesn't cross: config is
//! typed-but-generic (`String` uids, raw `toml::Value` action args), this
//! module is where it becomes `Arc<Machine>`, `Arc<Operator>`, etc.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use millwright_config::{
    ActionConfig, CollectorConfig, CollectorVariableConfig, ContainerKind, ExporterKind, SimulationConfig,
};
use millwright_engine::clock::Clock;
use millwright_model::{
    Bom, Consumable, ConsumableContainer, ContainerRef, Material, MaterialContainer, Product, ProductContainer,
    Rng,
};

use millwright_machine::{Machine, Program};
use millwright_monitor::recorder::MonitorRecorder;
use millwright_monitor::series::{RingSize, TimeSeries};
use millwright_monitor::snapshot::{self, Collector, CollectorVariable, ValueMap};
use millwright_ops::calendar::now_dt;
use millwright_ops::maintenance::Maintenance;
use millwright_ops::operator::{Operator, OperatorSchedule};
use millwright_ops::sensors::{
    monitor_overheat, MachineTemperatureSensor, RoomTemperatureSensor, SensorRegistry,
};
use millwright_schedule::action::{Action, ProcurementContent};
use millwright_schedule::block::CronBlock;
use millwright_schedule::cron::CronSchedule;
use millwright_schedule::schedule::{OperatingSchedule, Schedule};

use crate::error::{CliError, Result};

const MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Every live object the binary needs a handle to after wiring, plus the
/// clock that drives the whole thing.
pub struct Simulation {
    pub clock: Arc<Clock>,
    pub epoch: DateTime<Utc>,
    pub machines: HashMap<String, Arc<Machine>>,
    pub operators: Vec<Arc<Operator>>,
    pub maintenance_crews: HashMap<String, Arc<Maintenance>>,
    pub schedules: Vec<Arc<Schedule>>,
    pub operating_schedules: Vec<Arc<OperatingSchedule>>,
    pub series: Arc<TimeSeries>,
    pub collectors: HashMap<String, Collector>,
    pub csv_exporters: Vec<Arc<millwright_export::CsvExporter>>,
    pub jsonl_exporters: Vec<Arc<millwright_export::JsonlExporter>>,
}

impl Simulation {
    /// Spawns operators, sensors, maintenance crews and exporters as their
    /// own long-lived tasks, then starts every schedule.
    pub fn spawn_processes(&self) {
        for operator in &self.operators {
            tokio::spawn(operator.clone().run());
        }
        for crew in self.maintenance_crews.values() {
            let repair_crew = crew.clone();
            tokio::spawn(async move { repair_crew.repair().await });
            let producer_crew = crew.clone();
            tokio::spawn(async move { producer_crew.issue_producer().await });
        }
        for schedule in &self.schedules {
            schedule.start();
        }

        let registry = SensorRegistry::new();
        let recorder: Arc<dyn millwright_model::AttributeRecorder> =
            MonitorRecorder::new(self.clock.clone(), self.series.clone());
        let room = RoomTemperatureSensor::new(
            "room",
            self.clock.clone(),
            Arc::new(Rng::from_entropy()),
            recorder.clone(),
            registry.clone(),
            MONITOR_INTERVAL,
        );
        tokio::spawn(room.run());

        for machine in self.machines.values() {
            let sensor = MachineTemperatureSensor::new(
                machine.clone(),
                self.clock.clone(),
                Arc::new(Rng::from_entropy()),
                recorder.clone(),
                registry.clone(),
                MONITOR_INTERVAL,
            );
            tokio::spawn(monitor_overheat(sensor.clone()));
            tokio::spawn(sensor.run());
        }

        for exporter in &self.csv_exporters {
            let exporter = exporter.clone();
            let run_clock = self.clock.clone();
            let snapshot_clock = self.clock.clone();
            let series = self.series.clone();
            let epoch = self.epoch;
            tokio::spawn(async move {
                let snapshot = move || snapshot::state(&series, "millwright", now_dt(&snapshot_clock, epoch)).values;
                if let Err(err) = exporter.run(run_clock, snapshot).await {
                    warn!(error = %err, "csv exporter stopped");
                }
            });
        }
        for exporter in &self.jsonl_exporters {
            let exporter = exporter.clone();
            let run_clock = self.clock.clone();
            let snapshot_clock = self.clock.clone();
            let series = self.series.clone();
            let epoch = self.epoch;
            tokio::spawn(async move {
                let snapshot = move || snapshot::state(&series, "millwright", now_dt(&snapshot_clock, epoch)).values;
                if let Err(err) = exporter.run(run_clock, snapshot).await {
                    warn!(error = %err, "jsonl exporter stopped");
                }
            });
        }
    }
}

pub fn build(config: &SimulationConfig, epoch: DateTime<Utc>) -> Result<Simulation> {
    let clock = Arc::new(if config.millwright.deterministic {
        let c = Clock::fast();
        c.set_deterministic(true);
        c
    } else {
        Clock::fast()
    });
    let rng = Arc::new(match config.millwright.seed {
        Some(seed) => Rng::from_seed(seed),
        None => Rng::from_entropy(),
    });

    let series = Arc::new(TimeSeries::new(RingSize::UNBOUNDED));
    let recorder: Arc<dyn millwright_model::AttributeRecorder> = MonitorRecorder::new(clock.clone(), series.clone());

    let materials: HashMap<String, Material> = config
        .materials
        .iter()
        .map(|(uid, cfg)| (uid.clone(), Material { uid: uid.clone(), name: cfg.name.clone() }))
        .collect();
    let consumables: HashMap<String, Consumable> = config
        .consumables
        .iter()
        .map(|(uid, cfg)| (uid.clone(), Consumable { uid: uid.clone(), name: cfg.name.clone() }))
        .collect();
    let products: HashMap<String, Product> = config
        .products
        .iter()
        .map(|(uid, cfg)| (uid.clone(), Product { uid: uid.clone(), name: cfg.name.clone() }))
        .collect();

    let containers: HashMap<String, ContainerRef> = config
        .containers
        .iter()
        .map(|(uid, cfg)| {
            let container = match cfg.kind {
                ContainerKind::Material => {
                    let material = materials
                        .get(&cfg.content)
                        .ok_or_else(|| CliError::Build(format!("container {uid} references unknown material {}", cfg.content)))?
                        .clone();
                    let init = cfg.init.map(|fraction| {
                        let quantity = cfg.capacity * fraction;
                        vec![millwright_model::MaterialBatch::new(&material, quantity, Utc::now())]
                    });
                    ContainerRef::Material(Arc::new(
                        MaterialContainer::new(uid.clone(), material, cfg.capacity, cfg.fill_rate, init)
                            .with_recorder(recorder.clone()),
                    ))
                }
                ContainerKind::Consumable => {
                    let consumable = consumables
                        .get(&cfg.content)
                        .ok_or_else(|| CliError::Build(format!("container {uid} references unknown consumable {}", cfg.content)))?;
                    ContainerRef::Consumable(Arc::new(
                        ConsumableContainer::new(uid.clone(), consumable.uid.clone(), cfg.capacity, cfg.fill_rate, cfg.init)
                            .with_recorder(recorder.clone()),
                    ))
                }
            };
            Ok((uid.clone(), container))
        })
        .collect::<Result<_>>()?;
    let all_containers: Vec<ContainerRef> = containers.values().cloned().collect();

    let boms: HashMap<String, Bom> = config
        .boms
        .iter()
        .map(|(uid, cfg)| {
            let mut bom = Bom::new();
            for (material_uid, rate) in &cfg.materials {
                bom = bom.with_material(material_uid.clone(), *rate);
            }
            for (consumable_uid, rate) in &cfg.consumables {
                bom = bom.with_consumable(consumable_uid.clone(), *rate);
            }
            for (product_uid, qty) in &cfg.products {
                bom = bom.with_product(product_uid.clone(), *qty as f64);
            }
            (uid.clone(), bom)
        })
        .collect();

    let programs: HashMap<String, Arc<Program>> = config
        .programs
        .iter()
        .map(|(uid, cfg)| {
            let bom = boms
                .get(&cfg.bom)
                .ok_or_else(|| CliError::Build(format!("program {uid} references unknown bom {}", cfg.bom)))?
                .clone();
            Ok((uid.clone(), Arc::new(Program::new(uid.clone(), bom, cfg.duration_minutes, cfg.temp_factor))))
        })
        .collect::<Result<_>>()?;

    let maintenance_crews: HashMap<String, Arc<Maintenance>> = config
        .maintenance
        .iter()
        .map(|(uid, cfg)| (uid.clone(), Maintenance::with_workers(uid.clone(), clock.clone(), rng.clone(), cfg.workers)))
        .collect();

    let mut machines = HashMap::new();
    for (uid, cfg) in &config.machines {
        let machine_containers: Vec<ContainerRef> = cfg
            .containers
            .iter()
            .map(|c| {
                containers
                    .get(c)
                    .cloned()
                    .ok_or_else(|| CliError::Build(format!("machine {uid} references unknown container {c}")))
            })
            .collect::<Result<_>>()?;

        let machine_programs: HashMap<String, Arc<Program>> = cfg
            .programs
            .iter()
            .map(|p| {
                programs
                    .get(p)
                    .cloned()
                    .map(|program| (p.clone(), program))
                    .ok_or_else(|| CliError::Build(format!("machine {uid} references unknown program {p}")))
            })
            .collect::<Result<_>>()?;

        let mut machine_products = HashMap::new();
        for program in machine_programs.values() {
            for product_uid in program.bom.products.keys() {
                if machine_products.contains_key(product_uid) {
                    continue;
                }
                let product = products
                    .get(product_uid)
                    .ok_or_else(|| CliError::Build(format!("program for machine {uid} references unknown product {product_uid}")))?
                    .clone();
                let container = Arc::new(
                    ProductContainer::new(format!("{uid}.{product_uid}"), product.clone()).with_recorder(recorder.clone()),
                );
                machine_products.insert(product_uid.clone(), (Arc::new(product), container));
            }
        }

        let machine = Machine::new(
            uid.clone(),
            machine_containers,
            machine_products,
            machine_programs,
            clock.clone(),
            rng.clone(),
            recorder.clone(),
            Duration::from_secs(60),
        );
        machines.insert(uid.clone(), machine);
    }

    let mut operators = Vec::new();
    for (uid, cfg) in &config.operators {
        let machine = machines
            .get(&cfg.machine)
            .cloned()
            .ok_or_else(|| CliError::Build(format!("operator {uid} references unknown machine {}", cfg.machine)))?;
        let machine_cfg = config.machines.get(&cfg.machine);
        let crew = machine_cfg
            .and_then(|m| m.maintenance.as_ref())
            .and_then(|m| maintenance_crews.get(m).cloned())
            .or_else(|| maintenance_crews.values().next().cloned())
            .ok_or_else(|| CliError::Build(format!("operator {uid} has no maintenance crew available")))?;
        operators.push(Operator::new(uid.clone(), machine, crew, clock.clone(), rng.clone(), OperatorSchedule::standard(epoch)));
    }

    let mut schedules = Vec::new();
    let mut operating_schedules = Vec::new();
    for (uid, cfg) in &config.schedules {
        let bound_machine = config
            .machines
            .iter()
            .find(|(_, m)| m.schedule.as_deref() == Some(uid.as_str()));
        let maintenance = bound_machine
            .and_then(|(_, m)| m.maintenance.as_ref())
            .and_then(|m| maintenance_crews.get(m).cloned())
            .or_else(|| maintenance_crews.values().next().cloned());

        let blocks: Vec<Arc<CronBlock>> = cfg
            .blocks
            .iter()
            .enumerate()
            .map(|(i, block_cfg)| {
                let action = build_action(&block_cfg.action, &materials, &consumables)?;
                let cron = CronSchedule::parse(&block_cfg.cron)
                    .map_err(|err| CliError::Build(format!("schedule {uid} block {i}: {err}")))?;
                Ok(CronBlock::new(
                    format!("{uid}-block-{i}"),
                    format!("{}-{i}", block_cfg.action.name),
                    cron,
                    Duration::from_secs_f64(block_cfg.duration_hours * 3600.0),
                    block_cfg.priority,
                    action,
                ))
            })
            .collect::<Result<_>>()?;

        let schedule = Schedule::new(uid.clone(), blocks, maintenance, all_containers.clone(), clock.clone(), rng.clone(), epoch);
        schedules.push(schedule.clone());

        if cfg.kind == millwright_config::ScheduleKind::Operating {
            let operating = OperatingSchedule::new(schedule);
            if let Some((machine_uid, _)) = bound_machine {
                if let Some(machine) = machines.get(machine_uid) {
                    operating.bind_machine(machine.clone());
                } else {
                    warn!(schedule = %uid, "operating schedule bound to no machine");
                }
            }
            operating_schedules.push(operating);
        }
    }

    let collectors: HashMap<String, Collector> = config
        .collectors
        .iter()
        .map(|(uid, cfg)| (uid.clone(), build_collector(uid, cfg)))
        .collect();

    let mut csv_exporters = Vec::new();
    let mut jsonl_exporters = Vec::new();
    for (uid, cfg) in &config.exporters {
        if !collectors.contains_key(&cfg.collector) {
            return Err(CliError::Build(format!("exporter {uid} references unknown collector {}", cfg.collector)));
        }
        match cfg.kind {
            ExporterKind::Csv => csv_exporters.push(Arc::new(millwright_export::CsvExporter::new(&cfg.filepath, None, cfg.interval_secs))),
            ExporterKind::Jsonl => jsonl_exporters.push(Arc::new(millwright_export::JsonlExporter::new(&cfg.filepath, cfg.interval_secs))),
        }
    }

    info!(
        machines = machines.len(),
        operators = operators.len(),
        schedules = schedules.len(),
        "simulation wired"
    );

    Ok(Simulation {
        clock,
        epoch,
        machines,
        operators,
        maintenance_crews,
        schedules,
        operating_schedules,
        series,
        collectors,
        csv_exporters,
        jsonl_exporters,
    })
}

fn build_collector(name: &str, cfg: &CollectorConfig) -> Collector {
    Collector {
        name: name.to_string(),
        variables: cfg.variables.iter().map(build_collector_variable).collect(),
    }
}

fn build_collector_variable(cfg: &CollectorVariableConfig) -> CollectorVariable {
    let value_map = if cfg.value_map.is_empty() {
        ValueMap::Identity
    } else {
        ValueMap::Lookup(cfg.value_map.iter().map(|(k, v)| (k.clone(), toml_to_json(v))).collect())
    };
    CollectorVariable {
        id: cfg.id.clone(),
        display_name: cfg.name.clone(),
        value_map,
        dtype: cfg.dtype.clone(),
        default: cfg.default.as_ref().map(toml_to_json),
    }
}

fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn build_action(
    cfg: &ActionConfig,
    materials: &HashMap<String, Material>,
    consumables: &HashMap<String, Consumable>,
) -> Result<Action> {
    match cfg.name.as_str() {
        "switch-program" => {
            let program_uid = arg_str(cfg, 0, "program")?;
            Ok(Action::SwitchProgram { program_uid })
        }
        "maintenance" => Ok(Action::Maintenance),
        "procurement" => {
            let content_uid = arg_str(cfg, 0, "content")?;
            let content = if let Some(material) = materials.get(&content_uid) {
                ProcurementContent::Material(material.clone())
            } else if let Some(consumable) = consumables.get(&content_uid) {
                ProcurementContent::Consumable(consumable.clone())
            } else {
                return Err(CliError::Build(format!("procurement action references unknown content {content_uid}")));
            };
            Ok(Action::Procurement {
                content,
                quantity: kwarg_f64(cfg, "quantity").unwrap_or(100.0),
                quality_mean: kwarg_f64(cfg, "quality-mean").unwrap_or(0.95),
                quality_std: kwarg_f64(cfg, "quality-std").unwrap_or(0.02),
                consumption_factor_mean: kwarg_f64(cfg, "consumption-factor-mean").unwrap_or(1.0),
                consumption_factor_std: kwarg_f64(cfg, "consumption-factor-std").unwrap_or(0.05),
                fail_proba: kwarg_f64(cfg, "fail-proba").unwrap_or(0.0),
                batch_size: kwarg_f64(cfg, "batch-size").unwrap_or(25.0),
            })
        }
        other => Err(CliError::Build(format!("unknown block action {other}"))),
    }
}

fn arg_str(cfg: &ActionConfig, index: usize, label: &str) -> Result<String> {
    cfg.args
        .get(index)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| CliError::Build(format!("action {} missing string arg {label} at position {index}", cfg.name)))
}

fn kwarg_f64(cfg: &ActionConfig, key: &str) -> Option<f64> {
    cfg.kwargs.get(key).and_then(|v| v.as_float()).or_else(|| cfg.kwargs.get(key).and_then(|v| v.as_integer()).map(|i| i as f64))
}
