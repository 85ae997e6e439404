//! The declarative document schema (spec §6 "Configuration (input)"):
//! materials, consumables, products, containers, boms, maintenance,
//! programs, schedules, machines, operators, collectors, exporters.
//! Each concern gets its own section, keyed by the uid the document
//! declares it under (`BTreeMap<String, _>` throughout, so iteration order
//! is stable across a run).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimulationConfig {
    #[serde(default)]
    pub millwright: MillwrightSection,
    #[serde(default)]
    pub materials: BTreeMap<String, MaterialConfig>,
    #[serde(default)]
    pub consumables: BTreeMap<String, ConsumableConfig>,
    #[serde(default)]
    pub products: BTreeMap<String, ProductConfig>,
    #[serde(default)]
    pub containers: BTreeMap<String, ContainerConfig>,
    #[serde(default)]
    pub boms: BTreeMap<String, BomConfig>,
    #[serde(default)]
    pub maintenance: BTreeMap<String, MaintenanceConfig>,
    #[serde(default)]
    pub programs: BTreeMap<String, ProgramConfig>,
    #[serde(default)]
    pub schedules: BTreeMap<String, ScheduleConfig>,
    #[serde(default)]
    pub machines: BTreeMap<String, MachineConfig>,
    #[serde(default)]
    pub operators: BTreeMap<String, OperatorConfig>,
    #[serde(default)]
    pub collectors: BTreeMap<String, CollectorConfig>,
    #[serde(default)]
    pub exporters: BTreeMap<String, ExporterConfig>,
}

/// Top-level scalar run settings — the only section environment
/// overrides target, since the rest of the document describes the
/// factory's fixed topology rather than per-run tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MillwrightSection {
    #[serde(default = "default_version")]
    pub version: String,
    /// `run(days?)` default when the CLI isn't given an explicit duration.
    #[serde(default)]
    pub days: Option<f64>,
    #[serde(default = "default_deterministic")]
    pub deterministic: bool,
    pub seed: Option<u64>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_deterministic() -> bool {
    false
}

impl Default for MillwrightSection {
    fn default() -> Self {
        Self {
            version: default_version(),
            days: None,
            deterministic: default_deterministic(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumableConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerKind {
    Material,
    Consumable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub kind: ContainerKind,
    /// uid of the material/consumable this container holds.
    pub content: String,
    pub capacity: f64,
    #[serde(default = "default_fill_rate")]
    pub fill_rate: f64,
    /// Material containers: fraction of `capacity` to seed at startup
    /// (`0.0..=1.0`). Consumable containers: absolute starting level.
    #[serde(default)]
    pub init: Option<f64>,
}

fn default_fill_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BomConfig {
    /// material uid -> consumption per hour
    #[serde(default)]
    pub materials: BTreeMap<String, f64>,
    /// consumable uid -> consumption per hour
    #[serde(default)]
    pub consumables: BTreeMap<String, f64>,
    /// product uid -> quantity produced per run
    #[serde(default)]
    pub products: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub bom: String,
    #[serde(rename = "duration-minutes")]
    pub duration_minutes: f64,
    #[serde(rename = "temp-factor", default = "default_temp_factor")]
    pub temp_factor: f64,
}

fn default_temp_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_workers")]
    pub workers: u32,
}

fn default_workers() -> u32 {
    1
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { workers: default_workers() }
    }
}

/// `{name, args, kwargs}` per spec §6; `args`/`kwargs` stay as raw TOML
/// values since each built-in action (`switch-program`, `maintenance`,
/// `procurement`) interprets its own argument shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub name: String,
    #[serde(default)]
    pub args: Vec<toml::Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockConfig {
    pub cron: String,
    #[serde(rename = "duration-hours")]
    pub duration_hours: f64,
    pub priority: i64,
    pub action: ActionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    #[default]
    Default,
    Operating,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScheduleConfig {
    #[serde(rename = "type", default)]
    pub kind: ScheduleKind,
    #[serde(default)]
    pub blocks: Vec<BlockConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MachineConfig {
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub programs: Vec<String>,
    pub schedule: Option<String>,
    #[serde(rename = "default-program")]
    pub default_program: Option<String>,
    pub maintenance: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    pub machine: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorVariableConfig {
    pub id: String,
    pub name: String,
    /// Finite lookup table: `state[id]` is looked up here, falling back to
    /// `default` when absent (spec §9's "typed collector record").
    #[serde(rename = "value-map", default)]
    pub value_map: BTreeMap<String, toml::Value>,
    pub dtype: Option<String>,
    pub default: Option<toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectorConfig {
    #[serde(default)]
    pub variables: Vec<CollectorVariableConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    Csv,
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(rename = "type")]
    pub kind: ExporterKind,
    pub filepath: String,
    #[serde(rename = "interval-secs")]
    pub interval_secs: u64,
    pub collector: String,
}
