//! Typed parsing of the declarative simulation document (spec §6): the
//! boundary spec.md explicitly puts out of scope beyond building typed
//! structs. Loading hierarchy is defaults, then file, then `MILLWRIGHT_*`
//! environment overrides, then cross-reference validation.

pub mod config;
pub mod env;
pub mod error;
pub mod schema;

pub use config::{load_config, load_from_file, validate_config};
pub use error::{ConfigError, Result};
pub use schema::{
    ActionConfig, BlockConfig, BomConfig, CollectorConfig, CollectorVariableConfig, ConsumableConfig,
    ContainerConfig, ContainerKind, ExporterConfig, ExporterKind, MachineConfig, MaintenanceConfig,
    MaterialConfig, MillwrightSection, OperatorConfig, ProductConfig, ProgramConfig, ScheduleConfig,
    ScheduleKind, SimulationConfig,
};
