//! Document loading and cross-reference validation: defaults, then file,
//! then environment overrides, then validation.

use std::path::Path;

use tracing::{info, warn};

use crate::env::apply_env_overrides;
use crate::error::{ConfigError, Result};
use crate::schema::{ContainerKind, ExporterKind, SimulationConfig};

/// Loads a document from `path` if given, else starts from defaults;
/// applies `MILLWRIGHT_*` environment overrides; validates cross
/// references and numeric bounds.
pub fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => {
            warn!("no config path given, starting from defaults");
            SimulationConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_from_file(path: &Path) -> Result<SimulationConfig> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = toml::from_str(&content)?;
    info!(path = %path.display(), "loaded config document");
    Ok(config)
}

/// Cross-reference and numeric-bound validation: rejects a document whose
/// sections don't line up before anything downstream touches it.
pub fn validate_config(config: &SimulationConfig) -> Result<()> {
    for (uid, container) in &config.containers {
        let known = match container.kind {
            ContainerKind::Material => config.materials.contains_key(&container.content),
            ContainerKind::Consumable => config.consumables.contains_key(&container.content),
        };
        if !known {
            return Err(ConfigError::Validation(format!(
                "container {uid} references unknown content {}",
                container.content
            )));
        }
        if container.capacity <= 0.0 {
            return Err(ConfigError::Validation(format!("container {uid} capacity must be positive")));
        }
    }

    for (uid, bom) in &config.boms {
        for material_uid in bom.materials.keys() {
            if !config.materials.contains_key(material_uid) {
                return Err(ConfigError::Validation(format!(
                    "bom {uid} references unknown material {material_uid}"
                )));
            }
        }
        for consumable_uid in bom.consumables.keys() {
            if !config.consumables.contains_key(consumable_uid) {
                return Err(ConfigError::Validation(format!(
                    "bom {uid} references unknown consumable {consumable_uid}"
                )));
            }
        }
        for product_uid in bom.products.keys() {
            if !config.products.contains_key(product_uid) {
                return Err(ConfigError::Validation(format!(
                    "bom {uid} references unknown product {product_uid}"
                )));
            }
        }
    }

    for (uid, program) in &config.programs {
        if !config.boms.contains_key(&program.bom) {
            return Err(ConfigError::Validation(format!("program {uid} references unknown bom {}", program.bom)));
        }
        if program.duration_minutes <= 0.0 {
            return Err(ConfigError::Validation(format!("program {uid} duration-minutes must be positive")));
        }
    }

    for (uid, schedule) in &config.schedules {
        for block in &schedule.blocks {
            if block.duration_hours <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "schedule {uid} block with cron \"{}\" has non-positive duration-hours",
                    block.cron
                )));
            }
            if block.action.name.is_empty() {
                return Err(ConfigError::Validation(format!("schedule {uid} has a block with no action name")));
            }
        }
    }

    for (uid, machine) in &config.machines {
        for container_uid in &machine.containers {
            if !config.containers.contains_key(container_uid) {
                return Err(ConfigError::Validation(format!(
                    "machine {uid} references unknown container {container_uid}"
                )));
            }
        }
        for program_uid in &machine.programs {
            if !config.programs.contains_key(program_uid) {
                return Err(ConfigError::Validation(format!(
                    "machine {uid} references unknown program {program_uid}"
                )));
            }
        }
        if let Some(default_program) = &machine.default_program {
            if !machine.programs.contains(default_program) {
                return Err(ConfigError::Validation(format!(
                    "machine {uid} default-program {default_program} is not in its programs list"
                )));
            }
        }
        if let Some(schedule_uid) = &machine.schedule {
            if !config.schedules.contains_key(schedule_uid) {
                return Err(ConfigError::Validation(format!(
                    "machine {uid} references unknown schedule {schedule_uid}"
                )));
            }
        }
        if let Some(maintenance_uid) = &machine.maintenance {
            if !config.maintenance.contains_key(maintenance_uid) {
                return Err(ConfigError::Validation(format!(
                    "machine {uid} references unknown maintenance crew {maintenance_uid}"
                )));
            }
        }
    }

    for (uid, operator) in &config.operators {
        if !config.machines.contains_key(&operator.machine) {
            return Err(ConfigError::Validation(format!(
                "operator {uid} references unknown machine {}",
                operator.machine
            )));
        }
    }

    for (uid, exporter) in &config.exporters {
        if !config.collectors.contains_key(&exporter.collector) {
            return Err(ConfigError::Validation(format!(
                "exporter {uid} references unknown collector {}",
                exporter.collector
            )));
        }
        if exporter.interval_secs == 0 {
            return Err(ConfigError::Validation(format!("exporter {uid} interval-secs must be positive")));
        }
        match exporter.kind {
            ExporterKind::Csv | ExporterKind::Jsonl => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
        [millwright]
        days = 7.0

        [materials.steel]
        name = "Steel Coil"

        [containers.feed]
        kind = "material"
        content = "steel"
        capacity = 1000.0

        [boms.run-a]
        materials = { steel = 3600.0 }

        [programs.p1]
        bom = "run-a"
        duration-minutes = 15.0

        [machines.press-1]
        containers = ["feed"]
        programs = ["p1"]
        default-program = "p1"
    "#;

    #[test]
    fn parses_a_minimal_well_formed_document() {
        let config: SimulationConfig = toml::from_str(DOCUMENT).unwrap();
        validate_config(&config).unwrap();
        assert_eq!(config.millwright.days, Some(7.0));
        assert_eq!(config.machines["press-1"].default_program.as_deref(), Some("p1"));
    }

    #[test]
    fn rejects_a_container_pointing_at_an_unknown_material() {
        let broken = DOCUMENT.replace("content = \"steel\"", "content = \"tungsten\"");
        let config: SimulationConfig = toml::from_str(&broken).unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_a_machine_default_program_outside_its_own_program_list() {
        let broken = DOCUMENT.replace("default-program = \"p1\"", "default-program = \"p2\"");
        let config: SimulationConfig = toml::from_str(&broken).unwrap();
        assert!(validate_config(&config).is_err());
    }
}
