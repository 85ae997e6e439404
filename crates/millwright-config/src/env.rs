//! Environment variable overrides, `MILLWRIGHT_*` prefixed: a top-level
//! scalar override pass applied after the file loads, scoped to the
//! `[millwright]` section.

use std::env;

use crate::error::{ConfigError, Result};
use crate::schema::SimulationConfig;

/// Applies `MILLWRIGHT_DAYS`, `MILLWRIGHT_DETERMINISTIC`, `MILLWRIGHT_SEED`
/// on top of whatever the file (or defaults) produced. Only the
/// `[millwright]` run-tuning section is override-able this way; the
/// factory topology (materials, machines, schedules, ...) is expected to
/// come from the document itself.
pub fn apply_env_overrides(config: &mut SimulationConfig) -> Result<()> {
    if let Ok(value) = env::var("MILLWRIGHT_DAYS") {
        config.millwright.days = Some(value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
            key: "MILLWRIGHT_DAYS".to_string(),
            value: value.clone(),
            reason: "expected a floating point number of days".to_string(),
        })?);
    }

    if let Ok(value) = env::var("MILLWRIGHT_DETERMINISTIC") {
        config.millwright.deterministic = parse_bool(&value).ok_or_else(|| ConfigError::InvalidEnvOverride {
            key: "MILLWRIGHT_DETERMINISTIC".to_string(),
            value: value.clone(),
            reason: "expected true/false/1/0".to_string(),
        })?;
    }

    if let Ok(value) = env::var("MILLWRIGHT_SEED") {
        config.millwright.seed = Some(value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
            key: "MILLWRIGHT_SEED".to_string(),
            value: value.clone(),
            reason: "expected an unsigned integer".to_string(),
        })?);
    }

    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_override_parses_a_float() {
        std::env::set_var("MILLWRIGHT_DAYS", "3.5");
        let mut config = SimulationConfig::default();
        apply_env_overrides(&mut config).unwrap();
        assert_eq!(config.millwright.days, Some(3.5));
        std::env::remove_var("MILLWRIGHT_DAYS");
    }

    #[test]
    fn deterministic_override_rejects_garbage() {
        std::env::set_var("MILLWRIGHT_DETERMINISTIC", "maybe");
        let mut config = SimulationConfig::default();
        let result = apply_env_overrides(&mut config);
        std::env::remove_var("MILLWRIGHT_DETERMINISTIC");
        assert!(result.is_err());
    }
}
