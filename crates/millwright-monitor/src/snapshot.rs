//! State snapshots and collectors (spec §6, §9).
//!
//! `state()` returns every monitored attribute's latest value as a flat
//! `"{owner_uid}.{key}" -> value` map plus `"{factory_uid}.datetime"`.
//! `get_state(collector)` filters/renames/remaps that map per a
//! [`Collector`] definition — a typed stand-in for a callback-packed
//! `{'func': ..., 'val': ...}` config dictionary (spec §9).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::series::TimeSeries;

/// A snapshot of every monitored attribute's latest value, plus the
/// simulation's current wall-clock-mapped datetime.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub values: HashMap<String, Json>,
}

pub fn state(series: &TimeSeries, factory_uid: &str, now: DateTime<Utc>) -> Snapshot {
    let mut values = HashMap::new();
    for (key, sample) in series.latest_all() {
        values.insert(
            format!("{}.{}", key.owner_uid, key.attribute),
            json_number(sample.value),
        );
    }
    values.insert(
        format!("{factory_uid}.datetime"),
        Json::String(now.to_rfc3339()),
    );
    Snapshot { values }
}

fn json_number(value: f64) -> Json {
    serde_json::Number::from_f64(value)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

/// How a collector variable's raw snapshot value is transformed before
/// export. Deliberately a small closed set of cases (rather than an
/// embedded expression language) since the transformations `original_source`
/// actually uses are all trivial.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValueMap {
    /// Pass the value through unchanged.
    Identity,
    /// Remap known categorical values (e.g. a numeric state code -> name).
    Lookup(HashMap<String, Json>),
    /// Affine transform for numeric readouts: `value * scale + offset`.
    Affine { scale: f64, offset: f64 },
    /// Round a numeric value to `decimals` places.
    Round { decimals: u32 },
}

impl ValueMap {
    pub fn apply(&self, value: &Json) -> Json {
        match self {
            ValueMap::Identity => value.clone(),
            ValueMap::Lookup(table) => value
                .as_str()
                .and_then(|s| table.get(s))
                .cloned()
                .unwrap_or_else(|| value.clone()),
            ValueMap::Affine { scale, offset } => value
                .as_f64()
                .map(|v| json_number(v * scale + offset))
                .unwrap_or_else(|| value.clone()),
            ValueMap::Round { decimals } => value
                .as_f64()
                .map(|v| {
                    let factor = 10f64.powi(*decimals as i32);
                    json_number((v * factor).round() / factor)
                })
                .unwrap_or_else(|| value.clone()),
        }
    }
}

/// Typed collector record (spec §9): `{id, display_name, map, dtype,
/// default}`. The engine evaluates `map(state[id]) ?? default` for every
/// variable on each snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorVariable {
    pub id: String,
    pub display_name: String,
    #[serde(default = "default_value_map")]
    pub value_map: ValueMap,
    pub dtype: Option<String>,
    pub default: Option<Json>,
}

fn default_value_map() -> ValueMap {
    ValueMap::Identity
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collector {
    pub name: String,
    pub variables: Vec<CollectorVariable>,
}

/// Checks every variable id is in `"owner_uid.attribute"` form before the
/// collector is wired into an exporter.
pub fn validate_collector(collector: &Collector) -> crate::error::Result<()> {
    for var in &collector.variables {
        if var.id.split('.').count() < 2 {
            return Err(crate::error::MonitorError::MalformedVariableId(var.id.clone()));
        }
    }
    Ok(())
}

/// Filter/rename/remap a [`Snapshot`] per a [`Collector`] definition.
pub fn get_state(snapshot: &Snapshot, collector: &Collector) -> HashMap<String, Json> {
    let mut out = HashMap::with_capacity(collector.variables.len());
    for var in &collector.variables {
        let raw = snapshot.values.get(&var.id).cloned();
        let mapped = match raw {
            Some(value) => var.value_map.apply(&value),
            None => var.default.clone().unwrap_or(Json::Null),
        };
        out.insert(var.display_name.clone(), mapped);
    }
    out
}

pub fn shared_series() -> Arc<TimeSeries> {
    Arc::new(TimeSeries::new(crate::series::RingSize::UNBOUNDED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{RingSize, SeriesKey};

    #[test]
    fn state_flattens_latest_values_and_adds_datetime() {
        let series = TimeSeries::new(RingSize::UNBOUNDED);
        series.append(SeriesKey::new("machine-1", "temperature"), std::time::Duration::ZERO, 42.0);
        let snap = state(&series, "factory-1", Utc::now());

        assert_eq!(
            snap.values.get("machine-1.temperature").unwrap().as_f64(),
            Some(42.0)
        );
        assert!(snap.values.contains_key("factory-1.datetime"));
    }

    #[test]
    fn get_state_applies_default_for_missing_values() {
        let snapshot = Snapshot::default();
        let collector = Collector {
            name: "dashboard".into(),
            variables: vec![CollectorVariable {
                id: "machine-1.temperature".into(),
                display_name: "temp".into(),
                value_map: ValueMap::Identity,
                dtype: None,
                default: Some(Json::from(0.0)),
            }],
        };

        let out = get_state(&snapshot, &collector);
        assert_eq!(out.get("temp").unwrap().as_f64(), Some(0.0));
    }

    #[test]
    fn get_state_applies_lookup_value_map() {
        let mut values = HashMap::new();
        values.insert("machine-1.state".to_string(), Json::String("2".into()));
        let snapshot = Snapshot { values };

        let mut table = HashMap::new();
        table.insert("2".to_string(), Json::String("production".into()));

        let collector = Collector {
            name: "dashboard".into(),
            variables: vec![CollectorVariable {
                id: "machine-1.state".into(),
                display_name: "state_name".into(),
                value_map: ValueMap::Lookup(table),
                dtype: Some("categorical".into()),
                default: None,
            }],
        };

        let out = get_state(&snapshot, &collector);
        assert_eq!(out.get("state_name").unwrap(), &Json::String("production".into()));
    }
}
