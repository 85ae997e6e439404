//! Material, Consumable and MaterialBatch (spec §3).

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A raw material consumed as discrete batches. Stable identity, no
/// mutable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    pub uid: String,
    pub name: String,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uid: format!("{name}-{}", short_uuid()),
            name,
        }
    }
}

/// A continuous consumable (e.g. coolant, power) tracked as a level rather
/// than discrete batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumable {
    pub uid: String,
    pub name: String,
}

impl Consumable {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uid: format!("{name}-{}", short_uuid()),
            name,
        }
    }
}

/// A discrete quantity of [`Material`] owned by exactly one
/// [`crate::containers::MaterialContainer`] at a time, or transiently by a
/// consumer mid-fetch.
#[derive(Debug, Clone)]
pub struct MaterialBatch {
    pub batch_id: String,
    pub material_uid: String,
    pub quantity: f64,
    pub quality: f64,
    pub consumption_factor: f64,
    pub created_ts: DateTime<Utc>,
}

impl MaterialBatch {
    pub fn new(material: &Material, quantity: f64, created_ts: DateTime<Utc>) -> Self {
        let batch_id = format!(
            "{}-{}-{}",
            material.name.replace(' ', "").to_uppercase(),
            created_ts.format("%Y%m%d"),
            short_uuid().to_uppercase(),
        );
        Self {
            batch_id,
            material_uid: material.uid.clone(),
            quantity,
            quality: 1.0,
            consumption_factor: 1.0,
            created_ts,
        }
    }

    /// Quantity after accounting for `consumption_factor` (spec §3: "Derived:
    /// effective_quantity = quantity / consumption_factor").
    pub fn effective_quantity(&self) -> f64 {
        self.quantity / self.consumption_factor
    }

    /// Split `amount` off the tail of this batch, leaving `self` holding the
    /// remainder and returning a new batch carrying the same `batch_id`,
    /// `quality` and `consumption_factor` (spec §3: "splitting creates a new
    /// batch carrying the same batch_id and quality/consumption_factor").
    pub fn split(&mut self, amount: f64) -> MaterialBatch {
        debug_assert!(amount <= self.quantity);
        self.quantity -= amount;
        MaterialBatch {
            batch_id: self.batch_id.clone(),
            material_uid: self.material_uid.clone(),
            quantity: amount,
            quality: self.quality,
            consumption_factor: self.consumption_factor,
            created_ts: self.created_ts,
        }
    }
}

fn short_uuid() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_preserves_total_quantity_and_lineage() {
        let material = Material::new("steel");
        let mut batch = MaterialBatch::new(&material, 100.0, Utc::now());
        batch.quality = 0.9;
        let original_id = batch.batch_id.clone();

        let split_off = batch.split(30.0);

        assert_eq!(batch.quantity, 70.0);
        assert_eq!(split_off.quantity, 30.0);
        assert_eq!(batch.quantity + split_off.quantity, 100.0);
        assert_eq!(split_off.batch_id, original_id);
        assert_eq!(split_off.quality, 0.9);
    }
}
