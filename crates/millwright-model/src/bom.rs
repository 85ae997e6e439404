//! Bill of materials (spec §3, §4.E).

use std::collections::HashMap;

/// Per-second (or, for products, per-run) quantities keyed by content uid.
/// Grounded on `original_source/src/simulator/bom.py`'s three mappings.
#[derive(Debug, Clone, Default)]
pub struct Bom {
    /// material_uid -> consumption rate per second
    pub materials: HashMap<String, f64>,
    /// consumable_uid -> consumption rate per second
    pub consumables: HashMap<String, f64>,
    /// product_uid -> quantity produced per run
    pub products: HashMap<String, f64>,
}

impl Bom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_material(mut self, uid: impl Into<String>, rate_per_second: f64) -> Self {
        self.materials.insert(uid.into(), rate_per_second);
        self
    }

    pub fn with_consumable(mut self, uid: impl Into<String>, rate_per_second: f64) -> Self {
        self.consumables.insert(uid.into(), rate_per_second);
        self
    }

    pub fn with_product(mut self, uid: impl Into<String>, quantity_per_run: f64) -> Self {
        self.products.insert(uid.into(), quantity_per_run);
        self
    }
}
