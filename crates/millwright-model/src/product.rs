//! Product and ProductBatch (spec §3).

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub uid: String,
    pub name: String,
}

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uid: format!("product-{name}"),
            name,
        }
    }
}

/// Immutable after creation except `quantity` during splits (spec §3).
#[derive(Debug, Clone)]
pub struct ProductBatch {
    pub product_uid: String,
    pub batch_id: String,
    pub quantity: u64,
    pub quality: f64,
    pub details: HashMap<String, String>,
}

impl ProductBatch {
    pub fn new(product: &Product, batch_id: impl Into<String>, quantity: u64, quality: f64) -> Self {
        Self {
            product_uid: product.uid.clone(),
            batch_id: batch_id.into(),
            quantity,
            quality,
            details: HashMap::new(),
        }
    }

    /// `floor((1-quality)*quantity)` (spec §3).
    pub fn failed_quantity(&self) -> u64 {
        ((1.0 - self.quality) * self.quantity as f64) as u64
    }

    pub fn success_quantity(&self) -> u64 {
        self.quantity - self.failed_quantity()
    }

    /// Split `amount` off this batch, returning a new batch carrying the
    /// same `batch_id` and `quality`.
    pub fn split(&mut self, amount: u64) -> ProductBatch {
        debug_assert!(amount <= self.quantity);
        self.quantity -= amount;
        ProductBatch {
            product_uid: self.product_uid.clone(),
            batch_id: self.batch_id.clone(),
            quantity: amount,
            quality: self.quality,
            details: self.details.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_and_success_quantity_partition_the_batch() {
        let product = Product::new("widget");
        let batch = ProductBatch::new(&product, "B-1", 100, 0.9);
        assert_eq!(batch.failed_quantity(), 10);
        assert_eq!(batch.success_quantity(), 90);
        assert_eq!(batch.failed_quantity() + batch.success_quantity(), batch.quantity);
    }
}
