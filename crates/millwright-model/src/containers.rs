//! Batch container algebra (spec §4.D).
//!
//! `MaterialContainer` holds an ordered list of [`MaterialBatch`]; `get`
//! takes from the tail and splits the last batch touched if it would
//! overshoot. `ConsumableContainer` holds a continuous level. Both containers
//! carry a [`PreemptiveMutex`] that `Program` locks for the duration of a
//! run (spec §4.E step 3) — the container itself never blocks on it.

use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tracing::{debug, warn};

use millwright_engine::clock::Clock;
use millwright_engine::mutex::PreemptiveMutex;

use crate::error::{ModelError, Result};
use crate::material::{Material, MaterialBatch};
use crate::product::{Product, ProductBatch};
use crate::recorder::{AttributeRecorder, NullRecorder};
use crate::rng::Rng;

/// Container with continuous contents (spec §3: ConsumableContainer).
pub struct ConsumableContainer {
    pub uid: String,
    pub consumable_uid: String,
    pub capacity: f64,
    pub fill_rate: f64,
    level: SyncMutex<f64>,
    pub lock: Arc<PreemptiveMutex>,
    recorder: Arc<dyn AttributeRecorder>,
}

impl ConsumableContainer {
    pub fn new(uid: impl Into<String>, consumable_uid: impl Into<String>, capacity: f64, fill_rate: f64, init: Option<f64>) -> Self {
        let uid = uid.into();
        Self {
            lock: PreemptiveMutex::new(format!("{uid}-lock")),
            uid,
            consumable_uid: consumable_uid.into(),
            capacity,
            fill_rate,
            level: SyncMutex::new(init.unwrap_or(capacity)),
            recorder: Arc::new(NullRecorder),
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn AttributeRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn level(&self) -> f64 {
        *self.level.lock()
    }

    pub fn free(&self) -> f64 {
        self.capacity - self.level()
    }

    /// Fills the container over a simulated duration, clipping to free
    /// space. Grounded on `containers.py::ConsumableContainer.put`.
    pub async fn put(&self, clock: &Clock, mut quantity: f64) -> f64 {
        if quantity > self.free() {
            let adjusted = self.free();
            warn!(
                container = %self.uid,
                requested = quantity,
                adjusted,
                "clipped put to free capacity",
            );
            quantity = adjusted;
        }

        let duration_hours = quantity / self.fill_rate;
        clock
            .timeout(std::time::Duration::from_secs_f64(duration_hours * 3600.0))
            .await;

        *self.level.lock() += quantity;
        self.recorder.record(&self.uid, "level", self.level());
        quantity
    }

    pub fn get(&self, quantity: f64) -> Result<f64> {
        let mut level = self.level.lock();
        if quantity > *level {
            return Err(ModelError::ExceedsLevel {
                quantity,
                level: *level,
            });
        }
        *level -= quantity;
        self.recorder.record(&self.uid, "level", *level);
        Ok(quantity)
    }
}

/// Container with discrete, orderable contents (spec §3: MaterialContainer).
pub struct MaterialContainer {
    pub uid: String,
    pub material: Material,
    pub capacity: f64,
    pub fill_rate: f64,
    batches: SyncMutex<Vec<MaterialBatch>>,
    pub lock: Arc<PreemptiveMutex>,
    recorder: Arc<dyn AttributeRecorder>,
}

impl MaterialContainer {
    pub fn new(uid: impl Into<String>, material: Material, capacity: f64, fill_rate: f64, init: Option<Vec<MaterialBatch>>) -> Self {
        let uid = uid.into();
        let batches = init.unwrap_or_else(|| vec![MaterialBatch::new(&material, capacity, chrono::Utc::now())]);
        Self {
            lock: PreemptiveMutex::new(format!("{uid}-lock")),
            uid,
            material,
            capacity,
            fill_rate,
            batches: SyncMutex::new(batches),
            recorder: Arc::new(NullRecorder),
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn AttributeRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn level(&self) -> f64 {
        self.batches.lock().iter().map(|b| b.quantity).sum()
    }

    pub fn free(&self) -> f64 {
        self.capacity - self.level()
    }

    pub fn n_batches(&self) -> usize {
        self.batches.lock().len()
    }

    /// Inserts a batch at the head after a simulated fill delay, clipping to
    /// free space. Grounded on `containers.py::MaterialContainer.put`.
    pub async fn put(&self, clock: &Clock, rng: &Rng, deterministic: bool, mut batch: MaterialBatch) -> MaterialBatch {
        if batch.quantity > self.free() {
            let adjusted = self.free();
            warn!(
                container = %self.uid,
                requested = batch.quantity,
                adjusted,
                "clipped batch to free capacity",
            );
            batch.quantity = adjusted;
        }

        if batch.quantity > 0.0 {
            let duration_hours = rng.pnorm(deterministic, batch.quantity / self.fill_rate, 0.01);
            clock
                .timeout(std::time::Duration::from_secs_f64(duration_hours * 3600.0))
                .await;
            self.batches.lock().insert(0, batch.clone());
        } else {
            warn!(container = %self.uid, "batch quantity 0, won't fit into container");
        }

        self.recorder.record(&self.uid, "level", self.level());
        batch
    }

    /// Takes batches from the tail, splitting the last one touched if it
    /// would overshoot `quantity` (spec §4.D step 3). Never suspends.
    pub fn get(&self, quantity: f64) -> Result<Vec<MaterialBatch>> {
        let mut batches = self.batches.lock();
        let level: f64 = batches.iter().map(|b| b.quantity).sum();
        if quantity > level {
            return Err(ModelError::ExceedsLevel { quantity, level });
        }

        let mut fetched = Vec::new();
        let mut fetched_quantity = 0.0;

        while let Some(mut batch) = batches.pop() {
            let missing = quantity - fetched_quantity;
            let would_be = fetched_quantity + batch.quantity;

            if would_be > quantity {
                let split_off = batch.split(missing);
                batches.push(batch);
                fetched_quantity += missing;
                fetched.push(split_off);
            } else {
                fetched_quantity += batch.quantity;
                fetched.push(batch);
            }

            if fetched_quantity == quantity {
                break;
            }
            if fetched_quantity > quantity {
                return Err(ModelError::Overshoot {
                    fetched: fetched_quantity,
                    requested: quantity,
                });
            }
        }

        debug!(container = %self.uid, level = self.level(), "get completed");
        Ok(fetched)
    }
}

/// Container with discrete, orderable contents (spec §3: ProductContainer).
pub struct ProductContainer {
    pub uid: String,
    pub product: Product,
    batches: SyncMutex<Vec<ProductBatch>>,
    recorder: Arc<dyn AttributeRecorder>,
}

impl ProductContainer {
    pub fn new(uid: impl Into<String>, product: Product) -> Self {
        Self {
            uid: uid.into(),
            product,
            batches: SyncMutex::new(Vec::new()),
            recorder: Arc::new(NullRecorder),
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn AttributeRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn level(&self) -> u64 {
        self.batches.lock().iter().map(|b| b.quantity).sum()
    }

    pub fn n_batches(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn put(&self, batch: ProductBatch) {
        self.batches.lock().push(batch);
        self.recorder.record(&self.uid, "quantity", self.level() as f64);
    }

    pub fn get(&self, quantity: u64) -> Result<Vec<ProductBatch>> {
        let mut batches = self.batches.lock();
        let level: u64 = batches.iter().map(|b| b.quantity).sum();
        if quantity > level {
            return Err(ModelError::ExceedsLevel {
                quantity: quantity as f64,
                level: level as f64,
            });
        }

        let mut fetched = Vec::new();
        let mut fetched_quantity = 0u64;

        while let Some(mut batch) = batches.pop() {
            let missing = quantity - fetched_quantity;
            let would_be = fetched_quantity + batch.quantity;

            if would_be > quantity {
                let split_off = batch.split(missing);
                batches.push(batch);
                fetched_quantity += missing;
                fetched.push(split_off);
            } else {
                fetched_quantity += batch.quantity;
                fetched.push(batch);
            }

            if fetched_quantity == quantity {
                break;
            }
        }

        Ok(fetched)
    }
}

/// Polymorphic handle over the two container kinds a BOM line can reference,
/// letting `get_from_containers` treat them uniformly (spec §4.D).
#[derive(Clone)]
pub enum ContainerRef {
    Material(Arc<MaterialContainer>),
    Consumable(Arc<ConsumableContainer>),
}

/// What a single container contributed to a multi-container fetch.
pub enum Fetched {
    Material(Vec<MaterialBatch>),
    Consumable(f64),
}

impl ContainerRef {
    pub fn level(&self) -> f64 {
        match self {
            ContainerRef::Material(c) => c.level(),
            ContainerRef::Consumable(c) => c.level(),
        }
    }

    /// Uid of the material/consumable this container holds, used by
    /// `Program::run` to resolve a BOM line to its attached containers.
    pub fn content_uid(&self) -> &str {
        match self {
            ContainerRef::Material(c) => &c.material.uid,
            ContainerRef::Consumable(c) => &c.consumable_uid,
        }
    }

    pub fn lock(&self) -> Arc<PreemptiveMutex> {
        match self {
            ContainerRef::Material(c) => c.lock.clone(),
            ContainerRef::Consumable(c) => c.lock.clone(),
        }
    }

    fn get(&self, quantity: f64) -> Result<Fetched> {
        match self {
            ContainerRef::Material(c) => c.get(quantity).map(Fetched::Material),
            ContainerRef::Consumable(c) => c.get(quantity).map(Fetched::Consumable),
        }
    }
}

/// Containers among `all` whose content uid matches `content_uid`, in
/// attachment order. Grounded on `program.py::find_containers_by_type`.
pub fn containers_for(content_uid: &str, all: &[ContainerRef]) -> Vec<ContainerRef> {
    all.iter()
        .filter(|c| c.content_uid() == content_uid)
        .cloned()
        .collect()
}

/// Whether `quantity` is available across `containers` (spec §4.D step 1).
pub fn quantity_exists_in_containers(quantity: f64, containers: &[ContainerRef]) -> bool {
    let total: f64 = containers.iter().map(|c| c.level()).sum();
    if total < quantity {
        debug!(total, quantity, "insufficient quantity across containers");
    }
    total >= quantity
}

/// Fetch `quantity` from `containers`, taking as much as possible from each
/// in order (the only strategy implemented, matching
/// `containers.py::get_from_containers`'s `"first"` strategy). Never
/// suspends.
pub fn get_from_containers(
    quantity: f64,
    containers: &[ContainerRef],
) -> Result<(Vec<MaterialBatch>, f64)> {
    if !quantity_exists_in_containers(quantity, containers) {
        let available = containers.iter().map(|c| c.level()).sum();
        return Err(ModelError::InsufficientQuantity {
            requested: quantity,
            available,
        });
    }

    let mut left = quantity;
    let mut batches = Vec::new();
    let mut total = 0.0;

    for container in containers {
        let to_get = container.level().min(left);
        if to_get <= 0.0 {
            continue;
        }
        match container.get(to_get)? {
            Fetched::Material(got) => {
                total += got.iter().map(|b| b.effective_quantity()).sum::<f64>();
                batches.extend(got);
            }
            Fetched::Consumable(got) => {
                total += got;
            }
        }
        // `to_get` is raw quantity actually pulled from this container;
        // track the remaining request in raw units so a `consumption_factor`
        // != 1.0 on one container doesn't get applied again when deciding
        // how much more to pull from the next one.
        left -= to_get;
        if left <= 0.0 {
            break;
        }
    }

    Ok((batches, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_get_splits_the_last_batch_touched() {
        let material = Material::new("steel");
        let batch = MaterialBatch::new(&material, 100.0, chrono::Utc::now());
        let container = MaterialContainer::new("c1", material, 100.0, 50.0, Some(vec![batch]));

        let fetched = container.get(40.0).unwrap();
        assert_eq!(fetched.iter().map(|b| b.quantity).sum::<f64>(), 40.0);
        assert_eq!(container.level(), 60.0);
    }

    #[test]
    fn material_get_spans_multiple_batches_fifo_from_tail() {
        let material = Material::new("steel");
        let created = chrono::Utc::now();
        let older = MaterialBatch::new(&material, 30.0, created);
        let newer = MaterialBatch::new(&material, 30.0, created);
        // batches[0] is the head (most recently inserted); get() pops from
        // the tail, so `older` (pushed first) must be consumed first.
        let container = MaterialContainer::new("c1", material, 100.0, 50.0, Some(vec![newer, older]));

        let fetched = container.get(40.0).unwrap();
        assert_eq!(fetched.iter().map(|b| b.quantity).sum::<f64>(), 40.0);
        assert_eq!(container.level(), 20.0);
        assert_eq!(container.n_batches(), 2); // one whole + one split remainder
    }

    #[test]
    fn get_exceeding_level_is_an_error() {
        let material = Material::new("steel");
        let batch = MaterialBatch::new(&material, 10.0, chrono::Utc::now());
        let container = MaterialContainer::new("c1", material, 100.0, 50.0, Some(vec![batch]));
        assert!(container.get(20.0).is_err());
    }

    #[test]
    fn get_from_containers_drains_first_then_second() {
        let material = Material::new("steel");
        let b1 = MaterialBatch::new(&material, 10.0, chrono::Utc::now());
        let b2 = MaterialBatch::new(&material, 50.0, chrono::Utc::now());
        let c1 = Arc::new(MaterialContainer::new("c1", material.clone(), 10.0, 50.0, Some(vec![b1])));
        let c2 = Arc::new(MaterialContainer::new("c2", material, 50.0, 50.0, Some(vec![b2])));

        let refs = vec![ContainerRef::Material(c1.clone()), ContainerRef::Material(c2.clone())];
        let (batches, total) = get_from_containers(25.0, &refs).unwrap();

        assert_eq!(batches.iter().map(|b| b.quantity).sum::<f64>(), 25.0);
        assert_eq!(total, 25.0);
        assert_eq!(c1.level(), 0.0);
        assert_eq!(c2.level(), 35.0);
    }

    #[test]
    fn get_from_containers_fails_when_insufficient() {
        let material = Material::new("steel");
        let b1 = MaterialBatch::new(&material, 10.0, chrono::Utc::now());
        let c1 = Arc::new(MaterialContainer::new("c1", material, 10.0, 50.0, Some(vec![b1])));
        let refs = vec![ContainerRef::Material(c1)];
        assert!(get_from_containers(20.0, &refs).is_err());
    }
}
