//! Materials, products, bills of material and the batch container algebra
//! that `millwright-machine`'s program execution consumes.

pub mod bom;
pub mod containers;
pub mod error;
pub mod material;
pub mod product;
pub mod recorder;
pub mod rng;

pub use bom::Bom;
pub use containers::{
    containers_for, get_from_containers, quantity_exists_in_containers, ConsumableContainer,
    ContainerRef, Fetched, MaterialContainer, ProductContainer,
};
pub use error::{ModelError, Result};
pub use material::{Consumable, Material, MaterialBatch};
pub use product::{Product, ProductBatch};
pub use recorder::{AttributeRecorder, NullRecorder};
pub use rng::Rng;
