//! Attribute recording hook (spec §4.C, Data Recording).
//!
//! The model crate only depends on this trait, never on a concrete time
//! series implementation — `millwright-monitor` provides the ring-buffered
//! recorder that machines, containers and programs are wired up with at
//! construction time.

/// Something that can observe a monitored attribute write.
pub trait AttributeRecorder: Send + Sync {
    fn record(&self, owner_uid: &str, key: &str, value: f64);
}

/// A recorder that discards everything; used where no recording is wanted
/// (most unit tests).
pub struct NullRecorder;

impl AttributeRecorder for NullRecorder {
    fn record(&self, _owner_uid: &str, _key: &str, _value: f64) {}
}
