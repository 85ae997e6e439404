//! Durable fault taxonomy (spec §7, "Issues").
//!
//! Unlike [`millwright_engine::Cause`], an issue is long-lived: it routes a
//! machine into `error` via [`crate::machine::Machine::switch_error`] and can
//! only be retired by an explicit `clear_issue`. Grounded on
//! `original_source/src/simulator/issues.py`.

use std::sync::Arc;

use millwright_model::Material;

#[derive(Debug, Clone)]
pub enum Issue {
    /// No container of the required type is attached to the machine.
    ContainerMissing { content_uid: String },
    /// Attached containers don't hold enough quantity for the run.
    LowContainerLevel,
    /// Room/machine temperature sensor observed `value > high_limit`.
    Overheat { realized: f64, limit: f64 },
    /// Competing demand on the maintenance team from another customer.
    OtherCustomer,
    /// A pre-planned maintenance window for this machine.
    ScheduledMaintenance { duration: std::time::Duration },
    /// A specific machine part broke and needs fixing.
    PartBroken {
        part: Arc<Material>,
        needs_maintenance: bool,
        difficulty: f64,
    },
    /// Doesn't fit any known kind; per spec §7 this is a design bug.
    Unknown,
}

impl Issue {
    /// Numeric code, matching `issues.py`'s `code` class attributes (the
    /// `100 +` offset there distinguishes issue codes from cause codes).
    pub fn code(&self) -> u32 {
        match self {
            Issue::ContainerMissing { .. } => 101,
            Issue::LowContainerLevel => 102,
            Issue::Overheat { .. } => 103,
            Issue::OtherCustomer => 104,
            Issue::ScheduledMaintenance { .. } => 105,
            Issue::PartBroken { .. } => 200,
            Issue::Unknown => 999,
        }
    }

    /// Lower is more urgent, matching `issues.py`'s `priority` class
    /// attributes.
    pub fn priority(&self) -> i64 {
        match self {
            Issue::ContainerMissing { .. } | Issue::LowContainerLevel => 3,
            Issue::Overheat { .. } | Issue::OtherCustomer => 5,
            Issue::ScheduledMaintenance { .. } => 1,
            Issue::PartBroken { .. } => 0,
            Issue::Unknown => 999,
        }
    }

    pub fn needs_maintenance(&self) -> bool {
        match self {
            Issue::OtherCustomer | Issue::ScheduledMaintenance { .. } => true,
            Issue::PartBroken {
                needs_maintenance, ..
            } => *needs_maintenance,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_maintenance_outranks_other_customer() {
        let scheduled = Issue::ScheduledMaintenance {
            duration: std::time::Duration::from_secs(3600),
        };
        let other = Issue::OtherCustomer;
        assert!(scheduled.priority() < other.priority());
    }
}
