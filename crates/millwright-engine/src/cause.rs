//! Instantaneous interrupt reasons (spec §7, "Causes").
//!
//! Causes are delivered to a running process via [`crate::process::InterruptSender`]
//! and observed at the process's next suspension point. Unlike [`Issue`](https://docs.rs/millwright-machine)
//! (defined in `millwright-machine`, since issues are durable and reference the
//! machine they afflict), causes carry no long-lived state.

use serde::{Deserialize, Serialize};

/// A reason a running process was interrupted.
///
/// Mirrors the taxonomy in `original_source/src/simulator/causes.py`: every
/// cause except `WorkStopped`, `Preempted` and `Unknown` carries a `force`
/// flag, and its numeric `code` is bumped by 900 when `force` is set, which
/// keeps the code observable in monitored attributes distinguishable from a
/// graceful variant of the same cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cause {
    /// The operator (or an automated action) switched the machine off.
    ManualSwitchOff { force: bool },
    /// Production was stopped without switching the machine off.
    ManualStopProduction { force: bool },
    /// A schedule block ended production automatically.
    AutomatedStopProduction { force: bool },
    /// The active program is being swapped for another one.
    ProgramSwitch { force: bool },
    /// The operator has left work for the day.
    WorkStopped,
    /// A machine issue is forcing production to stop (spec §4.F: an
    /// issue-driven `_switch_error` always interrupts production
    /// immediately, never gracefully).
    IssueOccurred,
    /// A higher-priority requester preempted a `PreemptiveMutex` holder.
    Preempted,
    /// A cause that does not fit any known kind; per spec §7 this is a
    /// design bug and re-raising it should terminate the simulation.
    Unknown,
}

impl Cause {
    /// Base numeric code before applying the `force` bump, matching
    /// `causes.py`'s `code` class attributes.
    pub fn code(&self) -> u32 {
        match self {
            Cause::ManualSwitchOff { force } => 1 + force_bump(*force),
            Cause::ManualStopProduction { force } => 2 + force_bump(*force),
            Cause::AutomatedStopProduction { force } => 3 + force_bump(*force),
            Cause::ProgramSwitch { force } => 4 + force_bump(*force),
            Cause::WorkStopped => 5,
            Cause::IssueOccurred => 6,
            Cause::Preempted => 990,
            Cause::Unknown => 999,
        }
    }

    /// Whether this cause instructs the receiver to break immediately
    /// rather than finish gracefully. `Preempted` and `WorkStopped` have no
    /// force concept and are treated as non-forcing by default; callers
    /// that need to force-abort on preemption should check the variant
    /// directly (spec §4.E step 4: "If `force == true` or the cause is an
    /// Issue: break immediately").
    pub fn force(&self) -> bool {
        matches!(
            self,
            Cause::ManualSwitchOff { force: true }
                | Cause::ManualStopProduction { force: true }
                | Cause::AutomatedStopProduction { force: true }
                | Cause::ProgramSwitch { force: true }
                | Cause::IssueOccurred
        )
    }

    /// `true` for causes an operator monitor routine should silently
    /// absorb (spec §7: "Causes delivered to operator monitors are
    /// absorbed iff they are WorkStopped").
    pub fn is_work_stopped(&self) -> bool {
        matches!(self, Cause::WorkStopped)
    }

    /// `true` for `Preempted`, which a speculative machine-transition
    /// attempt should silently absorb (spec §7).
    pub fn is_preempted(&self) -> bool {
        matches!(self, Cause::Preempted)
    }
}

fn force_bump(force: bool) -> u32 {
    900 * force as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_bumps_the_code() {
        assert_eq!(Cause::ManualSwitchOff { force: false }.code(), 1);
        assert_eq!(Cause::ManualSwitchOff { force: true }.code(), 901);
    }

    #[test]
    fn work_stopped_is_absorbable_only_by_name() {
        assert!(Cause::WorkStopped.is_work_stopped());
        assert!(!Cause::Preempted.is_work_stopped());
    }
}
