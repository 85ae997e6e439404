//! Cron-driven schedule blocks, priority arbitration, and the built-in
//! block actions that drive machine programs, maintenance windows, and
//! procurement in the millwright factory simulator.

pub mod action;
pub mod block;
pub mod cron;
pub mod error;
pub mod schedule;

pub use action::{Action, ActionContext, ProcurementContent, SCHEDULE_PRIORITY};
pub use block::{BlockControl, BlockEvents, CronBlock};
pub use cron::CronSchedule;
pub use error::{Result, ScheduleError};
pub use schedule::{OperatingSchedule, Schedule};
