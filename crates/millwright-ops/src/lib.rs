//! Maintenance crew, operator daily cycle, and temperature sensors that
//! drive a running factory floor on top of `millwright-machine`.

pub mod calendar;
pub mod error;
pub mod maintenance;
pub mod operator;
pub mod sensors;

pub use error::{OpsError, Result};
pub use maintenance::{Maintenance, MaintenanceEvents, MaintenanceTicket, MAINTENANCE_PRIORITY};
pub use operator::{Operator, OperatorEvents, OperatorSchedule, OperatorState, OPERATOR_PRIORITY};
pub use sensors::{
    monitor_overheat, MachineTemperatureEvents, MachineTemperatureSensor, RoomTemperatureSensor,
    SensorRegistry,
};
