//! Room and machine temperature sensors (spec §4.J).
//!
//! `RoomTemperatureSensor` and `MachineTemperatureSensor` each need the
//! other's latest value; rather than holding circular `Arc`s to each other
//! (spec §9 "avoid cycles"), both sensors read and write through a shared
//! [`SensorRegistry`] keyed by uid, a minimal factory-wide sensor lookup.
//! Grounded on `original_source/src/simulator/sensors.py`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use millwright_engine::clock::Clock;
use millwright_engine::event::EdgeEvent;
use millwright_model::{AttributeRecorder, Rng};

use millwright_machine::{Issue, Machine, MachineState};

const ROOM_BASE_TEMP: f64 = 19.0;
const ROOM_HOURLY_DELTA: [f64; 24] = [
    -2.5, -2.75, -3.0, -2.5, -2.0, -1.5, -1.0, 0.0, // 0-7
    1.0, 2.0, 3.0, 3.1, 3.25, 3.5, 3.1, 2.5, // 8-15
    2.0, 1.0, 0.0, -1.0, -1.5, -1.75, -2.0, -2.25, // 16-23
];
const ROOM_NOISE_STD: f64 = 0.5;
const MACHINE_ROOM_PULL_DEGREES_PER_100: f64 = 5.0;

const OVERHEAT_LIMIT: f64 = 80.0;
const OVERHEAT_WARN_LIMIT: f64 = 70.0;

/// Minimal per-factory sensor lookup: room and machine sensors publish
/// their latest reading here instead of holding `Arc`s to one another.
#[derive(Default)]
pub struct SensorRegistry {
    room: Mutex<Option<f64>>,
    machines: Mutex<HashMap<String, f64>>,
}

impl SensorRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn room_value(&self) -> Option<f64> {
        *self.room.lock()
    }

    pub fn set_room_value(&self, value: f64) {
        *self.room.lock() = Some(value);
    }

    pub fn set_machine_value(&self, uid: &str, value: f64) {
        self.machines.lock().insert(uid.to_string(), value);
    }

    pub fn machine_values(&self) -> Vec<f64> {
        self.machines.lock().values().copied().collect()
    }
}

/// `value = 0.25*prev + 0.75*(base_temp + hourly_delta[hour] + derived
/// machine heat transfer + N(0,0.5))` (spec §4.J).
pub struct RoomTemperatureSensor {
    pub uid: String,
    clock: Arc<Clock>,
    rng: Arc<Rng>,
    recorder: Arc<dyn AttributeRecorder>,
    registry: Arc<SensorRegistry>,
    interval: Duration,
    decimals: i32,
    value: Mutex<f64>,
}

impl RoomTemperatureSensor {
    pub fn new(
        uid: impl Into<String>,
        clock: Arc<Clock>,
        rng: Arc<Rng>,
        recorder: Arc<dyn AttributeRecorder>,
        registry: Arc<SensorRegistry>,
        interval: Duration,
    ) -> Arc<Self> {
        let sensor = Arc::new(Self {
            uid: uid.into(),
            clock,
            rng,
            recorder,
            registry,
            interval,
            decimals: 2,
            value: Mutex::new(ROOM_BASE_TEMP),
        });
        sensor.registry.set_room_value(ROOM_BASE_TEMP);
        sensor
    }

    pub fn value(&self) -> f64 {
        *self.value.lock()
    }

    /// Periodic update loop; meant to be driven as its own long-lived
    /// process for the lifetime of the simulation.
    pub async fn run(self: Arc<Self>) {
        loop {
            self.clock.timeout(self.interval).await;
            let updated = self.tick();
            *self.value.lock() = updated;
            self.registry.set_room_value(updated);
            self.recorder.record(&self.uid, "temperature", updated);
        }
    }

    fn tick(&self) -> f64 {
        let prev = self.value();
        let deterministic = self.clock.is_deterministic();

        let machine_temps = self.registry.machine_values();
        let delta_machine = if machine_temps.is_empty() {
            0.0
        } else {
            let machine_mean = machine_temps.iter().sum::<f64>() / machine_temps.len() as f64;
            let duration_hours = self.interval.as_secs_f64() / 3600.0;
            2.0 * (machine_mean - prev) * machine_temps.len() as f64 * duration_hours
        };

        let hour = hour_of_day(&self.clock, self.interval);
        let delta_h = ROOM_HOURLY_DELTA[hour];
        let noise = self.rng.norm(deterministic, 0.0, ROOM_NOISE_STD);
        let target = ROOM_BASE_TEMP + delta_machine + delta_h + noise;

        let temp = 0.25 * prev + 0.75 * target;
        round_to(temp, self.decimals)
    }
}

/// A zero-argument stand-in for a real calendar: hour-of-day derived purely
/// from elapsed virtual seconds modulo a day, since the room sensor's
/// profile only needs a 0..24 bucket, not a true epoch. Callers that need an
/// actual wall-clock date (the operator's daily cycle) use
/// `crate::calendar` instead.
fn hour_of_day(clock: &Clock, _interval: Duration) -> usize {
    let seconds_in_day = 24 * 60 * 60;
    let elapsed = clock.now().as_secs() % seconds_in_day;
    (elapsed / 3600) as usize
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Default)]
pub struct MachineTemperatureEvents {
    pub temperature_changed: EdgeEvent,
}

/// State-driven first-order response (spec §4.J): each tick blends a pull
/// toward room temperature with a state-dependent heating/cooling rate,
/// scaled by the active program's `temp_factor`/quality while producing.
pub struct MachineTemperatureSensor {
    pub uid: String,
    machine: Arc<Machine>,
    clock: Arc<Clock>,
    rng: Arc<Rng>,
    recorder: Arc<dyn AttributeRecorder>,
    registry: Arc<SensorRegistry>,
    interval: Duration,
    decimals: i32,
    value: Mutex<f64>,
    pub events: MachineTemperatureEvents,
}

impl MachineTemperatureSensor {
    pub fn new(
        machine: Arc<Machine>,
        clock: Arc<Clock>,
        rng: Arc<Rng>,
        recorder: Arc<dyn AttributeRecorder>,
        registry: Arc<SensorRegistry>,
        interval: Duration,
    ) -> Arc<Self> {
        let uid = format!("{}.temperature-sensor", machine.uid);
        let init = registry.room_value().unwrap_or(ROOM_BASE_TEMP);
        let sensor = Arc::new(Self {
            uid,
            machine,
            clock,
            rng,
            recorder,
            registry,
            interval,
            decimals: 2,
            value: Mutex::new(init),
            events: MachineTemperatureEvents::default(),
        });
        sensor.registry.set_machine_value(&sensor.machine.uid, init);
        sensor
    }

    pub fn value(&self) -> f64 {
        *self.value.lock()
    }

    fn change_per_hour(state: MachineState) -> f64 {
        match state {
            MachineState::Production => 10.0,
            MachineState::On => 1.0,
            MachineState::Off => -3.0,
            MachineState::Error => -5.0,
        }
    }

    /// Periodic update loop, woken early by a machine state transition.
    /// Meant to be driven as its own long-lived process per machine.
    pub async fn run(self: Arc<Self>) {
        let mut update_time = self.clock.now();
        loop {
            tokio::select! {
                _ = self.clock.timeout(self.interval) => {
                    let now = self.clock.now();
                    let duration_hours = (now - update_time).as_secs_f64() / 3600.0;
                    update_time = now;
                    let updated = self.tick(self.machine.state(), duration_hours);
                    *self.value.lock() = updated;
                    self.registry.set_machine_value(&self.machine.uid, updated);
                    self.recorder.record(&self.uid, "temperature", updated);
                    self.events.temperature_changed.emit();
                }
                state = self.wait_for_state_change() => {
                    let now = self.clock.now();
                    let duration_hours = (now - update_time).as_secs_f64() / 3600.0;
                    update_time = now;
                    // An in-between state change updates the running estimate
                    // but isn't published: only a timeout tick is (matches
                    // `sensors.py`'s "Sensor is updated only if update is from
                    // timeout").
                    let _ = self.tick(state, duration_hours);
                }
            }
        }
    }

    async fn wait_for_state_change(&self) -> MachineState {
        tokio::select! {
            _ = self.machine.events.switched_on.wait() => {}
            _ = self.machine.events.switched_off.wait() => {}
            _ = self.machine.events.switched_production.wait() => {}
            _ = self.machine.events.switched_error.wait() => {}
        }
        self.machine.state()
    }

    fn tick(&self, state: MachineState, duration_hours: f64) -> f64 {
        let deterministic = self.clock.is_deterministic();
        let temp = self.value();
        let room_temp = self.registry.room_value().unwrap_or(temp);

        let delta_room = (room_temp - temp) / MACHINE_ROOM_PULL_DEGREES_PER_100 * duration_hours;
        let mut delta_mode = Self::change_per_hour(state) * duration_hours;

        if state == MachineState::Production {
            if let Some(program) = self.machine.current_program() {
                let quality = self.machine.last_quality().unwrap_or(1.0).max(f64::EPSILON);
                delta_mode *= program.temp_factor / quality;
            }
        }

        let noise = self.rng.norm(deterministic, 0.0, duration_hours * 10.0);
        let candidate = temp + delta_mode + delta_room;
        round_to(candidate.max(room_temp) + noise, self.decimals)
    }
}

/// Reacts to `temperature_changed`: raises an `Overheat` issue above 80
/// degrees (once, until the issue clears), warns once above 70.
pub async fn monitor_overheat(sensor: Arc<MachineTemperatureSensor>) {
    let mut warned = false;
    loop {
        sensor.events.temperature_changed.wait().await;
        let value = sensor.value();

        if value > OVERHEAT_LIMIT && sensor.machine.state() != MachineState::Error {
            sensor
                .machine
                .switch_error(Issue::Overheat {
                    realized: value,
                    limit: OVERHEAT_LIMIT,
                })
                .await;
            warned = false;
        } else if value > OVERHEAT_WARN_LIMIT && !warned {
            warn!(machine = %sensor.machine.uid, temperature = value, "temperature very high");
            warned = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap as Map;

    use millwright_model::{Bom, NullRecorder};

    fn deterministic_fixture() -> (Arc<Clock>, Arc<Rng>) {
        let clock = Arc::new(Clock::fast());
        clock.set_deterministic(true);
        (clock, Arc::new(Rng::from_seed(5)))
    }

    #[tokio::test]
    async fn room_sensor_blends_toward_hourly_target() {
        let (clock, rng) = deterministic_fixture();
        let registry = SensorRegistry::new();
        let sensor = RoomTemperatureSensor::new(
            "room",
            clock,
            rng,
            Arc::new(NullRecorder),
            registry,
            Duration::from_secs(5),
        );

        let first = sensor.tick();
        assert!(first.is_finite());
        assert_ne!(first, 0.0);
    }

    #[tokio::test]
    async fn machine_sensor_heats_up_during_production_and_cools_when_off() {
        let (clock, rng) = deterministic_fixture();
        let registry = SensorRegistry::new();
        registry.set_room_value(19.0);

        let program = Arc::new(millwright_machine::Program::new("run", Bom::default(), 0.01, 1.0));
        let mut programs = Map::new();
        programs.insert(program.uid.clone(), program);
        let machine = Machine::new(
            "press-1",
            Vec::new(),
            Map::new(),
            programs,
            clock.clone(),
            rng.clone(),
            Arc::new(NullRecorder),
            Duration::from_millis(50),
        );

        let sensor = MachineTemperatureSensor::new(
            machine.clone(),
            clock.clone(),
            rng.clone(),
            Arc::new(NullRecorder),
            registry,
            Duration::from_secs(5),
        );

        let heating = sensor.tick(MachineState::Production, 1.0);
        let cooling = sensor.tick(MachineState::Off, 1.0);
        assert!(heating > sensor.value());
        assert!(cooling <= sensor.value());
    }
}
