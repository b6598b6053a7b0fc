//! Interfaces to the hardware and platform services the supervisor drives.
//!
//! The supervisor never talks to a peripheral directly. Each collaborator is a
//! trait object bundled into [`Collaborators`] and injected at construction, so
//! the flight build, the simulator and the tests differ only in what they plug
//! in here.

use crate::state::Millis;
use crate::telemetry::TelemetrySnapshot;

pub trait Imu {
    /// Body angular velocity in rad/s, sampled at call time.
    fn read_angular_velocity(&mut self) -> [f32; 3];
}

pub trait PowerMonitor {
    /// Available power in watts.
    fn read_power_w(&mut self) -> f32;
}

pub trait SunSensor {
    /// Angle between the reference axis and the sun vector, degrees.
    fn alignment_error_deg(&mut self) -> f32;
}

/// Sensor consistency checks and the scoped resets that recover from them.
pub trait SensorHealth {
    fn is_anomalous(&mut self) -> bool;

    fn driver_reset_required(&mut self) -> bool {
        false
    }

    fn critical_fault(&mut self) -> bool {
        false
    }

    /// Reboot the sensor drivers only.
    fn reinitialize_sensors(&mut self);

    /// Reboot every peripheral driver without touching primary power.
    fn reset_drivers(&mut self);
}

/// Fire-and-forget actuator commands. All calls are idempotent.
pub trait Actuators {
    fn engage_detumble_actuators(&mut self);
    fn release_detumble_actuators(&mut self) {}
    fn point_at_sun(&mut self) {}
    fn hold_attitude(&mut self) {}
    fn shed_non_essential_loads(&mut self);
    fn restore_loads(&mut self) {}
}

/// External circuit that removes and reapplies primary power.
pub trait PowerCycleController {
    fn request_power_cycle(&mut self);
}

/// Monotonic time source. Must not regress.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Hardware liveness guard. If `refresh` is not called within the armed
/// timeout the platform resets unconditionally.
pub trait Watchdog {
    fn initialize(&mut self, timeout_ms: Millis);
    fn refresh(&mut self);
}

pub trait TelemetrySink {
    fn publish(&mut self, snapshot: &TelemetrySnapshot);
}

/// Everything the supervisor needs from the platform apart from storage.
pub struct Collaborators {
    pub imu: Box<dyn Imu>,
    pub power: Box<dyn PowerMonitor>,
    pub sun_sensor: Box<dyn SunSensor>,
    pub health: Box<dyn SensorHealth>,
    pub actuators: Box<dyn Actuators>,
    pub power_cycle: Box<dyn PowerCycleController>,
    pub clock: Box<dyn Clock>,
    pub watchdog: Box<dyn Watchdog>,
    pub telemetry: Box<dyn TelemetrySink>,
}

impl core::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Sink that drops every snapshot.
#[derive(Debug, Default)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn publish(&mut self, _snapshot: &TelemetrySnapshot) {}
}

/// Wall-clock time source for hosted builds. Clones share the same epoch.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        // Saturate rather than wrap after ~49 days so the source never regresses.
        u32::try_from(self.start.elapsed().as_millis()).unwrap_or(u32::MAX)
    }
}
