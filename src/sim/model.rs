//! Coarse spacecraft model backing every collaborator trait.
//!
//! The dynamics are deliberately first-order: detumbling decays body rates
//! exponentially while the magnetorquers are engaged, sun pointing slews the
//! alignment error down at a fixed rate, and the power reading is the supply
//! level set by the scenario. Good enough to exercise every mode path.

use crate::hal::{Actuators, Imu, PowerCycleController, PowerMonitor, SensorHealth, SunSensor};
use crate::state::Millis;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

const DEFAULT_DETUMBLE_GAIN_PER_S: f32 = 0.5;
const DEFAULT_SLEW_RATE_DEG_S: f32 = 5.0;
const DEFAULT_SUPPLY_W: f32 = 6.0;
const DEFAULT_SUN_ERROR_DEG: f32 = 30.0;

pub type SpacecraftHandle = Rc<RefCell<SpacecraftModel>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub detumble_engaged: bool,
    pub pointing_at_sun: bool,
    pub holding_attitude: bool,
    pub loads_shed: bool,
}

/// Calls received from the supervisor, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCounters {
    pub detumble_engagements: u32,
    pub detumble_releases: u32,
    pub sun_pointing: u32,
    pub attitude_holds: u32,
    pub load_sheds: u32,
    pub load_restores: u32,
    pub sensor_reinits: u32,
    pub driver_resets: u32,
    pub power_cycle_requests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpacecraftModel {
    pub angular_velocity: [f32; 3],
    pub sun_error_deg: f32,
    pub supply_w: f32,
    pub detumble_gain_per_s: f32,
    pub slew_rate_deg_s: f32,
    pub sensor_anomalous: bool,
    /// Anomaly survives sensor reinitialization.
    pub anomaly_persistent: bool,
    pub driver_reset_required: bool,
    /// Driver fault survives a scoped driver reset.
    pub driver_fault_persistent: bool,
    pub critical: bool,
    pub actuators: ActuatorState,
    pub commands: CommandCounters,
}

impl Default for SpacecraftModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SpacecraftModel {
    pub fn new() -> Self {
        Self {
            angular_velocity: [0.0; 3],
            sun_error_deg: DEFAULT_SUN_ERROR_DEG,
            supply_w: DEFAULT_SUPPLY_W,
            detumble_gain_per_s: DEFAULT_DETUMBLE_GAIN_PER_S,
            slew_rate_deg_s: DEFAULT_SLEW_RATE_DEG_S,
            sensor_anomalous: false,
            anomaly_persistent: false,
            driver_reset_required: false,
            driver_fault_persistent: false,
            critical: false,
            actuators: ActuatorState::default(),
            commands: CommandCounters::default(),
        }
    }

    pub fn with_angular_velocity(mut self, angular_velocity: [f32; 3]) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_sun_error(mut self, sun_error_deg: f32) -> Self {
        self.sun_error_deg = sun_error_deg;
        self
    }

    pub fn with_supply(mut self, supply_w: f32) -> Self {
        self.supply_w = supply_w;
        self
    }

    /// Advance the dynamics by `dt_ms`.
    pub fn step(&mut self, dt_ms: Millis) {
        let dt_s = dt_ms as f32 / 1000.0;
        if self.actuators.detumble_engaged {
            let decay = (-self.detumble_gain_per_s * dt_s).exp();
            for w in &mut self.angular_velocity {
                *w *= decay;
            }
        }
        if self.actuators.pointing_at_sun {
            self.sun_error_deg = (self.sun_error_deg - self.slew_rate_deg_s * dt_s).max(0.0);
        }
    }

    pub fn into_handle(self) -> SpacecraftHandle {
        Rc::new(RefCell::new(self))
    }
}

/// One view of the shared model that implements every device trait.
#[derive(Debug, Clone)]
pub struct SimDevices {
    model: SpacecraftHandle,
}

impl SimDevices {
    pub fn new(model: SpacecraftHandle) -> Self {
        Self { model }
    }
}

impl Imu for SimDevices {
    fn read_angular_velocity(&mut self) -> [f32; 3] {
        self.model.borrow().angular_velocity
    }
}

impl PowerMonitor for SimDevices {
    fn read_power_w(&mut self) -> f32 {
        self.model.borrow().supply_w
    }
}

impl SunSensor for SimDevices {
    fn alignment_error_deg(&mut self) -> f32 {
        self.model.borrow().sun_error_deg
    }
}

impl SensorHealth for SimDevices {
    fn is_anomalous(&mut self) -> bool {
        self.model.borrow().sensor_anomalous
    }

    fn driver_reset_required(&mut self) -> bool {
        self.model.borrow().driver_reset_required
    }

    fn critical_fault(&mut self) -> bool {
        self.model.borrow().critical
    }

    fn reinitialize_sensors(&mut self) {
        let mut model = self.model.borrow_mut();
        model.commands.sensor_reinits += 1;
        if !model.anomaly_persistent {
            model.sensor_anomalous = false;
        }
    }

    fn reset_drivers(&mut self) {
        let mut model = self.model.borrow_mut();
        model.commands.driver_resets += 1;
        if !model.driver_fault_persistent {
            model.driver_reset_required = false;
        }
    }
}

impl Actuators for SimDevices {
    fn engage_detumble_actuators(&mut self) {
        let mut model = self.model.borrow_mut();
        model.actuators.detumble_engaged = true;
        model.commands.detumble_engagements += 1;
    }

    fn release_detumble_actuators(&mut self) {
        let mut model = self.model.borrow_mut();
        model.actuators.detumble_engaged = false;
        model.commands.detumble_releases += 1;
    }

    fn point_at_sun(&mut self) {
        let mut model = self.model.borrow_mut();
        model.actuators.pointing_at_sun = true;
        model.actuators.holding_attitude = false;
        model.commands.sun_pointing += 1;
    }

    fn hold_attitude(&mut self) {
        let mut model = self.model.borrow_mut();
        model.actuators.pointing_at_sun = false;
        model.actuators.holding_attitude = true;
        model.commands.attitude_holds += 1;
    }

    fn shed_non_essential_loads(&mut self) {
        let mut model = self.model.borrow_mut();
        model.actuators.loads_shed = true;
        model.commands.load_sheds += 1;
    }

    fn restore_loads(&mut self) {
        let mut model = self.model.borrow_mut();
        model.actuators.loads_shed = false;
        model.commands.load_restores += 1;
    }
}

impl PowerCycleController for SimDevices {
    fn request_power_cycle(&mut self) {
        self.model.borrow_mut().commands.power_cycle_requests += 1;
    }
}
