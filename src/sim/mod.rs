//! Hosted simulation of the platform around the supervisor.
//!
//! [`SimPlatform`] wires a shared [`SpacecraftModel`] into a full set of
//! [`Collaborators`], so the same machine runs here as on hardware. A platform
//! outlives the supervisors built on it: calling [`SimPlatform::collaborators`]
//! again after a power cycle models a reboot against the same spacecraft.

pub mod fault_injection;
pub mod mission;
pub mod model;

pub use fault_injection::{
    ActiveFault, FaultInjectionConfig, FaultInjectionStats, FaultInjector, InjectedFault,
    InjectionEvent, InjectionKind, ScheduledFault,
};
pub use mission::{Mission, MissionStep, RebootCause};
pub use model::{ActuatorState, CommandCounters, SimDevices, SpacecraftHandle, SpacecraftModel};

use crate::hal::{Clock, Collaborators};
use crate::scheduler::CycleTicker;
use crate::state::Millis;
use crate::telemetry::TelemetryBuffer;
use crate::watchdog::{SimulatedWatchdog, WatchdogProbe};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, Ref, RefMut};
use std::rc::Rc;

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: Millis) -> Self {
        let clock = Self::new();
        clock.set(now);
        clock
    }

    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}

/// Ticker for simulated time: each tick advances the clock by one period and
/// integrates the spacecraft model over it.
#[derive(Debug, Clone)]
pub struct SimTicker {
    clock: ManualClock,
    model: SpacecraftHandle,
    period_ms: Millis,
}

impl SimTicker {
    pub fn new(clock: ManualClock, model: SpacecraftHandle, period_ms: Millis) -> Self {
        Self {
            clock,
            model,
            period_ms,
        }
    }
}

impl CycleTicker for SimTicker {
    fn wait_for_next_tick(&mut self) {
        self.clock.advance(self.period_ms);
        self.model.borrow_mut().step(self.period_ms);
    }
}

pub struct SimPlatform<C: Clock + Clone + 'static> {
    model: SpacecraftHandle,
    clock: C,
    telemetry: TelemetryBuffer,
    watchdog: Option<WatchdogProbe>,
    boots: u32,
}

impl<C: Clock + Clone + 'static> SimPlatform<C> {
    pub fn new(model: SpacecraftModel, clock: C) -> Self {
        Self {
            model: model.into_handle(),
            clock,
            telemetry: TelemetryBuffer::new(),
            watchdog: None,
            boots: 0,
        }
    }

    /// Fresh collaborators for one boot. The watchdog is new each time; the
    /// spacecraft, clock and telemetry buffer carry over.
    pub fn collaborators(&mut self) -> Collaborators {
        let devices = SimDevices::new(Rc::clone(&self.model));
        let (watchdog, probe) = SimulatedWatchdog::new(Box::new(self.clock.clone()));
        self.watchdog = Some(probe);
        self.boots += 1;

        // A power cycle drops every actuator command.
        self.model.borrow_mut().actuators = ActuatorState::default();

        Collaborators {
            imu: Box::new(devices.clone()),
            power: Box::new(devices.clone()),
            sun_sensor: Box::new(devices.clone()),
            health: Box::new(devices.clone()),
            actuators: Box::new(devices.clone()),
            power_cycle: Box::new(devices),
            clock: Box::new(self.clock.clone()),
            watchdog: Box::new(watchdog),
            telemetry: Box::new(self.telemetry.clone()),
        }
    }

    pub fn model(&self) -> Ref<'_, SpacecraftModel> {
        self.model.borrow()
    }

    pub fn model_mut(&self) -> RefMut<'_, SpacecraftModel> {
        self.model.borrow_mut()
    }

    pub fn handle(&self) -> SpacecraftHandle {
        Rc::clone(&self.model)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn telemetry(&self) -> &TelemetryBuffer {
        &self.telemetry
    }

    /// Probe on the watchdog of the most recent boot.
    pub fn watchdog(&self) -> Option<&WatchdogProbe> {
        self.watchdog.as_ref()
    }

    pub fn watchdog_expired(&self) -> bool {
        self.watchdog
            .as_ref()
            .map_or(false, |probe| probe.expired_at(self.clock.now_ms()))
    }

    pub fn boots(&self) -> u32 {
        self.boots
    }

    pub fn step(&self, dt_ms: Millis) {
        self.model.borrow_mut().step(dt_ms);
    }
}

impl SimPlatform<ManualClock> {
    pub fn ticker(&self, period_ms: Millis) -> SimTicker {
        SimTicker::new(self.clock.clone(), Rc::clone(&self.model), period_ms)
    }
}

/// Canned situations for the CLI and the simulator binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scenario {
    /// Post-deployment tumble that settles into nominal pointing.
    Deployment,
    /// Nominal pointing interrupted by a supply dip.
    PowerDip,
    /// Nominal pointing hit by a tumble kick.
    Tumble,
    /// A sensor anomaly that reinitialization cannot clear.
    StuckSensor,
    /// A critical fault shortly after deployment.
    Critical,
    /// Random faults from a seeded campaign.
    Random,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::Deployment,
        Scenario::PowerDip,
        Scenario::Tumble,
        Scenario::StuckSensor,
        Scenario::Critical,
        Scenario::Random,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Deployment => "deployment",
            Scenario::PowerDip => "power-dip",
            Scenario::Tumble => "tumble",
            Scenario::StuckSensor => "stuck-sensor",
            Scenario::Critical => "critical",
            Scenario::Random => "random",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL.iter().copied().find(|s| s.name() == wanted)
    }

    pub fn build(&self, seed: u64) -> (SpacecraftModel, FaultInjector) {
        let deployed = SpacecraftModel::new()
            .with_angular_velocity([0.35, -0.2, 0.15])
            .with_sun_error(40.0);
        let settled = SpacecraftModel::new().with_sun_error(0.5);

        match self {
            Scenario::Deployment => (deployed, FaultInjector::scripted(Vec::new())),
            Scenario::PowerDip => (
                deployed,
                FaultInjector::scripted(vec![ScheduledFault::new(
                    30,
                    InjectedFault::PowerDip { supply_w: 3.2 },
                    10,
                )]),
            ),
            Scenario::Tumble => (
                settled,
                FaultInjector::scripted(vec![ScheduledFault::new(
                    5,
                    InjectedFault::TumbleKick {
                        delta_rad_s: [0.0, 0.0, 0.4],
                    },
                    0,
                )]),
            ),
            Scenario::StuckSensor => (
                settled,
                FaultInjector::scripted(vec![ScheduledFault::new(
                    3,
                    InjectedFault::SensorAnomaly { persistent: true },
                    8,
                )]),
            ),
            Scenario::Critical => (
                deployed,
                FaultInjector::scripted(vec![ScheduledFault::new(4, InjectedFault::Critical, 1)]),
            ),
            Scenario::Random => (deployed, FaultInjector::random(seed)),
        }
    }
}

impl core::fmt::Display for Scenario {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
