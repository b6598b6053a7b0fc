//! A supervisor running on a simulated platform, rebooted the way the
//! hardware would reboot it.

use super::{FaultInjector, InjectionEvent, SimPlatform};
use crate::config::{AdcsConfig, ConfigError};
use crate::hal::Clock;
use crate::persistence::{NvmDevice, PersistentStateStore};
use crate::scheduler::CycleTicker;
use crate::state_machine::{CycleReport, StateMachine};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebootCause {
    /// The supervisor requested a power cycle.
    PowerCycle,
    /// The watchdog was not refreshed within its timeout.
    WatchdogExpiry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionStep {
    pub step: u32,
    pub events: heapless::Vec<InjectionEvent, 8>,
    pub report: CycleReport,
    pub rebooted: Option<RebootCause>,
}

pub struct Mission<C, D>
where
    C: Clock + Clone + 'static,
    D: NvmDevice + Clone,
{
    config: AdcsConfig,
    platform: SimPlatform<C>,
    injector: FaultInjector,
    device: D,
    machine: StateMachine<D>,
    steps: u32,
    reboots: u32,
}

impl<C, D> Mission<C, D>
where
    C: Clock + Clone + 'static,
    D: NvmDevice + Clone,
{
    pub fn new(
        config: AdcsConfig,
        mut platform: SimPlatform<C>,
        injector: FaultInjector,
        device: D,
    ) -> Result<Self, ConfigError> {
        let machine = StateMachine::new(
            config.clone(),
            PersistentStateStore::new(device.clone()),
            platform.collaborators(),
        )?;
        Ok(Self {
            config,
            platform,
            injector,
            device,
            machine,
            steps: 0,
            reboots: 0,
        })
    }

    /// Inject this step's faults, run one cycle, and reboot if the platform
    /// would. Time is advanced by the caller.
    pub fn step(&mut self) -> Result<MissionStep, ConfigError> {
        self.steps = self.steps.wrapping_add(1);
        let events = {
            let mut model = self.platform.model_mut();
            self.injector.update(&mut model)
        };
        for event in &events {
            info!(step = self.steps, event = ?event, "fault injection");
        }

        let report = self.machine.run_cycle();

        let rebooted = if report.halted {
            Some(RebootCause::PowerCycle)
        } else if self.platform.watchdog_expired() {
            Some(RebootCause::WatchdogExpiry)
        } else {
            None
        };
        if let Some(cause) = rebooted {
            self.reboot(cause)?;
        }

        Ok(MissionStep {
            step: self.steps,
            events,
            report,
            rebooted,
        })
    }

    /// Step `cycles` times, waiting on `ticker` between steps.
    pub fn run<T, F>(&mut self, ticker: &mut T, cycles: u32, mut on_step: F) -> Result<(), ConfigError>
    where
        T: CycleTicker,
        F: FnMut(&MissionStep, &StateMachine<D>),
    {
        for _ in 0..cycles {
            let step = self.step()?;
            on_step(&step, &self.machine);
            ticker.wait_for_next_tick();
        }
        Ok(())
    }

    fn reboot(&mut self, cause: RebootCause) -> Result<(), ConfigError> {
        match cause {
            RebootCause::PowerCycle => warn!(step = self.steps, "power cycling platform"),
            RebootCause::WatchdogExpiry => warn!(step = self.steps, "watchdog expired, platform reset"),
        }
        self.machine = StateMachine::new(
            self.config.clone(),
            PersistentStateStore::new(self.device.clone()),
            self.platform.collaborators(),
        )?;
        self.reboots += 1;
        Ok(())
    }

    pub fn machine(&self) -> &StateMachine<D> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut StateMachine<D> {
        &mut self.machine
    }

    pub fn platform(&self) -> &SimPlatform<C> {
        &self.platform
    }

    pub fn injector(&self) -> &FaultInjector {
        &self.injector
    }

    pub fn reboots(&self) -> u32 {
        self.reboots
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }
}
